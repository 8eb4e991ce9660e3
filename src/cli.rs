use std::path::PathBuf;

use clap::Parser;

use crate::utils::version;

#[derive(Parser)]
#[command(author, version = version(), about, long_about = None)]
pub struct Cli {
    /// Path to config file (default: `$XDG_CONFIG_HOME/glaze/config.kdl`).
    ///
    /// This can also be set with the `GLAZE_CONFIG` environment variable. If both are set, the
    /// command line argument takes precedence.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Number of headless outputs to create, laid out left to right.
    #[arg(long, default_value_t = 1)]
    pub outputs: u8,
    /// Size of each headless output in logical pixels.
    #[arg(long, value_parser = parse_size, default_value = "1920x1080")]
    pub output_size: (u16, u16),
}

fn parse_size(s: &str) -> Result<(u16, u16), String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let w = w.parse().map_err(|err| format!("invalid width: {err}"))?;
    let h = h.parse().map_err(|err| format!("invalid height: {err}"))?;
    if w == 0 || h == 0 {
        return Err(String::from("size must be non-zero"));
    }
    Ok((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["glaze"]);
        assert_eq!(cli.config, None);
        assert_eq!(cli.outputs, 1);
        assert_eq!(cli.output_size, (1920, 1080));
    }
}
