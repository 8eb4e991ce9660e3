#[macro_use]
extern crate tracing;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use calloop::channel::{self, Event};
use calloop::EventLoop;
use clap::Parser;
use directories::ProjectDirs;
use glaze::animation::Clock;
use glaze::backend::{Backend, Headless};
use glaze::cli::Cli;
use glaze::compositor::State;
use glaze::utils::watchdog::UnsafeGlFlag;
use glaze::utils::watcher::ConfigWatcher;
use glaze::utils::{get_monotonic_time, version};
use glaze_config::{Config, ConfigPath};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "glaze=debug,glaze_config=debug";

/// Loop wakeup interval while nothing else wakes it up.
const IDLE_TIMEOUT: Duration = Duration::from_millis(16);

fn main() -> anyhow::Result<()> {
    let directives = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_owned());
    let env_filter = EnvFilter::builder().parse_lossy(directives);
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();

    let _client = tracy_client::Client::start();

    info!("starting version {}", version());

    if let Some(flag) = UnsafeGlFlag::in_state_dir() {
        if flag.is_set() {
            warn!(
                "GPU hang detected in a previous session, GL rendering stays off; \
                 remove {:?} to re-enable it",
                flag.path()
            );
        }
    }

    let config_path = config_path(cli.config);
    let config = match &config_path {
        Some(path) => {
            let (created_at, res) = path.load_or_create();
            if let Some(created_at) = created_at {
                info!("created the default config at {created_at:?}");
            }
            match res {
                Ok(config) => config,
                Err(err) => {
                    warn!("{err:?}");
                    Config::default()
                }
            }
        }
        None => {
            warn!("no config directory, using the default config");
            Config::default()
        }
    };

    let mut event_loop = EventLoop::<State>::try_new()?;
    let handle = event_loop.handle();

    let clock = Clock::with_time(get_monotonic_time());
    let backend = Backend::Headless(Headless::new());
    let mut state = State::new(
        config,
        clock,
        Some(handle.clone()),
        Some(event_loop.get_signal()),
        backend,
    );

    for n in 0..cli.outputs {
        let State { backend, glaze } = &mut state;
        backend.headless().add_output(glaze, n, cli.output_size);
    }

    state.glaze.arm_watchdog()?;

    // Kept alive until the loop exits.
    let _watcher = match config_path {
        Some(path) => {
            let (tx, rx) = channel::sync_channel(1);
            handle
                .insert_source(rx, |event, _, state: &mut State| match event {
                    Event::Msg(Ok(config)) => state.reload_config(config),
                    Event::Msg(Err(err)) => warn!("{err:?}"),
                    Event::Closed => (),
                })
                .map_err(|err| anyhow::anyhow!("error inserting config channel: {err}"))?;

            match ConfigWatcher::spawn(path, ConfigPath::load, tx) {
                Ok(watcher) => Some(watcher),
                Err(err) => {
                    warn!("error starting config watcher: {err:?}");
                    None
                }
            }
        }
        None => None,
    };

    event_loop.run(IDLE_TIMEOUT, &mut state, |state| {
        let _span = tracy_client::span!("loop callback");
        state.refresh_and_redraw();
    })?;

    if state.glaze.gpu_frozen {
        error!("the GPU stopped responding, exiting");
    }

    Ok(())
}

fn config_path(explicit: Option<PathBuf>) -> Option<ConfigPath> {
    if let Some(path) = explicit.or_else(|| env::var_os("GLAZE_CONFIG").map(PathBuf::from)) {
        return Some(ConfigPath::Explicit(path));
    }

    let dirs = ProjectDirs::from("", "", "glaze")?;
    Some(ConfigPath::Regular {
        user_path: dirs.config_dir().join("config.kdl"),
        system_path: PathBuf::from("/etc/glaze/config.kdl"),
    })
}
