#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use miette::{Context as _, IntoDiagnostic as _};
use serde::{Deserialize, Serialize};

pub mod animations;
pub mod binds;
pub mod blur;
pub mod debug;
pub mod gestures;
pub mod scene;
pub mod utils;
pub mod wobbly;
pub mod zoom;

pub use crate::animations::Animations;
pub use crate::binds::*;
pub use crate::blur::Blur;
pub use crate::debug::Debug;
pub use crate::gestures::Gestures;
pub use crate::scene::*;
pub use crate::utils::{FloatOrInt, MergeWith};
pub use crate::wobbly::{Wobbly, WobblySettings};
pub use crate::zoom::{Magnifier, MousePointer, MouseTracking, Zoom};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub blur: Blur,
    pub wobbly: Wobbly,
    pub zoom: Zoom,
    pub magnifier: Magnifier,
    pub overview: Overview,
    pub desktop_grid: DesktopGrid,
    pub binds: Binds,
    pub gestures: Gestures,
    pub animations: Animations,
    pub debug: Debug,
}

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct ConfigPart {
    #[knuffel(child)]
    pub blur: Option<blur::BlurPart>,
    #[knuffel(child)]
    pub wobbly: Option<wobbly::WobblyPart>,
    #[knuffel(child)]
    pub zoom: Option<zoom::ZoomPart>,
    #[knuffel(child)]
    pub magnifier: Option<zoom::MagnifierPart>,
    #[knuffel(child)]
    pub overview: Option<scene::OverviewPart>,
    #[knuffel(child)]
    pub desktop_grid: Option<scene::DesktopGridPart>,
    #[knuffel(child)]
    pub binds: Option<binds::BindsPart>,
    #[knuffel(child)]
    pub gestures: Option<gestures::GesturesPart>,
    #[knuffel(child)]
    pub animations: Option<animations::AnimationsPart>,
    #[knuffel(child)]
    pub debug: Option<debug::DebugPart>,
}

impl MergeWith<ConfigPart> for Config {
    fn merge_with(&mut self, part: &ConfigPart) {
        merge!(
            (self, part),
            blur,
            wobbly,
            zoom,
            magnifier,
            overview,
            desktop_grid,
            binds,
            gestures,
            animations,
            debug,
        );
    }
}

#[derive(Debug, Clone)]
pub enum ConfigPath {
    /// Explicitly set config path.
    ///
    /// Load the config only from this path, never create it.
    Explicit(PathBuf),

    /// Default config path.
    ///
    /// Prioritize the user path, fallback to the system path, fallback to creating the user path
    /// at startup.
    Regular {
        /// User config path, usually `$XDG_CONFIG_HOME/glaze/config.kdl`.
        user_path: PathBuf,
        /// System config path, usually `/etc/glaze/config.kdl`.
        system_path: PathBuf,
    },
}

impl Config {
    pub fn load(path: &Path) -> miette::Result<Self> {
        let contents = fs::read_to_string(path)
            .into_diagnostic()
            .with_context(|| format!("error reading {path:?}"))?;

        let config = Self::parse(
            path.file_name()
                .and_then(OsStr::to_str)
                .unwrap_or("config.kdl"),
            &contents,
        )
        .context("error parsing")?;
        debug!("loaded config from {path:?}");
        Ok(config)
    }

    pub fn parse(filename: &str, text: &str) -> Result<Self, knuffel::Error> {
        let _span = tracy_client::span!("Config::parse");
        let part: ConfigPart = knuffel::parse(filename, text)?;
        Ok(Self::from_part(&part))
    }
}

impl ConfigPath {
    /// Loads the config, returns an error if it doesn't exist.
    pub fn load(&self) -> miette::Result<Config> {
        let _span = tracy_client::span!("ConfigPath::load");

        self.load_inner(|user_path, system_path| {
            Err(miette::miette!(
                "no config file found; create one at {user_path:?} or {system_path:?}",
            ))
        })
        .context("error loading config")
    }

    /// Loads the config, or creates it if it doesn't exist.
    ///
    /// Returns a tuple containing the path that was created, if any, and the loaded config.
    pub fn load_or_create(&self) -> (Option<&Path>, miette::Result<Config>) {
        let _span = tracy_client::span!("ConfigPath::load_or_create");

        let mut created_at = None;

        let result = self
            .load_inner(|user_path, _| {
                Self::create(user_path, &mut created_at)
                    .map(|()| user_path)
                    .with_context(|| format!("error creating config at {user_path:?}"))
            })
            .context("error loading config");

        (created_at, result)
    }

    fn load_inner<'a>(
        &'a self,
        maybe_create: impl FnOnce(&'a Path, &'a Path) -> miette::Result<&'a Path>,
    ) -> miette::Result<Config> {
        let path = match self {
            ConfigPath::Explicit(path) => path.as_path(),
            ConfigPath::Regular {
                user_path,
                system_path,
            } => {
                if user_path.exists() {
                    user_path.as_path()
                } else if system_path.exists() {
                    system_path.as_path()
                } else {
                    maybe_create(user_path.as_path(), system_path.as_path())?
                }
            }
        };
        Config::load(path)
    }

    fn create<'a>(path: &'a Path, created_at: &mut Option<&'a Path>) -> miette::Result<()> {
        if let Some(default_parent) = path.parent() {
            fs::create_dir_all(default_parent)
                .into_diagnostic()
                .with_context(|| format!("error creating config directory {default_parent:?}"))?;
        }

        let mut new_file = match File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => return Ok(()),
            res => res,
        }
        .into_diagnostic()
        .with_context(|| format!("error opening config file at {path:?}"))?;

        *created_at = Some(path);

        let default = include_bytes!("../../resources/default-config.kdl");

        new_file
            .write_all(default)
            .into_diagnostic()
            .with_context(|| format!("error writing default config to {path:?}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;

    #[track_caller]
    fn do_parse(text: &str) -> Config {
        Config::parse("test.kdl", text)
            .map_err(miette::Report::new)
            .unwrap()
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(do_parse(""), Config::default());
    }

    #[test]
    fn bundled_default_config_matches_defaults() {
        let parsed = do_parse(include_str!("../../resources/default-config.kdl"));
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn parse() {
        let parsed = do_parse(
            r##"
            blur {
                strength 3
                noise-strength 0
                simple
            }

            wobbly {
                settings "custom"
                wobblyness-level 2
                stiffness 15
                drag 80
                move-factor 10
                x-tesselation 10
                y-tesselation 12
                stop-velocity 0.5
                stop-acceleration 5
                resize-wobble false
                open-wobble
            }

            zoom {
                zoom-factor 1.5
                mouse-pointer "keep"
                mouse-tracking "push"
                focus-delay 200
                enable-focus-tracking
                pixel-grid-zoom 8
                pointer-axis-gesture-modifiers "Ctrl"
            }

            magnifier {
                off false
                width 300
                height 150
            }

            overview {
                layout-mode "closest"
                border-activate "top-left" "bottom-right"
                touch-border-activate "bottom"
                ignore-minimized
            }

            desktop-grid {
                layout-mode "custom"
                custom-layout-rows 3
                show-add-remove false
                desktop-name-alignment "top"
            }

            binds {
                Super+O { toggle-overview; }
                Ctrl+Super+Left { move-zoom-left; }
            }

            gestures {
                pinch-fingers 3
            }

            animations {
                slowdown 2.5
            }

            debug {
                watchdog-timeout-ms 5000
                ping-timeout-ms 1000
            }
            "##,
        );

        assert_debug_snapshot!(parsed.blur, @r#"
        Blur {
            off: false,
            strength: 3,
            noise_strength: 0,
            simple: true,
            blur_docks: false,
        }
        "#);

        assert_eq!(parsed.wobbly.settings, WobblySettings::Custom);
        assert_eq!(parsed.wobbly.wobblyness_level, 2);
        assert_eq!(parsed.wobbly.x_tesselation, 10);
        assert_eq!(parsed.wobbly.y_tesselation, 12);
        assert_eq!(parsed.wobbly.stop_acceleration, 5.);
        assert!(parsed.wobbly.move_wobble);
        assert!(!parsed.wobbly.resize_wobble);
        assert!(parsed.wobbly.open_wobble);
        assert!(!parsed.wobbly.close_wobble);

        assert_eq!(parsed.zoom.zoom_factor, 1.5);
        assert_eq!(parsed.zoom.mouse_pointer, MousePointer::Keep);
        assert_eq!(parsed.zoom.mouse_tracking, MouseTracking::Push);
        assert_eq!(parsed.zoom.focus_delay, 200);
        assert!(parsed.zoom.enable_focus_tracking);
        assert_eq!(parsed.zoom.pixel_grid_zoom, 8.);
        assert_eq!(parsed.zoom.pointer_axis_gesture_modifiers, Modifiers::CTRL);

        assert!(!parsed.magnifier.off);
        assert_eq!((parsed.magnifier.width, parsed.magnifier.height), (300, 150));

        assert_eq!(parsed.overview.layout_mode, OverviewLayout::Closest);
        assert_eq!(
            parsed.overview.border_activate,
            vec![ScreenEdge::TopLeft, ScreenEdge::BottomRight]
        );
        assert_eq!(parsed.overview.touch_border_activate, vec![ScreenEdge::Bottom]);
        assert!(parsed.overview.ignore_minimized);

        assert_eq!(parsed.desktop_grid.layout_mode, GridLayout::Custom);
        assert_eq!(parsed.desktop_grid.custom_layout_rows, 3);
        assert!(!parsed.desktop_grid.show_add_remove);
        assert_eq!(parsed.desktop_grid.desktop_name_alignment, NameAlignment::Top);

        let overview_keys: Vec<String> = parsed
            .binds
            .keys_for(Action::ToggleOverview)
            .map(|key| key.to_string())
            .collect();
        assert_eq!(overview_keys, vec![String::from("Super+o")]);
        assert_eq!(parsed.binds.keys_for(Action::MoveZoomLeft).count(), 1);
        assert_eq!(parsed.binds.keys_for(Action::ZoomIn).count(), 2);

        assert_eq!(parsed.gestures.pinch_fingers, 3);
        assert_eq!(parsed.gestures.swipe_fingers, 4);
        assert_eq!(parsed.animations.slowdown, 2.5);
        assert_eq!(parsed.debug.watchdog_timeout_ms, 5000);
        assert_eq!(parsed.debug.ping_timeout_ms, 1000);
    }

    #[test]
    fn out_of_range_values_fail_to_parse() {
        assert!(Config::parse("test.kdl", "zoom { zoom-factor 500; }").is_err());
        assert!(Config::parse("test.kdl", "wobbly { drag 150; }").is_err());
        assert!(Config::parse("test.kdl", r#"zoom { mouse-tracking "sideways"; }"#).is_err());
    }

    #[test]
    fn semantic_ranges_are_clamped() {
        let parsed = do_parse(
            r#"
            blur { strength 40; }
            zoom { zoom-factor 0.05; }
            "#,
        );
        assert_eq!(parsed.blur.strength(), 15);
        assert_eq!(parsed.zoom.zoom_factor(), 0.1);
    }

    #[test]
    fn duplicate_binds_are_rejected() {
        let res = Config::parse(
            "test.kdl",
            r#"
            binds {
                Super+O { toggle-overview; }
                Super+O { toggle-desktop-grid; }
            }
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn json_round_trip() {
        let parsed = do_parse(
            r#"
            wobbly { settings "custom"; stiffness 30; }
            zoom { mouse-tracking "centered"; }
            overview { border-activate "left" "top-right"; }
            "#,
        );
        let json = serde_json::to_string(&parsed).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, parsed);
    }

    #[test]
    fn load_or_create_writes_default_config() {
        let dir = std::env::temp_dir().join(format!("glaze-config-test-{}", std::process::id()));
        let user_path = dir.join("config.kdl");
        let path = ConfigPath::Regular {
            user_path: user_path.clone(),
            system_path: dir.join("missing-system-config.kdl"),
        };

        let (created, config) = path.load_or_create();
        assert_eq!(created, Some(user_path.as_path()));
        assert_eq!(config.unwrap(), Config::default());

        let (created, config) = path.load_or_create();
        assert_eq!(created, None);
        assert!(config.is_ok());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let path = ConfigPath::Explicit(PathBuf::from("/nonexistent/glaze/config.kdl"));
        assert!(path.load().is_err());
    }
}
