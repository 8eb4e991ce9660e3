//! Built-in effects.

use glaze_config::Config;

use crate::effect::Effect;

pub mod blur;
pub mod desktop_grid;
pub mod expo_layout;
pub mod fade;
pub mod magnifier;
pub mod overview;
pub mod scene_view;
pub mod wobbly;
pub mod zoom;

/// Every built-in effect, in load order.
pub const NAMES: [&str; 7] = [
    blur::NAME,
    fade::NAME,
    wobbly::NAME,
    zoom::NAME,
    magnifier::NAME,
    overview::NAME,
    desktop_grid::NAME,
];

pub fn is_enabled(name: &str, config: &Config) -> bool {
    match name {
        blur::NAME => !config.blur.off,
        fade::NAME => !config.animations.off,
        wobbly::NAME => !config.wobbly.off,
        zoom::NAME => !config.zoom.off,
        magnifier::NAME => !config.magnifier.off,
        overview::NAME => !config.overview.off,
        desktop_grid::NAME => !config.desktop_grid.off,
        _ => false,
    }
}

pub fn create(name: &str) -> Option<Box<dyn Effect>> {
    let effect: Box<dyn Effect> = match name {
        blur::NAME => Box::new(blur::BlurEffect::new()),
        fade::NAME => Box::new(fade::FadeEffect::new()),
        wobbly::NAME => Box::new(wobbly::WobblyEffect::new()),
        zoom::NAME => Box::new(zoom::ZoomEffect::new()),
        magnifier::NAME => Box::new(magnifier::MagnifierEffect::new()),
        overview::NAME => Box::new(overview::OverviewEffect::new()),
        desktop_grid::NAME => Box::new(desktop_grid::DesktopGridEffect::new()),
        _ => {
            warn!("unknown effect: {name}");
            return None;
        }
    };
    Some(effect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_effect_can_be_created() {
        for name in NAMES {
            let effect = create(name).unwrap();
            assert_eq!(effect.name(), name);
        }
        assert!(create("cube").is_none());
    }

    #[test]
    fn switches_follow_config() {
        let mut config = Config::default();
        assert!(is_enabled(overview::NAME, &config));
        // Zoom and magnifier share bindings.
        assert!(!is_enabled(magnifier::NAME, &config));

        config.overview.off = true;
        config.animations.off = true;
        assert!(!is_enabled(overview::NAME, &config));
        assert!(!is_enabled(fade::NAME, &config));
        assert!(is_enabled(desktop_grid::NAME, &config));
        assert!(!is_enabled("cube", &config));
    }
}
