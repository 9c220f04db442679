use std::fmt;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

pub use slideshow::{PlaybackOrder, SlideshowSettings};

mod slideshow {
    use super::*;

    /// Order in which discovered items are played back.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum PlaybackOrder {
        /// Discovery order, looping once the scan has completed.
        #[default]
        Sequential,
        /// Incrementally shuffled order over the growing collection.
        Random,
    }

    impl PlaybackOrder {
        pub fn as_str(&self) -> &'static str {
            match self {
                Self::Sequential => "sequential",
                Self::Random => "random",
            }
        }

        pub fn toggled(self) -> Self {
            match self {
                Self::Sequential => Self::Random,
                Self::Random => Self::Sequential,
            }
        }
    }

    impl fmt::Display for PlaybackOrder {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// User-facing playback settings owned by the settings collaborator.
    ///
    /// The slide interval is sampled whenever the advance timer is (re)armed,
    /// so edits apply from the next arm onwards and never to a tick that is
    /// already scheduled.
    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    #[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
    pub struct SlideshowSettings {
        /// Time each item stays on screen before the timer advances.
        #[serde(with = "humantime_serde")]
        pub slide_interval: Duration,
        /// Sequential or random playback.
        pub order: PlaybackOrder,
        /// Optional deterministic seed for the shuffle RNG.
        pub shuffle_seed: Option<u64>,
    }

    impl SlideshowSettings {
        const DEFAULT_SLIDE_INTERVAL: Duration = Duration::from_secs(5);

        pub fn validate(&self) -> Result<()> {
            ensure!(
                self.slide_interval > Duration::ZERO,
                "slideshow.slide-interval must be greater than zero"
            );
            Ok(())
        }
    }

    impl Default for SlideshowSettings {
        fn default() -> Self {
            Self {
                slide_interval: Self::DEFAULT_SLIDE_INTERVAL,
                order: PlaybackOrder::default(),
                shuffle_seed: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_mapping() {
        let settings: SlideshowSettings = serde_yaml::from_str("{}").expect("valid yaml");
        assert_eq!(settings, SlideshowSettings::default());
        assert_eq!(settings.slide_interval, Duration::from_secs(5));
        assert_eq!(settings.order, PlaybackOrder::Sequential);
        settings.validate().expect("defaults are valid");
    }

    #[test]
    fn parses_humantime_interval_and_random_order() {
        let settings: SlideshowSettings = serde_yaml::from_str(
            r#"
slide-interval: 1500ms
order: random
shuffle-seed: 42
"#,
        )
        .expect("valid yaml");
        assert_eq!(settings.slide_interval, Duration::from_millis(1500));
        assert_eq!(settings.order, PlaybackOrder::Random);
        assert_eq!(settings.shuffle_seed, Some(42));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let settings: SlideshowSettings =
            serde_yaml::from_str("slide-interval: 0s").expect("valid yaml");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_order_is_rejected() {
        let res: Result<SlideshowSettings, _> = serde_yaml::from_str("order: backwards");
        assert!(res.is_err());
    }

    #[test]
    fn toggled_flips_between_modes() {
        assert_eq!(PlaybackOrder::Sequential.toggled(), PlaybackOrder::Random);
        assert_eq!(PlaybackOrder::Random.toggled(), PlaybackOrder::Sequential);
        assert_eq!(PlaybackOrder::Random.to_string(), "random");
    }
}
