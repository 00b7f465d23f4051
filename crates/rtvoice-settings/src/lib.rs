//! # rtvoice-settings
//!
//! Configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`VoiceSettings::default()`]
//! 2. **User file**: `~/.rtvoice/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `OPENAI_API_KEY`, `RTVOICE_*`, `LOG_*`
//!
//! ## Crate Position
//!
//! Leaf crate. Read by the `rtvoice` binary, which turns the values into
//! component configs.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path,
    load_settings_with_env, settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = VoiceSettings::default();
        let path = settings_path();
        assert!(path.ends_with(".rtvoice/settings.json"));
    }
}
