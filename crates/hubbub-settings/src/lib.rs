//! # hubbub-settings
//!
//! Configuration for the broadcast hub, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`HubbubSettings::default()`]
//! 2. **Settings file**: `$HUBBUB_CONFIG` or `~/.hubbub/settings.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `HUBBUB_*` overrides (highest priority)
//!
//! The binary applies command-line flags on top and then calls
//! [`HubbubSettings::validate`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{Framing, HubSettings, HubbubSettings, LogLevel, LoggingSettings, Mode, ServerSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = HubbubSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = HubbubSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.addr, "127.0.0.1:8080");
        assert_eq!(settings.server.mode, Mode::Dev);
        assert_eq!(settings.hub.mailbox_capacity, 256);
        assert_eq!(settings.hub.max_message_size, 100);
    }
}
