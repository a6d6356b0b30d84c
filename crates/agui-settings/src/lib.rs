//! # agui-settings
//!
//! Layered configuration for the AG-UI card client.
//!
//! Settings are resolved in three layers, last wins:
//!
//! 1. Compiled defaults ([`ClientSettings::default`])
//! 2. `~/.agui/settings.json`, deep-merged over the defaults
//! 3. `AGUI_*` environment variables
//!
//! There is no global instance. Load once and hand the value to the client.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::ClientSettings;
