//! # ripple-settings
//!
//! Configuration for the ripple echo server.
//!
//! Settings are loaded from four layers (in priority order):
//! 1. **Compiled defaults**: [`RippleSettings::default()`]
//! 2. **Settings file**: `~/.ripple/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `RIPPLE_*` overrides
//! 4. **CLI flags**: applied by the binary on top of the loaded value
//!
//! # Usage
//!
//! ```no_run
//! use ripple_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("echo server port: {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
