//! Shunt Configuration
//!
//! Environment-driven settings with sensible defaults. An unset
//! environment means a working single-destination setup; only set what
//! you need to change.
//!
//! # Reading settings
//!
//! ```no_run
//! use shunt_config::Settings;
//!
//! let settings = Settings::from_env().unwrap();
//! settings.validate().unwrap();
//! println!("listening on {}", settings.listen_addr());
//! ```
//!
//! # Recognized variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `SHUNT_HOST` | `0.0.0.0` |
//! | `SHUNT_PORT` | `8080` |
//! | `SHUNT_BASIC_AUTH` | unset |
//! | `SHUNT_USER` / `SHUNT_GROUP` | unset |
//! | `SHUNT_LOG_FILE` | unset (stderr) |
//! | `SHUNT_DESTINATIONS` | `127.0.0.1:9009` |
//! | `SHUNT_CONFIG_PATH` | unset |
//! | `SHUNT_CORES` | `0` (all) |
//! | `SHUNT_DEBUG_ADDR` | unset (off) |
//! | `SHUNT_MAX_OPEN_FILES` | `262144` |
//! | `SHUNT_JOURNAL_DIR` | `/tmp/shunt` |
//! | `SHUNT_MAX_SEND_SIZE` | `1048576` |
//! | `SHUNT_MAX_FILE_SIZE` | `52428800` |
//! | `SHUNT_ROTATE_INTERVAL_SEC` | `1800` |
//! | `SHUNT_JOURNAL_EVENTS` | `false` |
//! | `SHUNT_HEARTBEAT_INTERVAL_SEC` | `3600` |
//!
//! The tracing filter is read separately from `SHUNT_LOG` by the binary.

mod auth;
mod error;
mod settings;

pub use auth::BasicAuth;
pub use error::{Result, SettingsError};
pub use settings::Settings;
