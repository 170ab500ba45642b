//! Environment-driven settings
//!
//! Every option comes from a `SHUNT_*` variable with a default that works
//! out of the box. `from_env` reads the process environment;
//! `from_lookup` takes any lookup function so tests can feed settings
//! without touching the real environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::BasicAuth;
use crate::error::{Result, SettingsError};

const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
const DEFAULT_LISTEN_PORT: u16 = 8080;
const DEFAULT_DESTINATIONS: &str = "127.0.0.1:9009";
const DEFAULT_MAX_OPEN_FILES: u64 = 262_144;
const DEFAULT_JOURNAL_DIR: &str = "/tmp/shunt";
const DEFAULT_MAX_SEND_BYTES: usize = 1 << 20;
const DEFAULT_MAX_FILE_BYTES: u64 = 50 << 20;
const DEFAULT_ROTATE_INTERVAL_SECS: u64 = 1800;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 3600;

/// Process settings resolved from the environment
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bind host for the ingestion listeners (`SHUNT_HOST`)
    pub listen_host: String,
    /// Bind port for the ingestion listeners (`SHUNT_PORT`)
    pub listen_port: u16,
    /// Credential for upstream authorization (`SHUNT_BASIC_AUTH`)
    pub basic_auth: Option<BasicAuth>,
    /// System user for privilege drop, recognized only (`SHUNT_USER`)
    pub system_user: Option<String>,
    /// System group for privilege drop, recognized only (`SHUNT_GROUP`)
    pub system_group: Option<String>,
    /// Log file path; unset logs to stderr (`SHUNT_LOG_FILE`)
    pub log_file: Option<PathBuf>,
    /// Destination host list, semicolon-separated (`SHUNT_DESTINATIONS`)
    pub destinations: Vec<String>,
    /// Routing config file; takes precedence over the host list
    /// (`SHUNT_CONFIG_PATH`)
    pub config_path: Option<PathBuf>,
    /// Runtime worker threads, `0` means all cores (`SHUNT_CORES`)
    pub cores: usize,
    /// Status endpoint bind address; unset disables it (`SHUNT_DEBUG_ADDR`)
    pub debug_addr: Option<String>,
    /// Target open-file-descriptor ceiling (`SHUNT_MAX_OPEN_FILES`)
    pub max_open_files: u64,
    /// Journal spool directory (`SHUNT_JOURNAL_DIR`)
    pub journal_dir: PathBuf,
    /// Upper bound on bytes drained per send cycle (`SHUNT_MAX_SEND_SIZE`)
    pub max_send_bytes: usize,
    /// Journal segment size before rotation (`SHUNT_MAX_FILE_SIZE`)
    pub max_file_bytes: u64,
    /// Journal segment age before rotation (`SHUNT_ROTATE_INTERVAL_SEC`)
    pub rotate_interval: Duration,
    /// Journal operational events as internal records (`SHUNT_JOURNAL_EVENTS`)
    pub journal_events: bool,
    /// Heartbeat period (`SHUNT_HEARTBEAT_INTERVAL_SEC`)
    pub heartbeat_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            basic_auth: None,
            system_user: None,
            system_group: None,
            log_file: None,
            destinations: vec![DEFAULT_DESTINATIONS.to_string()],
            config_path: None,
            cores: 0,
            debug_addr: None,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            journal_dir: PathBuf::from(DEFAULT_JOURNAL_DIR),
            max_send_bytes: DEFAULT_MAX_SEND_BYTES,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            rotate_interval: Duration::from_secs(DEFAULT_ROTATE_INTERVAL_SECS),
            journal_events: false,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
        }
    }
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read settings through an arbitrary variable lookup
    ///
    /// Blank values count as unset. Tests use this with a map-backed
    /// closure instead of mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let basic_auth = match optional(&lookup, "SHUNT_BASIC_AUTH") {
            Some(raw) => Some(BasicAuth::parse(&raw)?),
            None => None,
        };

        Ok(Self {
            listen_host: string_or(&lookup, "SHUNT_HOST", DEFAULT_LISTEN_HOST),
            listen_port: parse_or(&lookup, "SHUNT_PORT", DEFAULT_LISTEN_PORT)?,
            basic_auth,
            system_user: optional(&lookup, "SHUNT_USER"),
            system_group: optional(&lookup, "SHUNT_GROUP"),
            log_file: optional(&lookup, "SHUNT_LOG_FILE").map(PathBuf::from),
            destinations: split_hosts(&string_or(
                &lookup,
                "SHUNT_DESTINATIONS",
                DEFAULT_DESTINATIONS,
            )),
            config_path: optional(&lookup, "SHUNT_CONFIG_PATH").map(PathBuf::from),
            cores: parse_or(&lookup, "SHUNT_CORES", 0)?,
            debug_addr: optional(&lookup, "SHUNT_DEBUG_ADDR"),
            max_open_files: parse_or(&lookup, "SHUNT_MAX_OPEN_FILES", DEFAULT_MAX_OPEN_FILES)?,
            journal_dir: PathBuf::from(string_or(&lookup, "SHUNT_JOURNAL_DIR", DEFAULT_JOURNAL_DIR)),
            max_send_bytes: parse_or(&lookup, "SHUNT_MAX_SEND_SIZE", DEFAULT_MAX_SEND_BYTES)?,
            max_file_bytes: parse_or(&lookup, "SHUNT_MAX_FILE_SIZE", DEFAULT_MAX_FILE_BYTES)?,
            rotate_interval: Duration::from_secs(parse_or(
                &lookup,
                "SHUNT_ROTATE_INTERVAL_SEC",
                DEFAULT_ROTATE_INTERVAL_SECS,
            )?),
            journal_events: bool_or(&lookup, "SHUNT_JOURNAL_EVENTS", false)?,
            heartbeat_interval: Duration::from_secs(parse_or(
                &lookup,
                "SHUNT_HEARTBEAT_INTERVAL_SEC",
                DEFAULT_HEARTBEAT_INTERVAL_SECS,
            )?),
        })
    }

    /// Validate cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint. Called once at startup
    /// before anything is wired up.
    pub fn validate(&self) -> Result<()> {
        if self.config_path.is_none() && self.destinations.is_empty() {
            return Err(SettingsError::NoRoutingSource);
        }

        for host in &self.destinations {
            if !host.contains(':') {
                return Err(SettingsError::invalid_value(
                    "SHUNT_DESTINATIONS",
                    format!("'{host}' must be host:port"),
                ));
            }
        }

        if self.max_send_bytes == 0 {
            return Err(SettingsError::invalid_value(
                "SHUNT_MAX_SEND_SIZE",
                "must be positive",
            ));
        }

        if self.max_file_bytes == 0 {
            return Err(SettingsError::invalid_value(
                "SHUNT_MAX_FILE_SIZE",
                "must be positive",
            ));
        }

        if self.rotate_interval.is_zero() {
            return Err(SettingsError::invalid_value(
                "SHUNT_ROTATE_INTERVAL_SEC",
                "must be positive",
            ));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(SettingsError::invalid_value(
                "SHUNT_HEARTBEAT_INTERVAL_SEC",
                "must be positive",
            ));
        }

        Ok(())
    }

    /// Listener bind address (`host:port`)
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    /// Effective runtime worker count
    ///
    /// `SHUNT_CORES=0` means one worker per available core.
    pub fn worker_threads(&self) -> usize {
        if self.cores > 0 {
            self.cores
        } else {
            num_cpus()
        }
    }
}

/// Number of CPUs available to this process
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Look up a variable, treating blank values as unset
fn optional(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Option<String> {
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Look up a string variable with a default
fn string_or(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: &str) -> String {
    optional(lookup, var).unwrap_or_else(|| default.to_string())
}

/// Look up and parse a variable with a default
fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match optional(lookup, var) {
        Some(raw) => raw
            .parse()
            .map_err(|e| SettingsError::invalid_value(var, format!("{e}: '{raw}'"))),
        None => Ok(default),
    }
}

/// Look up a boolean variable with a default
fn bool_or(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool> {
    match optional(lookup, var) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(SettingsError::invalid_value(
                var,
                format!("expected a boolean, got '{other}'"),
            )),
        },
    }
}

/// Split a semicolon-separated host list, dropping blanks
fn split_hosts(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(String::from)
        .collect()
}
