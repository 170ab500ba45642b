//! Config sources
//!
//! A `ConfigSource` turns raw routing configuration into a
//! [`ConfigSnapshot`]. Two forms exist: an explicit config file, and an
//! inline destination host list synthesized into the single-line wildcard
//! form `* host;host;…`.
//!
//! # Config text grammar
//!
//! One route per line: `<match-key> <addr>[;<addr>…]`. The first token is
//! the match key (`*` for the wildcard route), the second the
//! semicolon-separated destination address group, each address
//! `host:port`. Blank lines and `#` comments are skipped. Duplicate match
//! keys are rejected.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::{ConfigError, Result};
use crate::{ConfigSnapshot, DestinationHandle, RoutingTable};

/// Where routing configuration comes from
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Read and parse a config file on every load
    File(PathBuf),
    /// Synthesize a single wildcard route over a destination host list
    HostList(Vec<String>),
}

impl ConfigSource {
    /// Create a file-backed source
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Create a host-list source
    pub fn host_list(hosts: Vec<String>) -> Self {
        Self::HostList(hosts)
    }

    /// Short description of the source for log fields
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => format!("file:{}", path.display()),
            Self::HostList(hosts) => format!("hosts:{}", hosts.len()),
        }
    }

    /// Parse the source into a fresh snapshot
    ///
    /// Reads the config text (or synthesizes it for the host-list form),
    /// builds a brand-new routing table with brand-new destination
    /// handles, and stamps the snapshot with the current time and the
    /// SHA-256 fingerprint of the text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read or a line
    /// is malformed. Nothing is published on error; the caller keeps
    /// whatever snapshot was previously active.
    pub fn parse(&self) -> Result<ConfigSnapshot> {
        let text = match self {
            Self::File(path) => fs::read_to_string(path)
                .map_err(|e| ConfigError::io(path.display().to_string(), e))?,
            Self::HostList(hosts) => format!("* {}", hosts.join(";")),
        };

        let table = parse_routing_text(&text)?;
        Ok(ConfigSnapshot::new(table, unix_now(), fingerprint(&text)))
    }
}

/// Parse config text into a routing table
///
/// Builds everything into a new table first so a malformed line leaves no
/// partial state behind.
pub fn parse_routing_text(text: &str) -> Result<RoutingTable> {
    let mut table = RoutingTable::new();

    for (line_num, line) in text.lines().enumerate() {
        let line_num = line_num + 1; // 1-based line numbers
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, handle) = parse_line(line, line_num)?;

        if table.contains_key(&key) {
            return Err(ConfigError::duplicate_key(key, line_num));
        }

        table.insert(key, Arc::new(handle));
    }

    Ok(table)
}

/// Parse a single route line into its match key and destination handle
fn parse_line(line: &str, line_num: usize) -> Result<(String, DestinationHandle)> {
    let mut tokens = line.split_whitespace();

    let key = tokens
        .next()
        .ok_or_else(|| ConfigError::parse(line_num, "missing match key"))?;
    let group = tokens
        .next()
        .ok_or_else(|| ConfigError::parse(line_num, "missing destination address"))?;

    if tokens.next().is_some() {
        return Err(ConfigError::parse(
            line_num,
            "unexpected trailing tokens after destination group",
        ));
    }

    let mut addrs = Vec::new();
    for addr in group.split(';') {
        if addr.is_empty() {
            return Err(ConfigError::parse(
                line_num,
                "empty destination address in group",
            ));
        }
        validate_addr(addr, line_num)?;
        addrs.push(addr.to_string());
    }

    Ok((key.to_string(), DestinationHandle::new(addrs)))
}

/// Check that an address is of the `host:port` form
fn validate_addr(addr: &str, line_num: usize) -> Result<()> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Err(ConfigError::parse(
            line_num,
            format!("destination address '{addr}' must be host:port"),
        ));
    };

    if host.is_empty() {
        return Err(ConfigError::parse(
            line_num,
            format!("destination address '{addr}' has an empty host"),
        ));
    }

    if port.parse::<u16>().is_err() {
        return Err(ConfigError::parse(
            line_num,
            format!("destination address '{addr}' has an invalid port"),
        ));
    }

    Ok(())
}

/// SHA-256 fingerprint of config text, hex-encoded
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Current wall clock as unix seconds, `0` if the clock is before epoch
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}
