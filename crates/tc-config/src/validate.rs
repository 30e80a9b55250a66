//! Field validators for [`crate::Config`].
//!
//! Each validator returns the bare failure message; [`crate::Config::validate`]
//! prefixes it with the section name and collects all of them.

use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Characters rejected in paths.
const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Maximum length of a domain name (RFC 1035).
const MAX_DOMAIN_LENGTH: usize = 253;

/// Maximum length of a single domain label.
const MAX_LABEL_LENGTH: usize = 63;

/// Maximum length of a Linux interface name.
const MAX_INTERFACE_LENGTH: usize = 15;

/// Maximum length of the `max_size` string.
const MAX_SIZE_LENGTH: usize = 20;

/// Log levels accepted in `log.level`.
pub const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];

static DOMAIN_LABEL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").unwrap_or_else(|_| unreachable!()));

static INTERFACE_CHARS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap_or_else(|_| unreachable!()));

/// Interface naming schemes accepted as bind targets.
static INTERFACE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^eth\d+$",
        r"^wlan\d+$",
        r"^ens\d+$",
        r"^enp\d+s\d+$",
        r"^docker\d+$",
        r"^br\d+$",
        r"^lo$",
        r"^veth[a-f0-9]+$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|_| unreachable!()))
    .collect()
});

/// Accepts an IP address, a dotted domain name or a known interface name.
pub fn address(address: &str) -> Result<(), String> {
    if address.is_empty() {
        return Err("address cannot be empty".to_string());
    }
    if address.parse::<IpAddr>().is_ok() || is_domain(address) || is_interface(address) {
        return Ok(());
    }
    Err(format!(
        "invalid address format: {address} (must be valid IP, domain, or interface name)"
    ))
}

fn is_domain(domain: &str) -> bool {
    if domain.len() > MAX_DOMAIN_LENGTH || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LENGTH
            && DOMAIN_LABEL_REGEX.is_match(label)
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

fn is_interface(name: &str) -> bool {
    name.len() <= MAX_INTERFACE_LENGTH
        && INTERFACE_CHARS_REGEX.is_match(name)
        && INTERFACE_PATTERNS.iter().any(|p| p.is_match(name))
}

/// Accepts 1..=65535. Privileged ports pass with a warning.
pub fn port(port: i64) -> Result<(), String> {
    if !(1..=65535).contains(&port) {
        return Err(format!("port must be between 1 and 65535, got {port}"));
    }
    if port < 1024 {
        warn!(port, "privileged port requires elevated permissions");
    }
    Ok(())
}

/// Accepts a non-empty absolute URL path.
pub fn metrics_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("metrics path cannot be empty".to_string());
    }
    if !path.starts_with('/') {
        return Err(format!("metrics path must start with '/', got: {path}"));
    }
    if path.contains(INVALID_PATH_CHARS) {
        return Err(format!("metrics path contains invalid characters: {path}"));
    }
    Ok(())
}

/// Accepts an empty level or one of [`LOG_LEVELS`], ignoring case.
pub fn log_level(level: &str) -> Result<(), String> {
    if level.is_empty() || LOG_LEVELS.iter().any(|l| l.eq_ignore_ascii_case(level)) {
        return Ok(());
    }
    Err(format!(
        "invalid log level: {level}, supported levels are: {}",
        LOG_LEVELS.join(", ")
    ))
}

/// Rejects paths carrying characters that are invalid on common filesystems.
pub fn log_path(path: &str) -> Result<(), String> {
    if path.contains(INVALID_PATH_CHARS) {
        return Err(format!("log path contains invalid characters: {path}"));
    }
    Ok(())
}

/// Accepts an empty size or one [`parse_size`] understands.
pub fn max_size(size: &str) -> Result<(), String> {
    if size.len() > MAX_SIZE_LENGTH {
        return Err(format!("log max size string too long: {size}"));
    }
    if !size.is_empty() && parse_size(size).is_none() {
        return Err(format!("invalid log max size: {size}"));
    }
    Ok(())
}

/// Parses a human byte size such as `10MB`, `512 KiB` or `1024`.
///
/// Decimal suffixes scale by 1000, binary ones by 1024.
pub fn parse_size(input: &str) -> Option<u64> {
    let input = input.trim();
    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let number: f64 = number.parse().ok()?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1000,
        "ki" | "kib" => 1 << 10,
        "m" | "mb" => 1000 * 1000,
        "mi" | "mib" => 1 << 20,
        "g" | "gb" => 1000 * 1000 * 1000,
        "gi" | "gib" => 1 << 30,
        "t" | "tb" => 1000 * 1000 * 1000 * 1000,
        "ti" | "tib" => 1 << 40,
        _ => return None,
    };
    Some((number * multiplier as f64) as u64)
}
