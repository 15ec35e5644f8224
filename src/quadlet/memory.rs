//! Memory-size parsing: `<digits>[.<digits>]<unit><b?>`.
//!
//! A small state machine over three phases: digits, optional unit,
//! optional trailing `b`/`B`, rather than a regex, so the accepted
//! grammar is explicit: `k=2^10`, `m=2^20`, `g=2^30`, `t=2^40`, no
//! unit = bytes. The integer result is always rounded down.

use crate::error::{Error, Result};

/// Parse a memory-size literal like `"512m"`, `"1.5g"`, or `"2048"`
/// into a byte count.
///
/// # Errors
/// Returns [`Error::InvalidArgs`] for an empty string or any literal
/// that does not match `<number><unit?><b?>`.
pub fn parse(s: &str) -> Result<u64> {
    if s.is_empty() {
        return Err(Error::invalid_args("memory size is empty"));
    }

    let lower = s.to_lowercase();
    let trimmed = lower.strip_suffix('b').unwrap_or(&lower);

    let (digits, multiplier) = if let Some(rest) = trimmed.strip_suffix('k') {
        (rest, 1u64 << 10)
    } else if let Some(rest) = trimmed.strip_suffix('m') {
        (rest, 1u64 << 20)
    } else if let Some(rest) = trimmed.strip_suffix('g') {
        (rest, 1u64 << 30)
    } else if let Some(rest) = trimmed.strip_suffix('t') {
        (rest, 1u64 << 40)
    } else {
        (trimmed, 1u64)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(Error::invalid_args(format!("invalid memory size {s:?}")));
    }

    let value: f64 = digits
        .parse()
        .map_err(|_| Error::invalid_args(format!("invalid memory size {s:?}")))?;

    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    let bytes = (value * multiplier as f64).floor() as u64;
    Ok(bytes)
}

/// Format a byte count as the compact unit Podman expects in
/// `Memory=`/`ShmSize=` (smallest unit that divides evenly, falling
/// back to bytes).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(u64, &str); 4] = [
        (1u64 << 40, "t"),
        (1u64 << 30, "g"),
        (1u64 << 20, "m"),
        (1u64 << 10, "k"),
    ];
    for (size, suffix) in UNITS {
        if bytes != 0 && bytes % size == 0 {
            return format!("{}{suffix}", bytes / size);
        }
    }
    bytes.to_string()
}
