//! Size formatting and parsing
//!
//! Sizes handed to the native library are always bytes. These helpers turn
//! LVM-style size arguments ("100000", "512k", "4M", "1.5G") into bytes and
//! back into something readable.

use anyhow::Result;
use num_format::{Locale, ToFormattedString};

/// Convert bytes to human-readable format (e.g., "1.50 GiB")
pub fn bytes_to_pretty(bytes: &u64, add_bytes: bool) -> String {
    let mut steps = 0;
    let mut val: f64 = *bytes as f64;

    while val >= 1024. && steps < 6 {
        val /= 1024.;
        steps += 1;
    }

    let unit = match steps {
        0 => "B",
        1 => "KiB",
        2 => "MiB",
        3 => "GiB",
        4 => "TiB",
        5 => "PiB",
        _ => "EiB",
    };

    if add_bytes {
        let bytes_str = bytes.to_formatted_string(&Locale::en);
        format!("{:.2} {} ({} bytes)", val, unit, bytes_str)
    } else {
        format!("{:.2} {}", val, unit)
    }
}

/// Parse an LVM-style size argument into bytes.
///
/// A bare number is bytes. Suffixes `k`, `m`, `g`, `t`, `p` (either case,
/// optionally followed by `b`/`ib`) are powers of 1024, as in the LVM tools.
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("Invalid size: empty input"));
    }

    let split_at = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);

    let unit = unit.trim().to_ascii_lowercase();
    let unit = unit
        .strip_suffix("ib")
        .or_else(|| unit.strip_suffix('b'))
        .unwrap_or(&unit);

    let steps = match unit {
        "" => 0,
        "k" => 1,
        "m" => 2,
        "g" => 3,
        "t" => 4,
        "p" => 5,
        other => return Err(anyhow::anyhow!("Invalid unit: {}", other)),
    };

    if steps == 0 {
        return number
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid size '{}': {}", input, e));
    }

    let mut val: f64 = number
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size '{}': {}", input, e))?;
    for _ in 0..steps {
        val *= 1024.;
    }

    if !val.is_finite() || val > u64::MAX as f64 {
        return Err(anyhow::anyhow!("Invalid size '{}': out of range", input));
    }

    Ok(val.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_bytes_and_suffixes() {
        assert_eq!(parse_size("100000").unwrap(), 100_000);
        assert_eq!(parse_size("4k").unwrap(), 4096);
        assert_eq!(parse_size("4M").unwrap(), 4 * 1024 * 1024);
        assert_eq!(parse_size("1.5G").unwrap(), 1536 * 1024 * 1024);
        assert_eq!(parse_size("2GiB").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("12x").is_err());
        assert!(parse_size("1.5").is_err());
    }

    #[test]
    fn pretty_prints_binary_units() {
        assert_eq!(bytes_to_pretty(&512, false), "512.00 B");
        assert_eq!(bytes_to_pretty(&(4 * 1024 * 1024), false), "4.00 MiB");
        assert_eq!(bytes_to_pretty(&4096, true), "4.00 KiB (4,096 bytes)");
    }
}
