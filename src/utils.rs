//! Utility functions for identifiers and display formatting

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Renders a number of seconds the way time credits are shown to people,
/// e.g. `1h 30m` or `45s`.
pub fn format_duration_secs(secs: i64) -> String {
    let sign = if secs < 0 { "-" } else { "" };
    let secs = secs.unsigned_abs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    match (hours, minutes, seconds) {
        (0, 0, s) => format!("{sign}{s}s"),
        (0, m, 0) => format!("{sign}{m}m"),
        (0, m, s) => format!("{sign}{m}m {s}s"),
        (h, 0, 0) => format!("{sign}{h}h"),
        (h, m, _) => format!("{sign}{h}h {m}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hours_and_minutes() {
        assert_eq!(format_duration_secs(3600), "1h");
        assert_eq!(format_duration_secs(5400), "1h 30m");
        assert_eq!(format_duration_secs(90), "1m 30s");
        assert_eq!(format_duration_secs(45), "45s");
        assert_eq!(format_duration_secs(0), "0s");
        assert_eq!(format_duration_secs(-120), "-2m");
    }
}
