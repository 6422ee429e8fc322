// Durations
// Parses compound duration strings like "90s", "5m" or "1h30m"

use crate::config::ConfigError;

use std::time::Duration;

/// Parse a duration made of `<number><unit>` segments, units `ms`, `s`,
/// `m`, `h`. Segments add up, so "1h30m" is ninety minutes.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let bad = |reason: &str| ConfigError::InvalidTimeout {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = value.trim();
    if rest.is_empty() {
        return Err(bad("empty duration"));
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| bad("missing unit"))?;
        if split == 0 {
            return Err(bad("expected a number"));
        }
        let (digits, tail) = rest.split_at(split);
        let amount: f64 = digits.parse().map_err(|_| bad("bad number"))?;

        let (unit_millis, unit_len) = if tail.starts_with("ms") {
            (1.0, 2)
        } else if tail.starts_with('s') {
            (1_000.0, 1)
        } else if tail.starts_with('m') {
            (60_000.0, 1)
        } else if tail.starts_with('h') {
            (3_600_000.0, 1)
        } else {
            return Err(bad("unknown unit"));
        };

        total += Duration::from_millis((amount * unit_millis) as u64);
        rest = &tail[unit_len..];
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_unit_durations() {
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("100h").unwrap(), Duration::from_secs(360_000));
    }

    #[test]
    fn segments_add_up() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(
            parse_duration("1m30s500ms").unwrap(),
            Duration::from_millis(90_500)
        );
    }

    #[test]
    fn fractions_are_accepted() {
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10 minutes").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("h10").is_err());
    }
}
