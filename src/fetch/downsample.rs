//! Downsample adjustment
//!
//! A downsample is `<n><unit>-<aggregation>`, e.g. `5m-avg`. The global
//! multiplier divides the interval so callers can request finer or coarser
//! resolution without rewriting every series.

use nom::{
    character::complete::{digit1, one_of},
    combinator::{map_res, opt},
    sequence::pair,
    IResult,
};

/// Parse `<n><unit>` into seconds; a missing unit means seconds
pub fn parse_duration(input: &str) -> Option<i64> {
    let (rest, (n, unit)) = duration(input.trim()).ok()?;
    if !rest.is_empty() && !rest.starts_with('-') {
        return None;
    }
    let scale = match unit.unwrap_or('s') {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 7 * 86_400,
        'y' => 365 * 86_400,
        _ => return None,
    };
    n.checked_mul(scale)
}

fn duration(input: &str) -> IResult<&str, (i64, Option<char>)> {
    pair(
        map_res(digit1, |s: &str| s.parse::<i64>()),
        opt(one_of("smhdwy")),
    )(input)
}

/// Aggregation part of a downsample (text after the first `-`)
pub fn aggregation(downsample: &str) -> &str {
    match downsample.find('-') {
        Some(pos) if pos > 0 => &downsample[pos + 1..],
        _ => "",
    }
}

/// Divide the downsample interval by `multiplier`
///
/// Returns the input untouched when it is missing, unparseable or the
/// multiplier is not positive. Intervals below one second become `1s`.
pub fn apply_multiplier(downsample: Option<&str>, multiplier: f64) -> Option<String> {
    let original = downsample.map(str::to_string);
    let ds = match downsample.map(str::trim) {
        Some(ds) if !ds.is_empty() && multiplier > 0.0 => ds,
        _ => {
            tracing::warn!(downsample = ?downsample, multiplier, "Bad downsample or multiplier, keeping original");
            return original;
        }
    };

    let Some(seconds) = parse_duration(ds) else {
        tracing::warn!(downsample = ds, "Unparseable downsample interval, keeping original");
        return original;
    };

    let mut scaled = (seconds as f64 / multiplier).floor() as i64;
    if scaled <= 0 {
        tracing::warn!(
            downsample = ds,
            multiplier,
            "Multiplier would request resolution finer than 1s, using 1s"
        );
        scaled = 1;
    }

    Some(format!("{}s-{}", scaled, aggregation(ds)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30"), Some(30));
        assert_eq!(parse_duration("5m"), Some(300));
        assert_eq!(parse_duration("2h-avg"), Some(7_200));
        assert_eq!(parse_duration("1w"), Some(604_800));
        assert_eq!(parse_duration("1y-sum"), Some(31_536_000));
        assert_eq!(parse_duration("m5"), None);
        assert_eq!(parse_duration("5x"), None);
    }

    #[test]
    fn test_aggregation() {
        assert_eq!(aggregation("5m-avg"), "avg");
        assert_eq!(aggregation("5m-avg-zero"), "avg-zero");
        assert_eq!(aggregation("5m"), "");
    }

    #[test]
    fn test_apply_multiplier() {
        assert_eq!(apply_multiplier(Some("5m-avg"), 1.0).as_deref(), Some("300s-avg"));
        assert_eq!(apply_multiplier(Some("5m-avg"), 2.0).as_deref(), Some("150s-avg"));
        assert_eq!(apply_multiplier(Some("1m-max"), 0.5).as_deref(), Some("120s-max"));
    }

    #[test]
    fn test_apply_multiplier_floor_is_one_second() {
        assert_eq!(apply_multiplier(Some("1s-sum"), 4.0).as_deref(), Some("1s-sum"));
    }

    #[test]
    fn test_apply_multiplier_keeps_bad_input() {
        assert_eq!(apply_multiplier(None, 2.0), None);
        assert_eq!(apply_multiplier(Some(""), 2.0).as_deref(), Some(""));
        assert_eq!(apply_multiplier(Some("5m-avg"), 0.0).as_deref(), Some("5m-avg"));
        assert_eq!(apply_multiplier(Some("soon-avg"), 1.0).as_deref(), Some("soon-avg"));
    }
}
