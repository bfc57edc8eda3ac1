use std::time::Duration;

/// The units a literal may use. `humantime` knows more, but these are the ones scenario options
/// are written with.
const UNITS: [&str; 4] = ["ms", "s", "m", "h"];

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("invalid duration `{literal}`: {reason}")]
pub struct DurationParseError {
    literal: String,
    reason: String,
}

impl DurationParseError {
    fn new(literal: &str, reason: impl ToString) -> Self {
        Self {
            literal: literal.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Parse a duration literal such as `30s`, `1m`, `1m30s`, `1.5h` or `250ms`.
///
/// A literal is one or more `<number><unit>` pairs, where the units are `ms`, `s`, `m` and `h`.
/// The bare literal `0` is also accepted. Each pair is handed to [humantime::parse_duration],
/// which only takes whole numbers, so a decimal part is added on as a fraction of one unit.
pub fn parse_duration(literal: &str) -> Result<Duration, DurationParseError> {
    let s = literal.trim();
    if s.is_empty() {
        return Err(DurationParseError::new(literal, "empty"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(DurationParseError::new(literal, "expected a number"));
        }
        let unit_end = rest[number_end..]
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .map_or(rest.len(), |i| number_end + i);

        let (number, unit) = (&rest[..number_end], &rest[number_end..unit_end]);
        if unit.is_empty() {
            return Err(DurationParseError::new(literal, "missing unit"));
        }
        if !UNITS.contains(&unit) {
            return Err(DurationParseError::new(literal, "unknown unit, use ms, s, m or h"));
        }

        let pair =
            parse_pair(number, unit).map_err(|reason| DurationParseError::new(literal, reason))?;
        total = total
            .checked_add(pair)
            .ok_or_else(|| DurationParseError::new(literal, "out of range"))?;
        rest = &rest[unit_end..];
    }

    Ok(total)
}

fn parse_pair(number: &str, unit: &str) -> Result<Duration, String> {
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (number, None),
    };

    let mut duration = if whole.is_empty() {
        Duration::ZERO
    } else {
        humantime::parse_duration(&format!("{whole}{unit}")).map_err(|e| e.to_string())?
    };

    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err("invalid number".to_string());
        }
        let one_unit = humantime::parse_duration(&format!("1{unit}")).map_err(|e| e.to_string())?;
        let fraction = format!("0.{fraction}")
            .parse::<f64>()
            .map_err(|_| "invalid number".to_string())?;
        let nanos = (one_unit.as_nanos() as f64 * fraction).round() as u64;
        duration = duration
            .checked_add(Duration::from_nanos(nanos))
            .ok_or_else(|| "out of range".to_string())?;
    }

    Ok(duration)
}
