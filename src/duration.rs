//! Human duration strings as typed into the dashboard ("30m", "1h", "60000").

const SECOND: f64 = 1000.0;
const MINUTE: f64 = SECOND * 60.0;
const HOUR: f64 = MINUTE * 60.0;
const DAY: f64 = HOUR * 24.0;
const WEEK: f64 = DAY * 7.0;
const YEAR: f64 = DAY * 365.25;

/// Parse a duration into milliseconds.
///
/// A bare number is taken as milliseconds. Otherwise a number followed by a unit
/// (`ms`, `s`, `m`, `h`, `d`, `w`, `y` and their long spellings) is accepted.
#[must_use]
pub fn parse_millis(input: &str) -> Option<u64> {
    let input = input.trim().to_ascii_lowercase();
    if input.is_empty() {
        return None;
    }

    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    let factor = match unit.trim() {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "week" | "weeks" => WEEK,
        "y" | "yr" | "yrs" | "year" | "years" => YEAR,
        _ => return None,
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some((value * factor).round() as u64)
}

/// Render milliseconds in the long form used in embeds ("1 hour", "30 minutes").
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_long(millis: u64) -> String {
    let ms = millis as f64;
    for (unit, name) in [(DAY, "day"), (HOUR, "hour"), (MINUTE, "minute"), (SECOND, "second")] {
        if ms >= unit {
            let plural = if ms >= unit * 1.5 { "s" } else { "" };
            return format!("{} {name}{plural}", (ms / unit).round());
        }
    }
    format!("{millis} ms")
}

/// Render a remaining span compactly ("1h 5m 3s"), as the account manager shows it.
#[must_use]
pub fn format_compact(millis: u64) -> String {
    let total = millis / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || hours > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}
