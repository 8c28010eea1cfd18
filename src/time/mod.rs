//! Timestamp parsing for hand-entered spreadsheet values.
//!
//! Accepts `SS`, `MM:SS` and `HH:MM:SS`, with either `,` or `.` as the
//! decimal marker and either `:` or `;` as the field separator.

/// Error returned when a timestamp cannot be interpreted
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TimeParseError {
    #[error("Invalid time format '{input}': {reason}")]
    InvalidFormat { input: String, reason: &'static str },
}

impl TimeParseError {
    fn invalid(input: &str, reason: &'static str) -> Self {
        TimeParseError::InvalidFormat {
            input: input.to_string(),
            reason,
        }
    }
}

/// Parse a timestamp string into seconds.
///
/// The result is the plain sum of the components. Nothing is rounded or
/// clamped, so a negative component yields a negative total; ordering checks
/// belong to the caller.
pub fn parse_time(raw: &str) -> Result<f64, TimeParseError> {
    let normalized = raw.replace(',', ".").replace(';', ":");

    let mut parts = Vec::with_capacity(3);
    for field in normalized.split(':') {
        let value: f64 = field
            .trim()
            .parse()
            .map_err(|_| TimeParseError::invalid(raw, "field is not numeric"))?;

        if !value.is_finite() {
            return Err(TimeParseError::invalid(raw, "field is not numeric"));
        }
        parts.push(value);
    }

    match parts.as_slice() {
        [h, m, s] => Ok(h * 3600.0 + m * 60.0 + s),
        [m, s] => Ok(m * 60.0 + s),
        [s] => Ok(*s),
        _ => Err(TimeParseError::invalid(raw, "expected SS, MM:SS or HH:MM:SS")),
    }
}

/// Render seconds for a transcoder command line, without rounding
pub fn format_seconds(seconds: f64) -> String {
    format!("{}", seconds)
}

/// Render seconds as `HH:MM:SS.mmm` for log output
pub fn format_clock(seconds: f64) -> String {
    let sign = if seconds < 0.0 { "-" } else { "" };
    let total_millis = (seconds.abs() * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;

    format!("{}{:02}:{:02}:{:02}.{:03}", sign, hours, minutes, secs, millis)
}
