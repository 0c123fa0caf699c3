//! Helpers for rendering reports in the statsd/dogstatsd datagram format.

// <NAMESPACE>.<METRIC_NAME>:<VALUE>|<TYPE>|@<SAMPLE_RATE>|#<TAG_KEY_1>:<TAG_VALUE_1>,<TAG_2>

/// Formats one `key:value` tag, sanitizing both halves.
pub fn format_tag(key: &str, value: &str) -> String {
    format!("{}:{}", sanitize_label(key), sanitize_label_value(value))
}

/// Sanitizes a tag key to be valid under the datadog [data model].
///
/// [data model]: https://docs.datadoghq.com/getting_started/tagging/
pub fn sanitize_label(key: &str) -> String {
    // The first character must be a letter, the last one cannot be a colon.
    let mut out = String::with_capacity(key.len());
    let mut is_invalid: fn(char) -> bool = invalid_label_start_character;
    let mut key_chars = key.chars().peekable();
    let mut first = true;
    while let Some(c) = key_chars.next() {
        if !first && key_chars.peek().is_none() {
            is_invalid = invalid_label_last_character;
        }
        if is_invalid(c) {
            out.push('_');
        } else {
            out.push(c);
        }
        is_invalid = invalid_label_character;
        first = false;
    }
    out
}

/// Sanitizes a tag value, replacing unsupported characters with underscores.
pub fn sanitize_label_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if invalid_label_character(c) { '_' } else { c })
        .collect()
}

/// Metrics naming [rules](https://docs.datadoghq.com/developers/dogstatsd/datagram_shell?tabs=metrics)
/// - Metric names must start with a letter.
/// - Metric names must only contain ASCII alphanumerics, underscores, and periods.
/// - Other characters, including spaces, are converted to underscores.
pub fn sanitize_metric_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut is_invalid: fn(char) -> bool = invalid_metric_name_start_character;
    for c in name.chars() {
        if is_invalid(c) {
            out.push('_');
        } else {
            out.push(c);
        }
        is_invalid = invalid_metric_name_character;
    }
    out
}

/// Writes a single datagram line for `name` into `buffer`.
///
/// The sample rate section is only written for rates below one, which is how statsd agents
/// expect unsampled metrics to be sent.
pub fn write_metric_line<T>(
    buffer: &mut String,
    namespace: Option<&str>,
    name: &str,
    mtype: &str,
    value: T,
    sample_rate: f64,
    tags: &[String],
) where
    T: std::fmt::Display,
{
    if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
        buffer.push_str(sanitize_metric_name(ns).as_str());
        buffer.push('.');
    }
    buffer.push_str(sanitize_metric_name(name).as_str());

    buffer.push(':');
    buffer.push_str(value.to_string().as_str());
    buffer.push('|');
    buffer.push_str(mtype);

    if sample_rate < 1.0 {
        buffer.push_str("|@");
        buffer.push_str(sample_rate.to_string().as_str());
    }

    if !tags.is_empty() {
        buffer.push_str("|#");

        let mut first = true;
        for tag in tags {
            if first {
                first = false;
            } else {
                buffer.push(',');
            }
            buffer.push_str(tag);
        }
    }
}

#[inline]
fn invalid_metric_name_start_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z_].
    !(c.is_ascii_alphabetic() || c == '_')
}

#[inline]
fn invalid_metric_name_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z0-9_.].
    !(c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

// Tags must start with a letter and after that may contain alphanumerics, underscores,
// minuses, colons, periods and slashes. A tag cannot end with a colon.

#[inline]
fn invalid_label_start_character(c: char) -> bool {
    !c.is_alphabetic()
}

#[inline]
fn invalid_label_character(c: char) -> bool {
    !(c.is_alphanumeric() || c == '_' || c == '.' || c == ':' || c == '/' || c == '-')
}

#[inline]
fn invalid_label_last_character(c: char) -> bool {
    !(c.is_alphanumeric() || c == '_' || c == '.' || c == '/' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_line() {
        let mut buffer = String::new();
        let tags = vec![format_tag("serverType", "connector"), format_tag("route", "room.join")];
        write_metric_line(&mut buffer, Some("game"), "response_time", "ms", 12.5, 0.5, &tags);

        assert_eq!(
            buffer,
            "game.response_time:12.5|ms|@0.5|#serverType:connector,route:room.join"
        );
    }

    #[test]
    fn unsampled_line_without_tags() {
        let mut buffer = String::new();
        write_metric_line(&mut buffer, None, "exceeded_rate_limiting", "c", 1, 1.0, &[]);

        assert_eq!(buffer, "exceeded_rate_limiting:1|c");
    }

    #[test]
    fn sanitizes_names_and_tags() {
        assert_eq!(sanitize_metric_name("1heap size"), "_heap_size");
        assert_eq!(sanitize_label("9code:"), "_code_");
        assert_eq!(sanitize_label_value("GAME-404 not found"), "GAME-404_not_found");
        assert_eq!(format_tag("status", "ok"), "status:ok");
    }
}
