//! Raw `Name: value` header line splitting

/// Split a header line at its first colon.
///
/// Exactly one leading space is removed from the value. Lines without a
/// colon or with an empty name yield `None`.
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    if name.is_empty() {
        return None;
    }
    let value = value.strip_prefix(' ').unwrap_or(value);
    Some((name.to_string(), value.to_string()))
}

/// Parse many lines, dropping the ones that are not headers.
pub fn parse_header_lines<I, S>(lines: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| parse_header_line(line.as_ref()))
        .collect()
}
