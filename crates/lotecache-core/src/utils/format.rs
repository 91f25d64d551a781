use std::collections::HashSet;

use serde_json::Value;

/// Render a JSON value the way a spreadsheet cell would print it.
/// Arrays are joined with commas; objects and null have no text form.
fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|v| cell_text(v).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Null | Value::Object(_) => None,
    }
}

/// Length of the longest decimal-number prefix of `s` (sign, digits,
/// fraction, exponent). Zero if `s` does not start with a number.
fn float_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if digits > 0 || j > frac_start {
            digits += j - frac_start;
            i = j;
        }
    }
    if digits == 0 {
        return 0;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    i
}

fn parse_float_text(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    let trimmed = cleaned.trim_start();
    let len = float_prefix_len(trimmed);
    if len == 0 {
        return None;
    }
    trimmed[..len].parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_int_text(text: &str) -> Option<i64> {
    let cleaned = text.replace(',', "");
    let trimmed = cleaned.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    trimmed[..end].parse::<i64>().ok()
}

/// Parse a possibly comma-formatted number ("1,250,000.00") from a loose
/// source value. Uses the leading numeric prefix; 0 when nothing parses.
pub fn parse_float_lenient(value: &Value) -> f64 {
    if let Value::Number(n) = value {
        return n.as_f64().unwrap_or(0.0);
    }
    cell_text(value)
        .and_then(|text| parse_float_text(&text))
        .unwrap_or(0.0)
}

/// Integer counterpart of [`parse_float_lenient`]. Fractions are truncated
/// ("2020.7" is 2020).
pub fn parse_int_lenient(value: &Value) -> i64 {
    if let Value::Number(n) = value {
        if let Some(i) = n.as_i64() {
            return i;
        }
        return n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
            .unwrap_or(0);
    }
    cell_text(value)
        .and_then(|text| parse_int_text(&text))
        .unwrap_or(0)
}

/// Non-empty text form of a scalar cell.
pub fn opt_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Truthiness of a cell: checkboxes, non-zero numbers, non-empty text.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// A list cell: either a JSON array of strings or one comma-separated
/// string. Entries are trimmed and empties dropped.
pub fn split_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Only absolute http(s) URLs count as images.
pub fn is_valid_image_url(url: &str) -> bool {
    let trimmed = url.trim();
    !trimmed.is_empty() && trimmed.starts_with("http")
}

/// Drop repeats, keeping the first occurrence of each entry.
pub fn dedup_preserving_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// URL slug for a listing title: "Nissan Versa Advance 2021" becomes
/// "nissan-versa-advance-2021".
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.to_lowercase().chars().map(fold_accent) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}
