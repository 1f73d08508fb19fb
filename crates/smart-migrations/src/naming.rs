//! String conventions shared by the resolvers

use once_cell::sync::Lazy;
use regex::Regex;

static TIMESTAMP_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}_\d{2}_\d{2}_\d{6}_").expect("valid timestamp regex"));

/// Convert `UserProfiles` / `HTTPLogs` to `user_profiles` / `http_logs`.
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = if i > 0 { chars.get(i - 1) } else { None };
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if *p == '_' => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// English pluralization of the last word of a snake_case name
pub fn pluralize(name: &str) -> String {
    let (head, word) = match name.rfind('_') {
        Some(idx) => name.split_at(idx + 1),
        None => ("", name),
    };

    let plural = if word.is_empty() {
        String::new()
    } else if word.ends_with('y')
        && !["ay", "ey", "iy", "oy", "uy"].iter().any(|v| word.ends_with(v))
    {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with('s')
        || word.ends_with("sh")
        || word.ends_with("ch")
        || word.ends_with('x')
        || word.ends_with('z')
    {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    };

    format!("{}{}", head, plural)
}

/// Strip a leading `YYYY_MM_DD_NNNNNN_` prefix
pub fn strip_timestamp_prefix(name: &str) -> &str {
    match TIMESTAMP_PREFIX.find(name) {
        Some(m) => &name[m.end()..],
        None => name,
    }
}

/// Last segment of a `::`, `\` or `.` separated path
pub fn short_name(path: &str) -> &str {
    path.rsplit(|c| c == ':' || c == '\\' || c == '.')
        .next()
        .unwrap_or(path)
}
