//! Identifier case conversions shared by the extractor, synthesizer and renderers.

/// Converts `snake_case`, `kebab-case` or space separated words to `PascalCase`.
///
/// Existing capitals inside a word are kept, so `UserProfile` stays as it is.
pub fn pascal_case(input: &str) -> String {
    input
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Converts `PascalCase` or `snake_case` to `kebab-case`.
///
/// Acronym runs stay together: `APIKey` becomes `api-key`.
pub fn kebab_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == ' ' || c == '-' {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map_or(false, |n| n.is_ascii_lowercase());
            let boundary = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower);
            if boundary && !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
        }
        out.push(c.to_ascii_lowercase());
    }

    out.trim_end_matches('-').to_string()
}

/// Converts a choice value or label into an `UPPER_SNAKE` enum member symbol.
///
/// Symbols that would start with a digit, or are empty, get a `VALUE_` prefix.
pub fn constant_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_uppercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_end_matches('_').to_string();

    match out.chars().next() {
        None => "VALUE".to_string(),
        Some(c) if c.is_ascii_digit() => format!("VALUE_{}", out),
        Some(_) => out,
    }
}

/// Turns an identifier such as `partial_update` into `Partial Update`.
pub fn title_words(input: &str) -> String {
    input
        .split(|c: char| c == '_' || c == '-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Removes `suffix` from `name`, keeping the full name when nothing would remain.
pub fn strip_suffix_nonempty<'a>(name: &'a str, suffix: &str) -> &'a str {
    match name.strip_suffix(suffix) {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => name,
    }
}
