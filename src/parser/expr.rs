//! Literal-level reading of Python expressions.
//!
//! Only the subset of Python that appears in declarative DRF code is understood: literals,
//! containers, dotted names and calls with positional and keyword arguments. Anything else is
//! preserved as [`PyValue::Raw`] so callers can still report it verbatim.

use serde::Serialize;
use std::fmt;

/// A Python expression reduced to the shapes the extractors care about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PyValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<PyValue>),
    Tuple(Vec<PyValue>),
    Dict(Vec<(PyValue, PyValue)>),
    /// A bare or dotted name such as `serializers.CharField` or `STATUS_CHOICES`
    Name(String),
    Call(Call),
    /// Expression text that is not understood
    Raw(String),
}

/// A call expression: `callee(arg, ..., key=value, ...)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub callee: String,
    pub args: Vec<PyValue>,
    pub kwargs: Vec<(String, PyValue)>,
}

const TRANSLATION_CALLS: [&str; 6] = [
    "_",
    "gettext",
    "gettext_lazy",
    "ugettext",
    "ugettext_lazy",
    "pgettext_lazy",
];

impl Call {
    /// Last dotted segment of the callee: `serializers.CharField` gives `CharField`.
    pub fn short_name(&self) -> &str {
        last_segment(&self.callee)
    }

    /// Looks up a keyword argument.
    pub fn kwarg(&self, name: &str) -> Option<&PyValue> {
        self.kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Returns whether a keyword argument is the literal `True`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.kwarg(name), Some(PyValue::Bool(true)))
    }

    /// Returns whether a keyword argument is the literal `False`.
    pub fn flag_false(&self, name: &str) -> bool {
        matches!(self.kwarg(name), Some(PyValue::Bool(false)))
    }
}

impl PyValue {
    /// String content, looking through translation wrappers such as `_("Name")`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PyValue::Str(s) => Some(s),
            PyValue::Call(call) if TRANSLATION_CALLS.contains(&call.callee.as_str()) => {
                call.args.first()?.as_str()
            }
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Elements of a list or tuple literal.
    pub fn as_seq(&self) -> Option<&[PyValue]> {
        match self {
            PyValue::List(items) | PyValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PyValue::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match self {
            PyValue::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Looks up a string key in a dict literal.
    pub fn dict_get(&self, key: &str) -> Option<&PyValue> {
        match self {
            PyValue::Dict(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Strings of a list or tuple literal, skipping non-string elements.
    pub fn string_items(&self) -> Vec<String> {
        self.as_seq()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for PyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PyValue::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            PyValue::Int(i) => write!(f, "{}", i),
            PyValue::Float(x) => write!(f, "{:?}", x),
            PyValue::Bool(true) => write!(f, "True"),
            PyValue::Bool(false) => write!(f, "False"),
            PyValue::None => write!(f, "None"),
            PyValue::List(items) => write!(f, "[{}]", join(items)),
            PyValue::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            PyValue::Tuple(items) => write!(f, "({})", join(items)),
            PyValue::Dict(entries) => {
                let parts: Vec<String> =
                    entries.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            PyValue::Name(name) => write!(f, "{}", name),
            PyValue::Call(call) => {
                let mut parts: Vec<String> = call.args.iter().map(|a| a.to_string()).collect();
                parts.extend(call.kwargs.iter().map(|(k, v)| format!("{}={}", k, v)));
                write!(f, "{}({})", call.callee, parts.join(", "))
            }
            PyValue::Raw(text) => write!(f, "{}", text),
        }
    }
}

fn join(items: &[PyValue]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Last segment of a dotted name.
pub fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

pub(crate) fn is_dotted_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !text.ends_with('.')
        && !text.contains("..")
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

fn is_identifier(text: &str) -> bool {
    is_dotted_name(text) && !text.contains('.')
}

/// Parses an expression into a [`PyValue`]. Never fails; unknown shapes become `Raw`.
pub fn parse_value(text: &str) -> PyValue {
    let text = text.trim();
    if text.is_empty() {
        return PyValue::Raw(String::new());
    }

    if let Some(s) = parse_string_concat(text) {
        return PyValue::Str(s);
    }

    match text {
        "None" => return PyValue::None,
        "True" => return PyValue::Bool(true),
        "False" => return PyValue::Bool(false),
        _ => {}
    }

    if let Some(number) = parse_number(text) {
        return number;
    }

    let bytes = text.as_bytes();
    let last = text.len() - 1;
    match bytes[0] {
        b'[' if matching_close(text, 0) == Some(last) => {
            return PyValue::List(parse_items(&text[1..last]));
        }
        b'(' if matching_close(text, 0) == Some(last) => {
            let inner = &text[1..last];
            let parts = split_top_level(inner, ',');
            if inner.trim().is_empty() {
                return PyValue::Tuple(Vec::new());
            }
            if parts.len() == 1 && !inner.trim_end().ends_with(',') {
                return parse_value(inner);
            }
            return PyValue::Tuple(parts.into_iter().map(parse_value).collect());
        }
        b'{' if matching_close(text, 0) == Some(last) => {
            return parse_dict(text, &text[1..last]);
        }
        _ => {}
    }

    if is_dotted_name(text) {
        return PyValue::Name(text.to_string());
    }

    if let Some(call) = parse_call(text) {
        return PyValue::Call(call);
    }

    PyValue::Raw(text.to_string())
}

fn parse_items(inner: &str) -> Vec<PyValue> {
    split_top_level(inner, ',')
        .into_iter()
        .map(parse_value)
        .collect()
}

fn parse_dict(text: &str, inner: &str) -> PyValue {
    let mut entries = Vec::new();
    for item in split_top_level(inner, ',') {
        match find_top_level(item, b':') {
            Some(idx) => entries.push((parse_value(&item[..idx]), parse_value(&item[idx + 1..]))),
            None => return PyValue::Raw(text.to_string()),
        }
    }
    PyValue::Dict(entries)
}

fn parse_number(text: &str) -> Option<PyValue> {
    let first = text.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '.') {
        return None;
    }
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    if let Ok(i) = cleaned.parse::<i64>() {
        return Some(PyValue::Int(i));
    }
    if cleaned.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(x) = cleaned.parse::<f64>() {
            return Some(PyValue::Float(x));
        }
    }
    None
}

fn parse_call(text: &str) -> Option<Call> {
    let open = text.find('(')?;
    let callee = text[..open].trim();
    if !is_dotted_name(callee) || matching_close(text, open)? != text.len() - 1 {
        return None;
    }

    let mut call = Call {
        callee: callee.to_string(),
        args: Vec::new(),
        kwargs: Vec::new(),
    };

    for arg in split_top_level(&text[open + 1..text.len() - 1], ',') {
        if arg.starts_with('*') {
            continue;
        }
        match keyword_split(arg) {
            Some((key, value)) => call.kwargs.push((key.to_string(), parse_value(value))),
            None => call.args.push(parse_value(arg)),
        }
    }

    Some(call)
}

/// Splits `key=value` when `key` is an identifier and `=` is not a comparison.
fn keyword_split(arg: &str) -> Option<(&str, &str)> {
    let idx = find_top_level(arg, b'=')?;
    let bytes = arg.as_bytes();
    if bytes.get(idx + 1) == Some(&b'=') {
        return None;
    }
    let key = arg[..idx].trim();
    is_identifier(key).then(|| (key, arg[idx + 1..].trim()))
}

/// Returns the index just past a string literal that starts at `start` (a quote byte).
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let triple = bytes.len() >= start + 3 && bytes[start + 1] == quote && bytes[start + 2] == quote;
    let mut i = if triple { start + 3 } else { start + 1 };

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => {
                if !triple {
                    return i + 1;
                }
                if bytes.len() >= i + 3 && bytes[i + 1] == quote && bytes[i + 2] == quote {
                    return i + 3;
                }
                i += 1;
            }
            b'\n' if !triple => return i,
            _ => i += 1,
        }
    }

    bytes.len()
}

/// Index of the bracket closing the one at `open`, skipping nested brackets and strings.
pub fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Index of the first `target` byte outside brackets and strings.
pub fn find_top_level(text: &str, target: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                i = skip_string(bytes, i);
                continue;
            }
            b if b == target && depth == 0 => return Some(i),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }

    None
}

/// Splits on `sep` outside brackets and strings. Pieces are trimmed; a trailing empty piece
/// (from a trailing separator) is dropped.
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;

    while let Some(idx) = find_top_level(rest, sep as u8) {
        parts.push(rest[..idx].trim());
        rest = &rest[idx + sep.len_utf8()..];
    }
    let tail = rest.trim();
    if !tail.is_empty() {
        parts.push(tail);
    }

    parts.retain(|p| !p.is_empty());
    parts
}

/// Parses one or more adjacent string literals (implicit concatenation) making up the whole
/// text. Returns `None` when anything other than string literals is present.
pub fn parse_string_concat(text: &str) -> Option<String> {
    let mut rest = text.trim();
    let mut out = String::new();
    let mut seen = false;

    while !rest.is_empty() {
        let (value, consumed) = parse_string_literal(rest)?;
        out.push_str(&value);
        rest = rest[consumed..].trim_start();
        seen = true;
    }

    seen.then_some(out)
}

/// Parses a single string literal at the start of `text`, with optional prefix letters.
/// Returns the decoded value and the number of bytes consumed.
fn parse_string_literal(text: &str) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while start < bytes.len().min(2) && b"rRbBuUfF".contains(&bytes[start]) {
        start += 1;
    }
    let quote = *bytes.get(start)?;
    if quote != b'\'' && quote != b'"' {
        return None;
    }
    let raw = text[..start].contains(['r', 'R']);
    let end = skip_string(bytes, start);
    let triple = end >= start + 6
        && bytes[start + 1] == quote
        && bytes[start + 2] == quote
        && text[..end].ends_with(&text[start..start + 3]);
    let (open_len, close_len) = if triple { (3, 3) } else { (1, 1) };
    if end < start + open_len + close_len || bytes[end - 1] != quote {
        return None;
    }

    let body = &text[start + open_len..end - close_len];
    Some((if raw { body.to_string() } else { unescape(body) }, end))
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(text: &str) -> Call {
        match parse_value(text) {
            PyValue::Call(call) => call,
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_value("'hello'"), PyValue::Str("hello".to_string()));
        assert_eq!(parse_value("\"a\" 'b'"), PyValue::Str("ab".to_string()));
        assert_eq!(parse_value("r'^\\d+$'"), PyValue::Str("^\\d+$".to_string()));
        assert_eq!(parse_value("42"), PyValue::Int(42));
        assert_eq!(parse_value("-1"), PyValue::Int(-1));
        assert_eq!(parse_value("1_000"), PyValue::Int(1000));
        assert_eq!(parse_value("2.5"), PyValue::Float(2.5));
        assert_eq!(parse_value("True"), PyValue::Bool(true));
        assert_eq!(parse_value("None"), PyValue::None);
        assert_eq!(
            parse_value("models.CASCADE"),
            PyValue::Name("models.CASCADE".to_string())
        );
    }

    #[test]
    fn test_parse_triple_quoted_string() {
        assert_eq!(
            parse_value("\"\"\"Line one\nLine \"two\" here\"\"\""),
            PyValue::Str("Line one\nLine \"two\" here".to_string())
        );
    }

    #[test]
    fn test_parse_containers() {
        assert_eq!(
            parse_value("['id', 'name',]"),
            PyValue::List(vec![
                PyValue::Str("id".to_string()),
                PyValue::Str("name".to_string())
            ])
        );
        assert_eq!(
            parse_value("('a',)"),
            PyValue::Tuple(vec![PyValue::Str("a".to_string())])
        );
        assert_eq!(parse_value("(1)"), PyValue::Int(1));

        let dict = parse_value("{'get': 'list', 'post': 'create'}");
        assert_eq!(dict.dict_get("post").and_then(PyValue::as_str), Some("create"));
    }

    #[test]
    fn test_parse_call_with_kwargs() {
        let field = call("serializers.CharField(max_length=100, required=False, help_text=_('User name'))");

        assert_eq!(field.callee, "serializers.CharField");
        assert_eq!(field.short_name(), "CharField");
        assert_eq!(field.kwarg("max_length"), Some(&PyValue::Int(100)));
        assert!(field.flag_false("required"));
        assert_eq!(
            field.kwarg("help_text").and_then(PyValue::as_str),
            Some("User name")
        );
    }

    #[test]
    fn test_parse_call_with_nested_brackets_and_strings() {
        let field = call("ChoiceField(choices=[('a', 'A, with comma'), ('b', 'B (b)')])");
        let choices = field.kwarg("choices").and_then(PyValue::as_seq).unwrap();

        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].as_seq().unwrap()[1].as_str(), Some("A, with comma"));
    }

    #[test]
    fn test_comparison_is_not_a_keyword() {
        let value = call("check(a == b)");
        assert!(value.kwargs.is_empty());
        assert_eq!(value.args.len(), 1);
    }

    #[test]
    fn test_unknown_shapes_are_raw() {
        assert!(matches!(parse_value("a + b"), PyValue::Raw(_)));
        assert!(matches!(parse_value("User.objects.all()[:5]"), PyValue::Raw(_)));
    }

    #[test]
    fn test_display_round_trips_python_text() {
        assert_eq!(parse_value("'it\\'s'").to_string(), "'it\\'s'");
        assert_eq!(parse_value("[1, 'a']").to_string(), "[1, 'a']");
        assert_eq!(parse_value("timezone.now").to_string(), "timezone.now");
        assert_eq!(parse_value("f(1, x=2)").to_string(), "f(1, x=2)");
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("a, f(b, c), 'd,e',", ','),
            vec!["a", "f(b, c)", "'d,e'"]
        );
    }
}
