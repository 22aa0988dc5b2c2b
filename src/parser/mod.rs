//! Python source reader.
//!
//! The reader does not build a full syntax tree. It splits a file into logical lines, groups
//! them into indentation blocks and recognizes the statement shapes that declarative Django
//! code is written in: class and function definitions, assignments, imports and bare
//! expressions such as `router.register(...)`.

pub mod expr;

use anyhow::{Context, Result};
use log::{debug, warn};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use expr::{find_top_level, parse_string_concat, parse_value, PyValue};

/// Reader for Python source files.
///
/// # Example
///
/// ```no_run
/// use drf_docs_from_source::parser::SourceParser;
/// use std::path::Path;
///
/// let parsed = SourceParser::parse_file(Path::new("users/serializers.py")).unwrap();
/// println!("Found {} classes", parsed.classes.len());
/// ```
pub struct SourceParser;

/// One logical line: a physical line plus any bracket or backslash continuations, with
/// comments removed.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalLine {
    /// 1-based number of the first physical line
    pub line: usize,
    /// Indentation column of the first physical line
    pub indent: usize,
    pub text: String,
}

/// A statement at one indentation level: its decorators, its head line and the lines
/// indented below it.
#[derive(Debug)]
pub struct Statement<'a> {
    pub decorators: Vec<&'a LogicalLine>,
    pub head: &'a LogicalLine,
    pub body: &'a [LogicalLine],
}

/// A class definition.
#[derive(Debug, Clone, Default)]
pub struct ClassBlock {
    pub name: String,
    /// Base expressions as written, keyword arguments such as `metaclass=` removed
    pub bases: Vec<String>,
    pub line: usize,
    pub docstring: Option<String>,
    pub body: Vec<LogicalLine>,
}

/// A function or method definition.
#[derive(Debug, Clone)]
pub struct FunctionBlock {
    pub name: String,
    /// Decorator expressions without the leading `@`
    pub decorators: Vec<String>,
    pub line: usize,
    pub docstring: Option<String>,
    pub body: Vec<LogicalLine>,
}

/// A simple or augmented (`+=`) assignment to a name.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub target: String,
    pub value: PyValue,
    pub value_text: String,
    pub augmented: bool,
    pub line: usize,
}

/// The statements of one block, sorted by kind.
#[derive(Debug, Clone, Default)]
pub struct Suite {
    pub classes: Vec<ClassBlock>,
    pub functions: Vec<FunctionBlock>,
    pub assignments: Vec<Assignment>,
    pub imports: Vec<String>,
    /// Statements of any other shape, head line only
    pub expressions: Vec<LogicalLine>,
}

/// A parsed Python file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub classes: Vec<ClassBlock>,
    pub functions: Vec<FunctionBlock>,
    pub assignments: Vec<Assignment>,
    pub imports: Vec<String>,
    pub expressions: Vec<LogicalLine>,
}

const NON_ASSIGNMENT_KEYWORDS: [&str; 18] = [
    "if", "elif", "else", "for", "while", "with", "try", "except", "finally", "return",
    "assert", "raise", "del", "pass", "yield", "lambda", "global", "nonlocal",
];

fn class_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^class\s+([A-Za-z_]\w*)\s*(?:\((.*)\))?$").expect("valid class regex")
    })
}

fn def_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("valid def regex")
    })
}

impl SourceParser {
    /// Parses a single Python source file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid UTF-8.
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        Ok(Self::parse_source(path, &content))
    }

    /// Parses source text that has already been read.
    pub fn parse_source(path: &Path, source: &str) -> ParsedFile {
        let lines = logical_lines(source);
        let suite = Suite::from_lines(&lines);

        ParsedFile {
            path: path.to_path_buf(),
            classes: suite.classes,
            functions: suite.functions,
            assignments: suite.assignments,
            imports: suite.imports,
            expressions: suite.expressions,
        }
    }

    /// Parses multiple files, continuing even if some fail.
    ///
    /// Failures are logged as warnings and returned in place so the caller can report them.
    pub fn parse_files(paths: &[PathBuf]) -> Vec<Result<ParsedFile>> {
        debug!("Parsing {} files", paths.len());

        let results: Vec<Result<ParsedFile>> = paths
            .iter()
            .map(|path| match Self::parse_file(path) {
                Ok(parsed) => Ok(parsed),
                Err(e) => {
                    warn!("Failed to parse {}: {:#}", path.display(), e);
                    Err(e)
                }
            })
            .collect();

        let success_count = results.iter().filter(|r| r.is_ok()).count();
        debug!(
            "Parsing complete: {} succeeded, {} failed",
            success_count,
            results.len() - success_count
        );

        results
    }
}

impl ParsedFile {
    /// Value of the last plain assignment to a module-level name.
    pub fn constant(&self, name: &str) -> Option<&PyValue> {
        self.assignments
            .iter()
            .rev()
            .find(|a| a.target == name && !a.augmented)
            .map(|a| &a.value)
    }

    /// File stem, used as the handler class of function views.
    pub fn module_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

impl ClassBlock {
    /// Parses the class body into its statements.
    pub fn suite(&self) -> Suite {
        Suite::from_lines(&self.body)
    }

    /// A directly nested class such as `Meta`.
    pub fn inner_class(&self, name: &str) -> Option<ClassBlock> {
        self.suite().classes.into_iter().find(|c| c.name == name)
    }
}

impl Suite {
    /// Sorts the statements of a block by shape.
    pub fn from_lines(lines: &[LogicalLine]) -> Self {
        let mut suite = Suite::default();

        for stmt in statements(lines) {
            let text = stmt.head.text.as_str();

            if text.starts_with("class ") {
                match parse_class(&stmt) {
                    Some(class) => suite.classes.push(class),
                    None => debug!("Unrecognized class header at line {}: {}", stmt.head.line, text),
                }
            } else if text.starts_with("def ") || text.starts_with("async ") {
                if let Some(function) = parse_function(&stmt) {
                    suite.functions.push(function);
                }
            } else if text.starts_with("import ") || text.starts_with("from ") {
                suite.imports.push(text.to_string());
            } else if let Some(assignment) = parse_assignment(stmt.head) {
                suite.assignments.push(assignment);
            } else {
                suite.expressions.push(stmt.head.clone());
            }
        }

        suite
    }

    /// Value of the last plain assignment to `name` in this block.
    pub fn value_of(&self, name: &str) -> Option<&PyValue> {
        self.assignments
            .iter()
            .rev()
            .find(|a| a.target == name && !a.augmented)
            .map(|a| &a.value)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionBlock> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Splits a compound statement head into its header and an inline suite (`class A: pass`).
fn split_header(text: &str) -> (&str, &str) {
    match find_top_level(text, b':') {
        Some(idx) => (text[..idx].trim(), text[idx + 1..].trim()),
        None => (text.trim(), ""),
    }
}

fn block_body(stmt: &Statement<'_>, inline: &str) -> Vec<LogicalLine> {
    if inline.is_empty() {
        return stmt.body.to_vec();
    }
    vec![LogicalLine {
        line: stmt.head.line,
        indent: stmt.head.indent + 4,
        text: inline.to_string(),
    }]
}

fn parse_class(stmt: &Statement<'_>) -> Option<ClassBlock> {
    let (header, inline) = split_header(&stmt.head.text);
    let caps = class_header_regex().captures(header)?;

    let bases = caps
        .get(2)
        .map(|m| {
            expr::split_top_level(m.as_str(), ',')
                .into_iter()
                .filter(|base| expr::find_top_level(base, b'=').is_none())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let body = block_body(stmt, inline);
    Some(ClassBlock {
        name: caps[1].to_string(),
        bases,
        line: stmt.head.line,
        docstring: docstring(&body),
        body,
    })
}

fn parse_function(stmt: &Statement<'_>) -> Option<FunctionBlock> {
    let (_, inline) = split_header(&stmt.head.text);
    let caps = def_header_regex().captures(&stmt.head.text)?;

    let body = block_body(stmt, inline);
    Some(FunctionBlock {
        name: caps[1].to_string(),
        decorators: stmt
            .decorators
            .iter()
            .map(|d| d.text.trim_start_matches('@').trim().to_string())
            .collect(),
        line: stmt.head.line,
        docstring: docstring(&body),
        body,
    })
}

fn parse_assignment(line: &LogicalLine) -> Option<Assignment> {
    let text = line.text.as_str();
    let first_word = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or_default();
    if NON_ASSIGNMENT_KEYWORDS.contains(&first_word) {
        return None;
    }

    let idx = find_top_level(text, b'=')?;
    let bytes = text.as_bytes();
    if bytes.get(idx + 1) == Some(&b'=') {
        return None;
    }
    let (target_end, augmented) = match idx.checked_sub(1).map(|p| bytes[p]) {
        Some(b'+') => (idx - 1, true),
        Some(b'!' | b'<' | b'>' | b'=' | b'-' | b'*' | b'/' | b'%' | b'|' | b'&' | b'^') => {
            return None
        }
        _ => (idx, false),
    };

    let mut target = text[..target_end].trim();
    if let Some(colon) = find_top_level(target, b':') {
        target = target[..colon].trim();
    }
    if !expr::is_dotted_name(target) {
        return None;
    }

    let value_text = text[idx + 1..].trim().to_string();
    Some(Assignment {
        target: target.to_string(),
        value: parse_value(&value_text),
        value_text,
        augmented,
        line: line.line,
    })
}

/// Docstring of a block: its first statement, when that is a string literal.
fn docstring(body: &[LogicalLine]) -> Option<String> {
    let first = body.first()?;
    let raw = parse_string_concat(&first.text)?;
    clean_docstring(&raw)
}

/// Trims a docstring and removes the common indentation of its continuation lines.
pub fn clean_docstring(raw: &str) -> Option<String> {
    let mut lines: Vec<&str> = raw.lines().collect();
    if lines.is_empty() {
        return None;
    }

    // Margins are counted in chars: indentation may contain multi-byte whitespace.
    let indent = |line: &str| line.chars().take_while(|c| c.is_whitespace()).count();
    let margin = lines[1..]
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent(*l))
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    cleaned.push(lines.remove(0).trim().to_string());
    for line in lines {
        let cut = line
            .char_indices()
            .nth(margin.min(indent(line)))
            .map_or(line.len(), |(offset, _)| offset);
        cleaned.push(line[cut..].trim_end().to_string());
    }

    let text = cleaned.join("\n").trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Splits source text into logical lines.
///
/// Comments are dropped, newlines inside brackets and after a backslash are joined into a
/// single line, and string literals (including triple-quoted ones spanning several lines)
/// are kept verbatim.
pub fn logical_lines(source: &str) -> Vec<LogicalLine> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut lines = Vec::new();
    let mut buf = String::new();
    let mut line_no = 1;
    let mut start_line = 1;
    let mut indent = 0;
    let mut depth = 0usize;
    let mut at_line_start = true;
    let mut i = 0;

    let mut flush = |buf: &mut String, start_line: usize, indent: usize| {
        let text = buf.trim();
        if !text.is_empty() {
            lines.push(LogicalLine {
                line: start_line,
                indent,
                text: text.to_string(),
            });
        }
        buf.clear();
    };

    while i < len {
        if at_line_start {
            let mut col = 0;
            while i < len && matches!(chars[i], ' ' | '\t' | '\x0c') {
                col = if chars[i] == '\t' { (col / 8 + 1) * 8 } else { col + 1 };
                i += 1;
            }
            indent = col;
            start_line = line_no;
            at_line_start = false;
            continue;
        }

        let c = chars[i];
        match c {
            '#' => {
                while i < len && chars[i] != '\n' {
                    i += 1;
                }
            }
            '\'' | '"' => {
                let triple = i + 2 < len && chars[i + 1] == c && chars[i + 2] == c;
                let open_len = if triple { 3 } else { 1 };
                for _ in 0..open_len {
                    buf.push(c);
                }
                i += open_len;

                while i < len {
                    let ch = chars[i];
                    if ch == '\\' {
                        buf.push(ch);
                        if let Some(&next) = chars.get(i + 1) {
                            buf.push(next);
                            if next == '\n' {
                                line_no += 1;
                            }
                        }
                        i += 2;
                        continue;
                    }
                    if ch == c {
                        if !triple {
                            buf.push(ch);
                            i += 1;
                            break;
                        }
                        if i + 2 < len && chars[i + 1] == c && chars[i + 2] == c {
                            buf.push_str(&c.to_string().repeat(3));
                            i += 3;
                            break;
                        }
                    }
                    if ch == '\n' {
                        if !triple {
                            break;
                        }
                        line_no += 1;
                    }
                    buf.push(ch);
                    i += 1;
                }
            }
            '(' | '[' | '{' => {
                depth += 1;
                buf.push(c);
                i += 1;
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                buf.push(c);
                i += 1;
            }
            '\\' if matches!(chars.get(i + 1), Some('\n')) => {
                buf.push(' ');
                line_no += 1;
                i += 2;
            }
            '\r' => i += 1,
            '\n' => {
                line_no += 1;
                i += 1;
                if depth > 0 {
                    buf.push(' ');
                } else {
                    flush(&mut buf, start_line, indent);
                    at_line_start = true;
                }
            }
            _ => {
                buf.push(c);
                i += 1;
            }
        }
    }
    flush(&mut buf, start_line, indent);

    lines
}

/// Groups lines into statements at the smallest indentation present.
pub fn statements(lines: &[LogicalLine]) -> Vec<Statement<'_>> {
    let Some(base) = lines.iter().map(|l| l.indent).min() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut decorators = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        if line.indent > base {
            i += 1;
            continue;
        }
        if line.text.starts_with('@') {
            decorators.push(line);
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < lines.len() && lines[end].indent > base {
            end += 1;
        }
        out.push(Statement {
            decorators: std::mem::take(&mut decorators),
            head: line,
            body: &lines[start..end],
        });
        i = end;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Helper function to create a temporary file with content
    fn create_temp_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let file_path = dir.path().join(name);
        let mut file = fs::File::create(&file_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file_path
    }

    fn parse(source: &str) -> ParsedFile {
        SourceParser::parse_source(Path::new("app/serializers.py"), source)
    }

    #[test]
    fn test_logical_lines_join_brackets_and_strip_comments() {
        let lines = logical_lines(
            "x = [  # first\n    1,\n    2,\n]\ny = 'a # not a comment'\nz = 1 + \\\n    2\n",
        );

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].line, 1);
        assert!(lines[0].text.starts_with("x = ["));
        assert!(!lines[0].text.contains("first"));
        assert_eq!(lines[1].text, "y = 'a # not a comment'");
        assert_eq!(lines[1].line, 5);
        assert_eq!(lines[2].line, 6);
    }

    #[test]
    fn test_logical_lines_keep_triple_quoted_strings() {
        let lines = logical_lines("class A:\n    \"\"\"Doc.\n\n    More # text.\n    \"\"\"\n    x = 1\n");

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].indent, 4);
        assert!(lines[1].text.contains("More # text."));
        assert_eq!(lines[2].line, 6);
    }

    #[test]
    fn test_parse_classes_functions_and_constants() {
        let parsed = parse(
            r#"
from rest_framework import serializers
from .models import User

STATUS_CHOICES = [('a', 'Active'), ('i', 'Inactive')]


class UserSerializer(serializers.ModelSerializer, metaclass=Meta):
    """Serializer for users."""

    name = serializers.CharField(max_length=100)

    class Meta:
        model = User
        fields = ['id', 'name']

    def validate_name(self, value):
        return value


@api_view(['GET'])
def health(request):
    """Health check."""
    return Response({})
"#,
        );

        assert_eq!(parsed.imports.len(), 2);
        assert!(parsed.constant("STATUS_CHOICES").is_some());

        let class = &parsed.classes[0];
        assert_eq!(class.name, "UserSerializer");
        assert_eq!(class.bases, vec!["serializers.ModelSerializer"]);
        assert_eq!(class.docstring.as_deref(), Some("Serializer for users."));

        let suite = class.suite();
        assert_eq!(suite.assignments[0].target, "name");
        assert_eq!(suite.functions[0].name, "validate_name");
        let meta = class.inner_class("Meta").unwrap();
        assert_eq!(meta.suite().value_of("fields").unwrap().string_items(), vec!["id", "name"]);

        let function = &parsed.functions[0];
        assert_eq!(function.name, "health");
        assert_eq!(function.decorators, vec!["api_view(['GET'])"]);
        assert_eq!(function.docstring.as_deref(), Some("Health check."));
    }

    #[test]
    fn test_inline_class_body() {
        let parsed = parse("class Meta: fields = '__all__'\n");
        let meta = &parsed.classes[0];

        assert_eq!(
            meta.suite().value_of("fields"),
            Some(&PyValue::Str("__all__".to_string()))
        );
    }

    #[test]
    fn test_augmented_and_annotated_assignments() {
        let parsed = parse("urlpatterns = []\nurlpatterns += [path('a/', v)]\ncount: int = 3\nif x == 1:\n    pass\n");

        assert_eq!(parsed.assignments.len(), 3);
        assert!(parsed.assignments[1].augmented);
        assert_eq!(parsed.constant("count"), Some(&PyValue::Int(3)));
        assert_eq!(parsed.expressions.len(), 1);
    }

    #[test]
    fn test_clean_docstring() {
        assert_eq!(
            clean_docstring("\n    Summary line.\n\n    Details here.\n    ").as_deref(),
            Some("Summary line.\n\nDetails here.")
        );
        assert_eq!(clean_docstring("   "), None);
    }

    #[test]
    fn test_clean_docstring_with_wide_whitespace_indent() {
        assert_eq!(
            clean_docstring("Summary\n x\n\u{3000}wide indent\n    ").as_deref(),
            Some("Summary\nx\nwide indent")
        );
        assert_eq!(
            clean_docstring("Summary\n\u{3000}\u{3000}\u{a0}deep\n  shallow").as_deref(),
            Some("Summary\n\u{a0}deep\nshallow")
        );

        let parsed = parse("class A(View):\n    \"\"\"Summary\n x\n\u{3000}wide indent\n    \"\"\"\n");
        assert_eq!(
            parsed.classes[0].docstring.as_deref(),
            Some("Summary\nx\nwide indent")
        );
    }

    #[test]
    fn test_parse_file_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_temp_file(&temp_dir, "views.py", "class A(View):\n    pass\n");

        let parsed = SourceParser::parse_file(&path).unwrap();
        assert_eq!(parsed.classes.len(), 1);
        assert_eq!(parsed.module_name(), "views");
    }

    #[test]
    fn test_parse_files_continues_on_failure() {
        let temp_dir = TempDir::new().unwrap();
        let good = create_temp_file(&temp_dir, "models.py", "class A(models.Model):\n    pass\n");
        let missing = temp_dir.path().join("missing.py");

        let results = SourceParser::parse_files(&[good, missing]);

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
