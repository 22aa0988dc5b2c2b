//! Output rendering.
//!
//! Both renderers turn analysis results into text through minijinja templates compiled into
//! the binary and write one file per template instantiation. A file that fails to render or
//! write is recorded as a render error and the rest of the batch is still written.

pub mod sphinx;
pub mod typescript;

pub use sphinx::SphinxRenderer;
pub use typescript::TypeScriptRenderer;

use crate::error::Error;
use crate::serializer::write_to_file;
use log::{debug, info};
use minijinja::{AutoEscape, Environment};
use std::path::{Path, PathBuf};

/// Builds a template environment with the given `(name, source)` templates.
pub(crate) fn environment(
    templates: &[(&'static str, &'static str)],
) -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.add_filter("underline", underline);
    env.add_filter("pystr", pystr);

    for (name, source) in templates {
        env.add_template(name, source)?;
    }
    Ok(env)
}

/// reStructuredText title adornment as long as the title.
fn underline(title: String, adornment: Option<String>) -> String {
    let adornment = adornment.unwrap_or_else(|| "=".to_string());
    adornment.repeat(title.chars().count())
}

/// A Python string literal.
fn pystr(value: String) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Files produced by one renderer call.
pub(crate) struct OutputBatch<'e> {
    dry_run: bool,
    written: Vec<PathBuf>,
    errors: &'e mut Vec<String>,
}

impl<'e> OutputBatch<'e> {
    pub(crate) fn new(dry_run: bool, errors: &'e mut Vec<String>) -> Self {
        Self {
            dry_run,
            written: Vec::new(),
            errors,
        }
    }

    /// Writes rendered content to `path`, creating parent directories and overwriting any
    /// existing file. In dry-run mode nothing is written.
    pub(crate) fn emit(&mut self, path: PathBuf, rendered: Result<String, minijinja::Error>) {
        let content = match rendered {
            Ok(content) => content,
            Err(e) => {
                self.error(&path, e.to_string());
                return;
            }
        };

        if self.dry_run {
            debug!("Dry run, not writing {} ({} bytes)", path.display(), content.len());
            return;
        }

        match write_to_file(&content, &path) {
            Ok(()) => {
                info!("Wrote {}", path.display());
                self.written.push(path);
            }
            Err(e) => self.error(&path, format!("{:#}", e)),
        }
    }

    pub(crate) fn error(&mut self, path: &Path, message: impl Into<String>) {
        let error = Error::Render {
            path: path.to_path_buf(),
            message: message.into(),
        };
        log::error!("{}", error);
        self.errors.push(error.to_string());
    }

    pub(crate) fn finish(self) -> Vec<PathBuf> {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filters() {
        assert_eq!(underline("Users".to_string(), Some("-".to_string())), "-----");
        assert_eq!(underline("Été".to_string(), None), "===");
        assert_eq!(pystr("it's \\ ok".to_string()), r"'it\'s \\ ok'");
    }

    #[test]
    fn test_environment_settings() {
        let env = environment(&[(
            "t",
            "{{ title }}\n{{ title | underline('~') }}\n{% if flag %}\n<{{ value }}>\n{% endif %}\n",
        )])
        .unwrap();

        let out = env
            .get_template("t")
            .unwrap()
            .render(minijinja::context! { title => "Orders", flag => true, value => "a & b" })
            .unwrap();

        assert_eq!(out, "Orders\n~~~~~~\n<a & b>\n");
    }

    #[test]
    fn test_batch_writes_and_records_failures() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut errors = Vec::new();

        let mut batch = OutputBatch::new(false, &mut errors);
        batch.emit(temp_dir.path().join("a/b.txt"), Ok("hello".to_string()));
        batch.emit(blocker.join("c.txt"), Ok("never".to_string()));
        let written = batch.finish();

        assert_eq!(written, vec![temp_dir.path().join("a/b.txt")]);
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("a/b.txt")).unwrap(),
            "hello"
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Render error"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut errors = Vec::new();

        let mut batch = OutputBatch::new(true, &mut errors);
        batch.emit(temp_dir.path().join("x.txt"), Ok("hello".to_string()));

        assert!(batch.finish().is_empty());
        assert!(!temp_dir.path().join("x.txt").exists());
        assert!(errors.is_empty());
    }
}
