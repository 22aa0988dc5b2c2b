use crate::parser::ParsedFile;
use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;

/// Framework detector for identifying the Django packages an application uses.
///
/// The `FrameworkDetector` examines the `import` and `from ... import` statements of parsed
/// Python files. Only the top-level package of each import is considered.
///
/// Currently supports detection of:
/// - Django (via `from django...`)
/// - Django REST Framework (via `from rest_framework...`)
/// - django-filter (via `from django_filters...`)
pub struct FrameworkDetector;

/// A package family recognized by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    Django,
    RestFramework,
    DjangoFilters,
}

/// Result of framework detection.
#[derive(Debug, Default)]
pub struct DetectionResult {
    /// Detected frameworks, in a stable order
    pub frameworks: Vec<Framework>,
}

impl DetectionResult {
    pub fn uses(&self, framework: Framework) -> bool {
        self.frameworks.contains(&framework)
    }
}

impl Framework {
    fn from_package(package: &str) -> Option<Self> {
        match package {
            "django" => Some(Framework::Django),
            "rest_framework" => Some(Framework::RestFramework),
            "django_filters" => Some(Framework::DjangoFilters),
            _ => None,
        }
    }
}

impl FrameworkDetector {
    /// Detects the frameworks imported by the provided parsed files.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use drf_docs_from_source::detector::{Framework, FrameworkDetector};
    /// use drf_docs_from_source::parser::SourceParser;
    /// use std::path::Path;
    ///
    /// let parsed = SourceParser::parse_file(Path::new("users/views.py")).unwrap();
    /// let result = FrameworkDetector::detect(&[parsed]);
    /// println!("DRF: {}", result.uses(Framework::RestFramework));
    /// ```
    pub fn detect(parsed_files: &[ParsedFile]) -> DetectionResult {
        debug!("Detecting frameworks in {} files", parsed_files.len());

        let mut detected = BTreeSet::new();
        for parsed_file in parsed_files {
            for import in &parsed_file.imports {
                for package in imported_packages(import) {
                    if let Some(framework) = Framework::from_package(package) {
                        detected.insert(framework);
                    }
                }
            }
        }

        let frameworks: Vec<Framework> = detected.into_iter().collect();
        debug!("Detected frameworks: {:?}", frameworks);

        DetectionResult { frameworks }
    }
}

/// Top-level packages named by an import statement.
///
/// `from a.b import c` names `a`; `import a.b as x, d` names `a` and `d`. Relative imports
/// name nothing.
fn imported_packages(statement: &str) -> Vec<&str> {
    fn top_level(module: &str) -> &str {
        module.trim().split('.').next().unwrap_or_default()
    }

    if let Some(rest) = statement.strip_prefix("from ") {
        let module = rest.split_whitespace().next().unwrap_or_default();
        if module.starts_with('.') {
            return Vec::new();
        }
        return vec![top_level(module)];
    }

    if let Some(rest) = statement.strip_prefix("import ") {
        return rest
            .split(',')
            .map(|part| top_level(part.split_whitespace().next().unwrap_or_default()))
            .filter(|package| !package.is_empty())
            .collect();
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SourceParser;
    use std::path::Path;

    fn parse(source: &str) -> ParsedFile {
        SourceParser::parse_source(Path::new("app/views.py"), source)
    }

    #[test]
    fn test_detect_rest_framework() {
        let parsed = parse(
            r#"
from rest_framework import viewsets
from rest_framework.decorators import action
from .models import User
"#,
        );

        let result = FrameworkDetector::detect(&[parsed]);

        assert_eq!(result.frameworks, vec![Framework::RestFramework]);
        assert!(result.uses(Framework::RestFramework));
    }

    #[test]
    fn test_detect_multiple_frameworks_across_files() {
        let models = parse("from django.db import models\n");
        let views = parse("import django_filters.rest_framework as filters, json\nfrom rest_framework import generics\n");

        let result = FrameworkDetector::detect(&[models, views]);

        assert_eq!(
            result.frameworks,
            vec![
                Framework::Django,
                Framework::RestFramework,
                Framework::DjangoFilters
            ]
        );
    }

    #[test]
    fn test_no_framework_detected() {
        let parsed = parse("import os\nfrom . import utils\n\ndef helper():\n    return 1\n");
        let result = FrameworkDetector::detect(&[parsed]);

        assert!(result.frameworks.is_empty());
    }

    #[test]
    fn test_imported_packages() {
        assert_eq!(imported_packages("from a.b import c"), vec!["a"]);
        assert_eq!(imported_packages("import a.b as x, d"), vec!["a", "d"]);
        assert!(imported_packages("from .models import User").is_empty());
    }
}
