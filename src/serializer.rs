//! Analysis report serialization.
//!
//! The analysis behind a run can be dumped as YAML or JSON for inspection, and every output
//! file of the pipeline goes through [`write_to_file`].

use crate::analyzer::ProjectAnalysis;
use crate::error::Error;
use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::Path;

/// Serializes a project analysis to YAML.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn serialize_yaml(analysis: &ProjectAnalysis) -> Result<String> {
    debug!("Serializing analysis report to YAML");
    serde_yaml::to_string(analysis)
        .map_err(Error::from)
        .context("Failed to serialize analysis report to YAML")
}

/// Serializes a project analysis to pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn serialize_json(analysis: &ProjectAnalysis) -> Result<String> {
    debug!("Serializing analysis report to JSON");
    serde_json::to_string_pretty(analysis)
        .map_err(Error::from)
        .context("Failed to serialize analysis report to JSON")
}

/// Writes string content to a file.
///
/// Parent directories are created as needed and an existing file is overwritten.
///
/// # Errors
///
/// Returns an error if a directory cannot be created or the file cannot be written.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(Error::from)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, content)
        .map_err(Error::from)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

    debug!("Successfully wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzedClass, AppAnalysis};
    use crate::extractor::{
        ClassDescriptor, EndpointDescriptor, FieldDescriptor, HttpMethod, SemanticType,
    };
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_analysis() -> ProjectAnalysis {
        ProjectAnalysis {
            project_name: "Test API".to_string(),
            version: "1.0.0".to_string(),
            apps: vec![AppAnalysis {
                name: "users".to_string(),
                root_path: PathBuf::from("project/users"),
                python_file_count: 3,
                uses_rest_framework: true,
                models: Vec::new(),
                serializers: vec![AnalyzedClass {
                    class: ClassDescriptor {
                        name: "UserSerializer".to_string(),
                        source_file: PathBuf::from("project/users/serializers.py"),
                        line: 3,
                        base_types: vec!["serializers.Serializer".to_string()],
                        docstring: None,
                        block: Default::default(),
                        module_constants: Default::default(),
                    },
                    fields: vec![FieldDescriptor::new(
                        "tags",
                        SemanticType::list_of(SemanticType::String),
                    )],
                }],
                views: Vec::new(),
                endpoints: vec![EndpointDescriptor {
                    path: "/users/".to_string(),
                    http_method: HttpMethod::Get,
                    handler_class: "UserViewSet".to_string(),
                    handler_function: "list".to_string(),
                    description: "List users".to_string(),
                    serializer_class: Some("UserSerializer".to_string()),
                    permission_classes: Vec::new(),
                }],
            }],
        }
    }

    #[test]
    fn test_serialize_yaml() {
        let yaml = serialize_yaml(&create_test_analysis()).unwrap();

        assert!(yaml.contains("project_name: Test API"));
        assert!(yaml.contains("name: users"));
        assert!(yaml.contains("http_method: GET"));
        assert!(yaml.contains("kind: list_of"));
    }

    #[test]
    fn test_serialize_json() {
        let json = serialize_json(&create_test_analysis()).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["project_name"], "Test API");
        let app = &parsed["apps"][0];
        assert_eq!(app["endpoints"][0]["http_method"], "GET");
        assert_eq!(
            app["serializers"][0]["fields"][0]["semantic_type"]["of"]["kind"],
            "string"
        );
        assert_eq!(app["serializers"][0]["class"]["name"], "UserSerializer");
        assert!(app["serializers"][0]["class"].get("block").is_none());
    }

    #[test]
    fn test_serialize_json_pretty_format() {
        let json = serialize_json(&create_test_analysis()).unwrap();

        assert!(json.contains('\n'));
        assert!(json.contains("  "));
        assert!(json.lines().count() > 5, "Pretty printed JSON should have multiple lines");
    }

    #[test]
    fn test_write_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("report.yaml");

        write_to_file("test content", &file_path).unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "test content");
    }

    #[test]
    fn test_write_to_file_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("subdir").join("nested").join("report.yaml");

        write_to_file("test content", &file_path).unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "test content");
    }

    #[test]
    fn test_write_to_file_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("report.yaml");

        write_to_file("initial content", &file_path).unwrap();
        write_to_file("new content", &file_path).unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "new content");
    }

    #[test]
    fn test_write_to_file_under_a_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let err = write_to_file("x", &blocker.join("report.yaml")).unwrap_err();

        assert!(err.to_string().contains("Failed to create directory"));
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::IoError(_))));
        assert!(format!("{:#}", err).contains("IO error"));
    }
}
