//! Per-application analysis: parse the role files of an application and run every
//! extraction step over them.

use crate::config::ExtractionConfig;
use crate::detector::{Framework, FrameworkDetector};
use crate::error::Error;
use crate::extractor::{
    ClassDescriptor, EndpointDescriptor, FieldDescriptor, ModelIndex, StructureExtractor,
    ViewDescriptor,
};
use crate::parser::expr::last_segment;
use crate::parser::{ParsedFile, SourceParser};
use crate::scanner::ApplicationDescriptor;
use log::{debug, info};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A serializer or model class with its resolved fields.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedClass {
    pub class: ClassDescriptor,
    pub fields: Vec<FieldDescriptor>,
}

/// Everything extracted from one application module.
#[derive(Debug, Clone, Serialize)]
pub struct AppAnalysis {
    pub name: String,
    pub root_path: PathBuf,
    pub python_file_count: usize,
    pub uses_rest_framework: bool,
    pub models: Vec<AnalyzedClass>,
    pub serializers: Vec<AnalyzedClass>,
    pub views: Vec<ViewDescriptor>,
    pub endpoints: Vec<EndpointDescriptor>,
}

/// The analysis of a whole project, as written to the report file.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectAnalysis {
    pub project_name: String,
    pub version: String,
    pub apps: Vec<AppAnalysis>,
}

/// Runs extraction over the files of an application.
pub struct ProjectAnalyzer {
    config: ExtractionConfig,
}

impl ProjectAnalyzer {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Analyzes one application.
    ///
    /// Models are extracted first so serializers can resolve `Meta.fields` against them.
    /// Files that cannot be read are reported as warnings and otherwise ignored.
    pub fn analyze_app(&self, app: &ApplicationDescriptor) -> (AppAnalysis, Vec<String>) {
        debug!("Analyzing application '{}'", app.name);
        let mut warnings = Vec::new();

        let parsed = self.parse(
            &[
                &app.model_files,
                &app.serializer_files,
                &app.view_files,
                &app.url_files,
            ],
            &mut warnings,
        );
        let select = |groups: &[&Vec<PathBuf>]| -> Vec<ParsedFile> {
            parsed
                .iter()
                .filter(|file| groups.iter().any(|group| group.contains(&file.path)))
                .cloned()
                .collect()
        };
        let class_files = select(&[&app.model_files, &app.serializer_files, &app.view_files]);
        let route_files = select(&[&app.view_files, &app.url_files]);

        let detection = FrameworkDetector::detect(&class_files);

        let mut extractor = StructureExtractor::new(&self.config);
        let classes = extractor.extract_classes(&class_files);
        extractor.register_local_classes(&classes);

        let model_classes: Vec<&ClassDescriptor> =
            classes.iter().filter(|c| extractor.is_model_like(c)).collect();
        let models = resolve_inherited(&model_classes, |class| extractor.extract_fields(class));
        let model_index: ModelIndex = models
            .iter()
            .map(|m| (m.class.name.clone(), m.fields.clone()))
            .collect();

        let serializer_classes: Vec<&ClassDescriptor> = classes
            .iter()
            .filter(|c| extractor.is_serializer_like(c))
            .collect();
        let serializers = resolve_inherited(&serializer_classes, |class| {
            extractor.extract_fields_with_models(class, &model_index)
        });

        let views = extractor.extract_views(&route_files).items;
        let endpoints = extractor.extract_endpoints(&route_files);
        warnings.extend(endpoints.warnings);

        info!(
            "Application '{}': {} models, {} serializers, {} views, {} endpoints",
            app.name,
            models.len(),
            serializers.len(),
            views.len(),
            endpoints.items.len()
        );

        let analysis = AppAnalysis {
            name: app.name.clone(),
            root_path: app.root_path.clone(),
            python_file_count: app.python_files.len(),
            uses_rest_framework: detection.uses(Framework::RestFramework),
            models,
            serializers,
            views,
            endpoints: endpoints.items,
        };
        (analysis, warnings)
    }

    /// Parses the given file groups once each, in order, recording read failures.
    fn parse(&self, groups: &[&Vec<PathBuf>], warnings: &mut Vec<String>) -> Vec<ParsedFile> {
        let mut seen = BTreeSet::new();
        let paths: Vec<PathBuf> = groups
            .iter()
            .flat_map(|group| group.iter())
            .filter(|path| seen.insert((*path).clone()))
            .cloned()
            .collect();

        let mut parsed = Vec::new();
        for (path, result) in paths.iter().zip(SourceParser::parse_files(&paths)) {
            match result {
                Ok(file) => parsed.push(file),
                Err(e) => warnings.push(
                    Error::Extraction {
                        file: path.clone(),
                        message: format!("{:#}", e),
                    }
                    .to_string(),
                ),
            }
        }
        parsed
    }
}

/// Resolves fields for a family of classes, placing the fields of local base classes first.
///
/// A field redeclared by a subclass replaces the inherited one in place.
fn resolve_inherited<F>(classes: &[&ClassDescriptor], own_fields: F) -> Vec<AnalyzedClass>
where
    F: Fn(&ClassDescriptor) -> Vec<FieldDescriptor>,
{
    let by_name: BTreeMap<&str, &ClassDescriptor> =
        classes.iter().map(|c| (c.name.as_str(), *c)).collect();
    let mut resolved: BTreeMap<String, Vec<FieldDescriptor>> = BTreeMap::new();

    fn visit<'a, F>(
        class: &'a ClassDescriptor,
        by_name: &BTreeMap<&str, &'a ClassDescriptor>,
        own_fields: &F,
        resolved: &mut BTreeMap<String, Vec<FieldDescriptor>>,
        stack: &mut Vec<&'a str>,
    ) -> Vec<FieldDescriptor>
    where
        F: Fn(&ClassDescriptor) -> Vec<FieldDescriptor>,
    {
        if let Some(fields) = resolved.get(&class.name) {
            return fields.clone();
        }
        stack.push(&class.name);

        let mut fields: Vec<FieldDescriptor> = Vec::new();
        for base in &class.base_types {
            let Some(&parent) = by_name.get(last_segment(base)) else {
                continue;
            };
            if stack.contains(&parent.name.as_str()) {
                continue;
            }
            for field in visit(parent, by_name, own_fields, resolved, stack) {
                merge_field(&mut fields, field);
            }
        }
        for field in own_fields(class) {
            merge_field(&mut fields, field);
        }

        stack.pop();
        resolved.insert(class.name.clone(), fields.clone());
        fields
    }

    classes
        .iter()
        .map(|class| AnalyzedClass {
            class: (*class).clone(),
            fields: visit(*class, &by_name, &own_fields, &mut resolved, &mut Vec::new()),
        })
        .collect()
}

fn merge_field(fields: &mut Vec<FieldDescriptor>, field: FieldDescriptor) {
    match fields.iter_mut().find(|f| f.name == field.name) {
        Some(existing) => *existing = field,
        None => fields.push(field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::SemanticType;
    use crate::scanner::SourceScanner;
    use std::fs;
    use tempfile::TempDir;

    fn create_app(root: &std::path::Path, files: &[(&str, &str)]) -> ApplicationDescriptor {
        let app_dir = root.join("shop");
        fs::create_dir_all(&app_dir).unwrap();
        fs::write(app_dir.join("__init__.py"), "").unwrap();
        for (name, content) in files {
            fs::write(app_dir.join(name), content).unwrap();
        }
        SourceScanner::new(root.to_path_buf())
            .scan()
            .applications
            .remove(0)
    }

    #[test]
    fn test_analyze_app_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let app = create_app(
            temp_dir.path(),
            &[
                (
                    "models.py",
                    r#"
from django.db import models

class TimeStamped(models.Model):
    created = models.DateTimeField(auto_now_add=True)

class Product(TimeStamped):
    name = models.CharField(max_length=80)
    price = models.DecimalField(max_digits=8, decimal_places=2)
"#,
                ),
                (
                    "serializers.py",
                    r#"
from rest_framework import serializers
from .models import Product

class BaseSerializer(serializers.ModelSerializer):
    note = serializers.CharField(required=False)

class ProductSerializer(BaseSerializer):
    note = serializers.CharField(read_only=True)

    class Meta:
        model = Product
        fields = ['id', 'name', 'price', 'note']
"#,
                ),
                (
                    "views.py",
                    r#"
from rest_framework import viewsets

class ProductViewSet(viewsets.ReadOnlyModelViewSet):
    queryset = Product.objects.all()
    serializer_class = ProductSerializer
"#,
                ),
                (
                    "urls.py",
                    "router = DefaultRouter()\nrouter.register('products', ProductViewSet)\nurlpatterns = router.urls\n",
                ),
            ],
        );

        let analyzer = ProjectAnalyzer::new(&ExtractionConfig::default());
        let (analysis, warnings) = analyzer.analyze_app(&app);

        assert!(warnings.is_empty(), "{:?}", warnings);
        assert!(analysis.uses_rest_framework);
        assert_eq!(analysis.python_file_count, 5);

        let product = analysis
            .models
            .iter()
            .find(|m| m.class.name == "Product")
            .unwrap();
        let names: Vec<_> = product.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "created", "name", "price"]);

        let serializer = analysis
            .serializers
            .iter()
            .find(|s| s.class.name == "ProductSerializer")
            .unwrap();
        let names: Vec<_> = serializer.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["note", "id", "name", "price"]);
        assert!(serializer.fields[0].read_only);
        assert_eq!(serializer.fields[3].semantic_type, SemanticType::Decimal);

        assert_eq!(analysis.views.len(), 1);
        assert_eq!(analysis.endpoints.len(), 2);
        assert_eq!(analysis.endpoints[1].path, "/products/{pk}/");
    }

    #[test]
    fn test_unreadable_file_becomes_warning() {
        let temp_dir = TempDir::new().unwrap();
        let mut app = create_app(temp_dir.path(), &[("views.py", "")]);
        app.view_files.push(temp_dir.path().join("shop").join("gone_views.py"));

        let analyzer = ProjectAnalyzer::new(&ExtractionConfig::default());
        let (analysis, warnings) = analyzer.analyze_app(&app);

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Extraction warning"));
        assert!(analysis.endpoints.is_empty());
    }
}
