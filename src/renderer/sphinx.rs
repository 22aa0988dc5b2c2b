use super::{environment, OutputBatch};
use crate::analyzer::{AnalyzedClass, AppAnalysis};
use crate::config::Config;
use crate::extractor::{EndpointDescriptor, FieldDescriptor};
use crate::naming::title_words;
use anyhow::{Context, Result};
use log::info;
use minijinja::{context, Environment};
use serde::Serialize;
use std::path::{Path, PathBuf};

const TEMPLATES: &[(&str, &str)] = &[
    ("index.rst", include_str!("templates/index.rst")),
    ("app.rst", include_str!("templates/app.rst")),
    ("fields.rst", include_str!("templates/fields.rst")),
    ("conf.py", include_str!("templates/conf.py")),
];

/// Writes the reStructuredText tree: `index.rst`, `conf.py` and `apps/<app>.rst`.
pub struct SphinxRenderer {
    root: PathBuf,
    project_name: String,
    version: String,
    description: String,
    author: String,
    dry_run: bool,
    env: Environment<'static>,
}

#[derive(Serialize)]
struct AppSummary<'a> {
    name: &'a str,
    endpoint_count: usize,
    serializer_count: usize,
    model_count: usize,
}

#[derive(Serialize)]
struct EndpointView<'a> {
    signature: String,
    description: &'a str,
    handler: String,
    serializer: Option<&'a str>,
    permissions: String,
}

#[derive(Serialize)]
struct ClassView<'a> {
    name: &'a str,
    docstring: Option<&'a str>,
    source: String,
    line: usize,
    fields: Vec<FieldView<'a>>,
}

#[derive(Serialize)]
struct FieldView<'a> {
    name: &'a str,
    kind: String,
    required: bool,
    notes: String,
}

impl SphinxRenderer {
    pub fn new(config: &Config) -> Result<Self> {
        let env = environment(TEMPLATES).context("Failed to compile Sphinx templates")?;
        Ok(Self {
            root: config.output.sphinx_dir.clone(),
            project_name: config.project_name.clone(),
            version: config.version.clone(),
            description: config.description.clone(),
            author: config.author.clone(),
            dry_run: config.dry_run,
            env,
        })
    }

    /// Renders the documentation of `apps`, appending a render error per failed file.
    ///
    /// Returns the files written, in write order.
    pub fn render_docs(&self, apps: &[AppAnalysis], errors: &mut Vec<String>) -> Vec<PathBuf> {
        info!("Rendering Sphinx documentation into {}", self.root.display());
        let mut batch = OutputBatch::new(self.dry_run, errors);

        batch.emit(self.root.join("index.rst"), self.render_index(apps));
        for app in apps {
            batch.emit(
                self.root.join("apps").join(format!("{}.rst", app.name)),
                self.render_app(app),
            );
        }
        batch.emit(self.root.join("conf.py"), self.render_conf());

        batch.finish()
    }

    fn render_index(&self, apps: &[AppAnalysis]) -> Result<String, minijinja::Error> {
        let apps: Vec<AppSummary> = apps
            .iter()
            .map(|app| AppSummary {
                name: &app.name,
                endpoint_count: app.endpoints.len(),
                serializer_count: app.serializers.len(),
                model_count: app.models.len(),
            })
            .collect();

        self.env.get_template("index.rst")?.render(context! {
            project_name => &self.project_name,
            description => &self.description,
            version => &self.version,
            author => &self.author,
            apps => apps,
        })
    }

    fn render_app(&self, app: &AppAnalysis) -> Result<String, minijinja::Error> {
        let package_root = app.root_path.parent().unwrap_or(Path::new(""));
        let endpoints: Vec<EndpointView> = app.endpoints.iter().map(endpoint_view).collect();

        self.env.get_template("app.rst")?.render(context! {
            title => format!("{} API", title_words(&app.name)),
            name => &app.name,
            python_file_count => app.python_file_count,
            endpoints => endpoints,
            serializers => class_views(&app.serializers, package_root),
            models => class_views(&app.models, package_root),
        })
    }

    fn render_conf(&self) -> Result<String, minijinja::Error> {
        self.env.get_template("conf.py")?.render(context! {
            project_name => &self.project_name,
            author => &self.author,
            version => &self.version,
        })
    }
}

fn endpoint_view(endpoint: &EndpointDescriptor) -> EndpointView<'_> {
    EndpointView {
        signature: format!("{} {}", endpoint.http_method, endpoint.path),
        description: &endpoint.description,
        handler: format!("{}.{}", endpoint.handler_class, endpoint.handler_function),
        serializer: endpoint.serializer_class.as_deref(),
        permissions: endpoint
            .permission_classes
            .iter()
            .map(|p| format!("``{}``", p))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn class_views<'a>(classes: &'a [AnalyzedClass], package_root: &Path) -> Vec<ClassView<'a>> {
    classes
        .iter()
        .map(|analyzed| class_view(analyzed, package_root))
        .collect()
}

/// Source paths are shown relative to the directory holding the application package.
fn class_view<'a>(analyzed: &'a AnalyzedClass, package_root: &Path) -> ClassView<'a> {
    let class = &analyzed.class;
    let source = class
        .source_file
        .strip_prefix(package_root)
        .unwrap_or(&class.source_file);

    ClassView {
        name: &class.name,
        docstring: class.docstring.as_deref(),
        source: source.to_string_lossy().replace('\\', "/"),
        line: class.line,
        fields: analyzed.fields.iter().map(field_view).collect(),
    }
}

fn field_view(field: &FieldDescriptor) -> FieldView<'_> {
    let mut notes = Vec::new();
    if let Some(help) = &field.help_text {
        notes.push(sentence(help));
    }
    if field.read_only {
        notes.push("Read-only.".to_string());
    }
    if field.write_only {
        notes.push("Write-only.".to_string());
    }
    if field.nullable {
        notes.push("Nullable.".to_string());
    }
    if let Some(max_length) = field.max_length {
        notes.push(format!("Max length {}.", max_length));
    }
    if let Some(default) = &field.default {
        notes.push(format!("Default ``{}``.", default));
    }
    if !field.choices.is_empty() {
        let choices: Vec<String> = field
            .choices
            .iter()
            .map(|option| format!("``{}``", option.value))
            .collect();
        notes.push(format!("Choices: {}.", choices.join(", ")));
    }

    FieldView {
        name: &field.name,
        kind: field.semantic_type.to_string(),
        required: field.required && !field.read_only,
        notes: notes.join(" "),
    }
}

/// Help text as a single-line sentence, so it fits one table cell.
fn sentence(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.ends_with(&['.', '!', '?'][..]) {
        text
    } else {
        format!("{}.", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ClassDescriptor, HttpMethod, SemanticType};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn config(root: &Path) -> Config {
        let mut config = Config {
            project_name: "Shop API".to_string(),
            author: "Backend Team".to_string(),
            ..Config::default()
        };
        config.output.sphinx_dir = root.to_path_buf();
        config
    }

    fn app(root: &Path) -> AppAnalysis {
        let mut status = FieldDescriptor::new("status", SemanticType::Choice);
        status.help_text = Some("Current state".to_string());
        status.choices = vec![crate::extractor::ChoiceOption {
            value: crate::extractor::ChoiceValue::Str("open".to_string()),
            label: "Open".to_string(),
        }];
        let mut id = FieldDescriptor::new("id", SemanticType::Integer);
        id.read_only = true;

        AppAnalysis {
            name: "order_items".to_string(),
            root_path: root.join("order_items"),
            python_file_count: 4,
            uses_rest_framework: true,
            models: Vec::new(),
            serializers: vec![AnalyzedClass {
                class: ClassDescriptor {
                    name: "OrderSerializer".to_string(),
                    source_file: root.join("order_items").join("serializers.py"),
                    line: 7,
                    base_types: vec!["serializers.Serializer".to_string()],
                    docstring: Some("An order.".to_string()),
                    block: Default::default(),
                    module_constants: Default::default(),
                },
                fields: vec![id, status],
            }],
            views: Vec::new(),
            endpoints: vec![EndpointDescriptor {
                path: "/orders/{pk}/".to_string(),
                http_method: HttpMethod::Get,
                handler_class: "OrderViewSet".to_string(),
                handler_function: "retrieve".to_string(),
                description: "Retrieve a single order".to_string(),
                serializer_class: Some("OrderSerializer".to_string()),
                permission_classes: vec!["IsAuthenticated".to_string()],
            }],
        }
    }

    #[test]
    fn test_render_docs_writes_tree() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("docs");
        let renderer = SphinxRenderer::new(&config(&out)).unwrap();
        let mut errors = Vec::new();

        let written = renderer.render_docs(&[app(temp_dir.path())], &mut errors);

        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(
            written,
            vec![
                out.join("index.rst"),
                out.join("apps").join("order_items.rst"),
                out.join("conf.py"),
            ]
        );

        let index = fs::read_to_string(out.join("index.rst")).unwrap();
        assert!(index.starts_with("Shop API\n========\n"));
        assert!(index.contains("   apps/order_items\n"));

        let page = fs::read_to_string(out.join("apps").join("order_items.rst")).unwrap();
        assert!(page.starts_with("Order Items API\n===============\n"));
        assert!(page.contains("GET /orders/{pk}/\n~~~~~~~~~~~~~~~~~\n"));
        assert!(page.contains(":Handler: ``OrderViewSet.retrieve``\n"));
        assert!(page.contains(":Permissions: ``IsAuthenticated``\n"));
        assert!(page.contains("Defined in ``order_items/serializers.py``, line 7."));
        assert!(page.contains("   * - ``id``\n     - ``integer``\n     - no\n     - Read-only.\n"));
        assert!(page.contains("     - Current state. Choices: ``open``.\n"));

        let conf = fs::read_to_string(out.join("conf.py")).unwrap();
        assert!(conf.contains("project = 'Shop API'\n"));
        assert!(conf.contains("author = 'Backend Team'\n"));
    }

    #[test]
    fn test_field_without_notes_has_empty_cell() {
        let field = FieldDescriptor::new("name", SemanticType::String);
        let view = field_view(&field);
        assert_eq!(view.notes, "");
        assert!(view.required);
    }

    #[test]
    fn test_multiline_help_text_stays_in_its_cell() {
        let mut field = FieldDescriptor::new("bio", SemanticType::String);
        field.help_text = Some("Shown on the profile.\n    Plain text only".to_string());

        assert_eq!(
            field_view(&field).notes,
            "Shown on the profile. Plain text only."
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let renderer = SphinxRenderer::new(&config(temp_dir.path())).unwrap();
        let apps = [app(temp_dir.path())];

        assert_eq!(
            renderer.render_app(&apps[0]).unwrap(),
            renderer.render_app(&apps[0]).unwrap()
        );
        assert_eq!(
            renderer.render_index(&apps).unwrap(),
            renderer.render_index(&apps).unwrap()
        );
    }
}
