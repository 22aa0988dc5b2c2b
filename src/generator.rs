//! The top-level pipeline: scan, analyze, enrich, synthesize, render.
//!
//! Every entry point returns a [`GenerationResult`] instead of an error. A run can write
//! some files and still report errors; `success` is false whenever `errors` is non-empty.

use crate::analyzer::{AppAnalysis, ProjectAnalysis, ProjectAnalyzer};
use crate::config::Config;
use crate::enrichment::{CompletionClient, Enricher};
use crate::error::Error;
use crate::renderer::{SphinxRenderer, TypeScriptRenderer};
use crate::scanner::SourceScanner;
use crate::synthesizer::InterfaceSynthesizer;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Outcome of one generation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationResult {
    pub success: bool,
    pub generated_files: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub elapsed_seconds: f64,
    pub statistics: BTreeMap<String, usize>,
    /// The analysis the outputs were rendered from, absent when the run stopped early
    #[serde(skip)]
    pub analysis: Option<ProjectAnalysis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outputs {
    All,
    SphinxOnly,
    TypeScriptOnly,
}

impl Outputs {
    fn sphinx(self) -> bool {
        self != Outputs::TypeScriptOnly
    }

    fn typescript(self) -> bool {
        self != Outputs::SphinxOnly
    }
}

/// Runs the pipeline for one configuration.
pub struct DocsGenerator {
    config: Config,
    client: Option<Box<dyn CompletionClient>>,
}

impl DocsGenerator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Supplies the completion client used when an enrichment provider is configured.
    pub fn with_client(mut self, client: Box<dyn CompletionClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Writes both the Sphinx tree and the TypeScript declarations.
    pub fn generate_all(&self, project_root: &Path) -> GenerationResult {
        self.generate(project_root, Outputs::All)
    }

    pub fn generate_sphinx_docs(&self, project_root: &Path) -> GenerationResult {
        self.generate(project_root, Outputs::SphinxOnly)
    }

    pub fn generate_typescript_types(&self, project_root: &Path) -> GenerationResult {
        self.generate(project_root, Outputs::TypeScriptOnly)
    }

    fn generate(&self, project_root: &Path, outputs: Outputs) -> GenerationResult {
        let start = Instant::now();
        let mut result = GenerationResult::default();

        if let Some(analysis) = self.analyze(project_root, &mut result) {
            self.render(&analysis, outputs, &mut result);
            record_statistics(&analysis, &mut result);
            result.analysis = Some(analysis);
        }

        result.success = result.errors.is_empty();
        result.elapsed_seconds = start.elapsed().as_secs_f64();
        result
            .statistics
            .insert("generated_files".to_string(), result.generated_files.len());

        if result.success {
            info!(
                "Generated {} files in {:.2}s",
                result.generated_files.len(),
                result.elapsed_seconds
            );
        } else {
            warn!(
                "Generation finished with {} error(s), {} files written",
                result.errors.len(),
                result.generated_files.len()
            );
        }
        result
    }

    /// Scans and analyzes the selected applications. `None` means the run cannot continue.
    fn analyze(
        &self,
        project_root: &Path,
        result: &mut GenerationResult,
    ) -> Option<ProjectAnalysis> {
        info!("Scanning {}", project_root.display());
        let scan = SourceScanner::new(project_root.to_path_buf()).scan();
        result.warnings.extend(scan.warnings);
        if !scan.success {
            result
                .errors
                .extend(scan.errors.into_iter().map(|e| Error::Validation(e).to_string()));
            return None;
        }

        let selected: Vec<_> = scan
            .applications
            .iter()
            .filter(|app| {
                let included = self.config.should_include_app(&app.name);
                if !included {
                    debug!("Application '{}' filtered out", app.name);
                }
                included
            })
            .collect();
        if selected.is_empty() {
            result.errors.push(
                Error::Validation(format!(
                    "No applications selected: all of {:?} were filtered out",
                    scan.discovered_apps
                ))
                .to_string(),
            );
            return None;
        }

        let analyzer = ProjectAnalyzer::new(&self.config.extraction);
        let enricher = Enricher::new(&self.config.ai, self.client.as_deref());
        if enricher.is_active() {
            info!("Enriching descriptions with {:?}", self.config.ai.provider);
        }

        let apps = selected
            .into_iter()
            .map(|descriptor| {
                let (mut app, warnings) = analyzer.analyze_app(descriptor);
                result.warnings.extend(warnings);
                self.filter_endpoints(&mut app);
                enricher.enrich_app(&mut app);
                app
            })
            .collect();

        Some(ProjectAnalysis {
            project_name: self.config.project_name.clone(),
            version: self.config.version.clone(),
            apps,
        })
    }

    fn filter_endpoints(&self, app: &mut AppAnalysis) {
        let before = app.endpoints.len();
        app.endpoints
            .retain(|endpoint| self.config.should_include_endpoint(&endpoint.path));
        if app.endpoints.len() < before {
            debug!(
                "Excluded {} endpoint(s) of '{}'",
                before - app.endpoints.len(),
                app.name
            );
        }
    }

    fn render(
        &self,
        analysis: &ProjectAnalysis,
        outputs: Outputs,
        result: &mut GenerationResult,
    ) {
        if outputs.sphinx() {
            match SphinxRenderer::new(&self.config) {
                Ok(renderer) => {
                    let written = renderer.render_docs(&analysis.apps, &mut result.errors);
                    result.generated_files.extend(written);
                }
                Err(e) => result.errors.push(format!("{:#}", e)),
            }
        }

        if outputs.typescript() {
            let synthesizer = InterfaceSynthesizer::for_apps(&analysis.apps);
            let modules: Vec<_> = analysis
                .apps
                .iter()
                .map(|app| synthesizer.synthesize_module(app))
                .collect();
            result.statistics.insert(
                "type_declarations".to_string(),
                modules.iter().map(|m| m.types.len()).sum(),
            );

            match TypeScriptRenderer::new(&self.config) {
                Ok(renderer) => {
                    let written = renderer.render_types(&modules, &mut result.errors);
                    result.generated_files.extend(written);
                }
                Err(e) => result.errors.push(format!("{:#}", e)),
            }
        }
    }
}

fn record_statistics(analysis: &ProjectAnalysis, result: &mut GenerationResult) {
    let apps = &analysis.apps;
    let sum = |count: &dyn Fn(&AppAnalysis) -> usize| apps.iter().map(count).sum::<usize>();

    let statistics = [
        ("applications", apps.len()),
        ("python_files", sum(&|app| app.python_file_count)),
        ("models", sum(&|app| app.models.len())),
        ("serializers", sum(&|app| app.serializers.len())),
        ("views", sum(&|app| app.views.len())),
        ("endpoints", sum(&|app| app.endpoints.len())),
    ];
    for (key, value) in statistics {
        result.statistics.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiProvider;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_project(root: &Path) {
        let users = root.join("users");
        fs::create_dir_all(&users).unwrap();
        fs::write(users.join("__init__.py"), "").unwrap();
        fs::write(
            users.join("serializers.py"),
            r#"
from rest_framework import serializers

class UserSerializer(serializers.Serializer):
    id = serializers.IntegerField(read_only=True)
    email = serializers.EmailField()
"#,
        )
        .unwrap();
        fs::write(
            users.join("views.py"),
            r#"
from rest_framework import viewsets

class UserViewSet(viewsets.ModelViewSet):
    serializer_class = UserSerializer
"#,
        )
        .unwrap();
        fs::write(
            users.join("urls.py"),
            r#"
router = DefaultRouter()
router.register('users', UserViewSet)
router.register('admin/users', UserViewSet)

urlpatterns = [path('', include(router.urls))]
"#,
        )
        .unwrap();

        let legacy = root.join("legacy");
        fs::create_dir_all(&legacy).unwrap();
        fs::write(legacy.join("__init__.py"), "").unwrap();
    }

    fn config(out: &Path) -> Config {
        let mut config = Config::default();
        config.set_output_root(out);
        config
    }

    #[test]
    fn test_missing_project_is_validation_error() {
        let temp_dir = TempDir::new().unwrap();
        let generator = DocsGenerator::new(config(temp_dir.path()));

        let result = generator.generate_all(&temp_dir.path().join("missing"));

        assert!(!result.success);
        assert!(result.generated_files.is_empty());
        assert!(result.errors[0].starts_with("Validation error: Project path does not exist"));
        assert!(result.analysis.is_none());
    }

    #[test]
    fn test_everything_filtered_out_is_validation_error() {
        let temp_dir = TempDir::new().unwrap();
        create_project(&temp_dir.path().join("project"));
        let mut config = config(&temp_dir.path().join("out"));
        config.include_apps = Some(vec!["billing".to_string()]);

        let result = DocsGenerator::new(config).generate_all(&temp_dir.path().join("project"));

        assert!(!result.success);
        assert!(result.errors[0].contains("No applications selected"));
    }

    #[test]
    fn test_generate_all_filters_apps_and_endpoints() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        let out = temp_dir.path().join("out");
        create_project(&project);
        let mut config = config(&out);
        config.exclude_apps = vec!["legacy".to_string()];

        let result = DocsGenerator::new(config).generate_all(&project);

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.generated_files.len(), 6);
        assert_eq!(result.statistics["applications"], 1);
        assert_eq!(result.statistics["serializers"], 1);
        assert_eq!(result.statistics["generated_files"], 6);

        let analysis = result.analysis.unwrap();
        let paths: Vec<_> = analysis.apps[0]
            .endpoints
            .iter()
            .map(|e| e.path.as_str())
            .collect();
        assert!(paths.iter().all(|p| !p.contains("/admin/")));
        assert_eq!(paths.len(), 6);

        assert!(out.join("docs/api/apps/users.rst").is_file());
        assert!(!out.join("docs/api/apps/legacy.rst").exists());
        let types = fs::read_to_string(out.join("types/users.d.ts")).unwrap();
        assert!(types.contains("export interface User {"));
        assert!(types.contains("export type UserViewSetListResponse = PaginatedResponse<User>;"));
    }

    #[test]
    fn test_single_output_modes() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        create_project(&project);

        let sphinx = DocsGenerator::new(config(&temp_dir.path().join("a")))
            .generate_sphinx_docs(&project);
        assert!(sphinx.success);
        assert!(sphinx
            .generated_files
            .iter()
            .all(|p| !p.to_string_lossy().ends_with(".d.ts")));
        assert!(!temp_dir.path().join("a/types").exists());

        let typescript = DocsGenerator::new(config(&temp_dir.path().join("b")))
            .generate_typescript_types(&project);
        assert!(typescript.success);
        assert!(typescript
            .generated_files
            .iter()
            .all(|p| p.to_string_lossy().ends_with(".d.ts")));
        assert!(typescript.statistics["type_declarations"] > 0);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        create_project(&project);
        let mut config = config(&temp_dir.path().join("out"));
        config.dry_run = true;

        let result = DocsGenerator::new(config).generate_all(&project);

        assert!(result.success);
        assert!(result.generated_files.is_empty());
        assert!(!temp_dir.path().join("out").exists());
        assert_eq!(result.statistics["endpoints"], 6);
    }

    struct EchoClient;

    impl CompletionClient for EchoClient {
        fn complete(&self, _prompt: &str, _timeout: Duration) -> anyhow::Result<String> {
            Ok("Enriched text".to_string())
        }
    }

    #[test]
    fn test_enrichment_runs_with_configured_provider() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        create_project(&project);
        let mut config = config(&temp_dir.path().join("out"));
        config.dry_run = true;
        config.ai.provider = AiProvider::Openai;

        let result = DocsGenerator::new(config)
            .with_client(Box::new(EchoClient))
            .generate_all(&project);

        let analysis = result.analysis.unwrap();
        let users = analysis.apps.iter().find(|a| a.name == "users").unwrap();
        assert!(users
            .endpoints
            .iter()
            .all(|e| e.description == "Enriched text"));
    }
}
