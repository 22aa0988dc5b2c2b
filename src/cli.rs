use crate::config::{AiProvider, Config};
use crate::generator::{DocsGenerator, GenerationResult};
use crate::serializer::{serialize_json, serialize_yaml, write_to_file};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;

/// Generate Sphinx documentation and TypeScript declarations from a Django REST Framework project
#[derive(Parser, Debug)]
#[command(name = "drf-docs-from-source")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Django project directory
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    /// Output directory; documentation goes to <DIR>/docs/api and types to <DIR>/types
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only process these applications (comma separated)
    #[arg(short = 'a', long = "apps", value_delimiter = ',')]
    pub apps: Vec<String>,

    /// Skip these applications (comma separated)
    #[arg(long = "exclude-apps", value_delimiter = ',')]
    pub exclude_apps: Vec<String>,

    /// Analyze and render without writing any file
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Only generate the Sphinx documentation
    #[arg(long = "sphinx-only", conflicts_with = "typescript_only")]
    pub sphinx_only: bool,

    /// Only generate the TypeScript declarations
    #[arg(long = "typescript-only")]
    pub typescript_only: bool,

    /// Provider used to enrich descriptions
    #[arg(long = "ai-provider", value_enum)]
    pub ai_provider: Option<AiProvider>,

    /// Write the extracted analysis to this file
    #[arg(long = "report", value_name = "FILE")]
    pub report_path: Option<PathBuf>,

    /// Format of the analysis report
    #[arg(long = "report-format", value_enum, default_value = "yaml")]
    pub report_format: ReportFormat,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Analysis report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if let Some(config_path) = &args.config_path {
        if !config_path.is_file() {
            anyhow::bail!("Configuration file does not exist: {}", config_path.display());
        }
        info!("Configuration file: {}", config_path.display());
    }

    info!("Project path: {}", args.project_path.display());
    if let Some(output_dir) = &args.output_dir {
        info!("Output directory: {}", output_dir.display());
    }
    if !args.apps.is_empty() {
        info!("Applications: {}", args.apps.join(", "));
    }
    if args.dry_run {
        info!("Dry run: no files will be written");
    }

    Ok(args)
}

/// Builds the run configuration: the configuration file (or defaults) overridden by flags.
pub fn build_config(args: &CliArgs) -> Result<Config> {
    let mut config = match &args.config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(output_dir) = &args.output_dir {
        config.set_output_root(output_dir);
    }
    if !args.apps.is_empty() {
        config.include_apps = Some(args.apps.clone());
    }
    if !args.exclude_apps.is_empty() {
        config.exclude_apps.extend(args.exclude_apps.iter().cloned());
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(provider) = args.ai_provider {
        config.ai.provider = provider;
    }

    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Run the main workflow
///
/// The returned result carries every error of the run; only configuration and report
/// failures are returned as `Err`.
pub fn run(args: CliArgs) -> Result<GenerationResult> {
    let config = build_config(&args)?;
    if config.ai.provider != AiProvider::Local {
        warn!(
            "No completion client is available for {:?}, descriptions stay heuristic",
            config.ai.provider
        );
    }

    let generator = DocsGenerator::new(config);
    let result = if args.sphinx_only {
        generator.generate_sphinx_docs(&args.project_path)
    } else if args.typescript_only {
        generator.generate_typescript_types(&args.project_path)
    } else {
        generator.generate_all(&args.project_path)
    };

    for warning in &result.warnings {
        warn!("{}", warning);
    }
    for error in &result.errors {
        log::error!("{}", error);
    }

    if let (Some(report_path), Some(analysis)) = (&args.report_path, &result.analysis) {
        let content = match args.report_format {
            ReportFormat::Yaml => serialize_yaml(analysis)?,
            ReportFormat::Json => serialize_json(analysis)?,
        };
        write_to_file(&content, report_path)
            .with_context(|| format!("Failed to write report: {}", report_path.display()))?;
        info!("Wrote analysis report to {}", report_path.display());
    }

    info!("Summary:");
    for (key, value) in &result.statistics {
        info!("  - {}: {}", key, value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::try_parse_from([
            "drf-docs-from-source",
            "./project",
            "-o",
            "out",
            "-a",
            "users,orders",
            "--exclude-apps",
            "legacy",
            "--dry-run",
            "--ai-provider",
            "anthropic",
            "--report",
            "report.json",
            "--report-format",
            "json",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.project_path, PathBuf::from("./project"));
        assert_eq!(args.apps, vec!["users", "orders"]);
        assert_eq!(args.exclude_apps, vec!["legacy"]);
        assert!(args.dry_run);
        assert_eq!(args.ai_provider, Some(AiProvider::Anthropic));
        assert_eq!(args.report_format, ReportFormat::Json);
        assert!(args.verbose);
    }

    #[test]
    fn test_output_modes_conflict() {
        let result = CliArgs::try_parse_from([
            "drf-docs-from-source",
            "./project",
            "--sphinx-only",
            "--typescript-only",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result =
            CliArgs::try_parse_from(["drf-docs-from-source", "./project", "--ai-provider", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file_rejected() {
        let args =
            CliArgs::try_parse_from(["drf-docs-from-source", "./project", "-c", "missing.toml"])
                .unwrap();
        assert!(parse_args_from_parsed(args).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("docs.toml");
        fs::write(
            &config_path,
            "project_name = \"Shop\"\nexclude_apps = [\"legacy\"]\n\n[ai]\nprovider = \"openai\"\n",
        )
        .unwrap();
        let args = CliArgs::try_parse_from([
            "drf-docs-from-source",
            "./project",
            "-c",
            config_path.to_str().unwrap(),
            "-o",
            "out",
            "--exclude-apps",
            "tmp",
            "--ai-provider",
            "local",
        ])
        .unwrap();

        let config = build_config(&args).unwrap();

        assert_eq!(config.project_name, "Shop");
        assert_eq!(config.exclude_apps, vec!["legacy", "tmp"]);
        assert_eq!(config.ai.provider, AiProvider::Local);
        assert_eq!(config.output.sphinx_dir, PathBuf::from("out/docs/api"));
        assert_eq!(config.output.typescript_dir, PathBuf::from("out/types"));
        assert!(config.include_apps.is_none());
    }

    #[test]
    fn test_run_writes_report() {
        let temp_dir = TempDir::new().unwrap();
        let app = temp_dir.path().join("project").join("blog");
        fs::create_dir_all(&app).unwrap();
        fs::write(app.join("__init__.py"), "").unwrap();
        fs::write(
            app.join("serializers.py"),
            "from rest_framework import serializers\n\nclass PostSerializer(serializers.Serializer):\n    title = serializers.CharField(max_length=200)\n",
        )
        .unwrap();
        let report = temp_dir.path().join("report.json");
        let args = CliArgs::try_parse_from([
            "drf-docs-from-source",
            temp_dir.path().join("project").to_str().unwrap(),
            "--dry-run",
            "--report",
            report.to_str().unwrap(),
            "--report-format",
            "json",
        ])
        .unwrap();

        let result = run(args).unwrap();

        assert!(result.success, "{:?}", result.errors);
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(parsed["apps"][0]["name"], "blog");
        assert_eq!(
            parsed["apps"][0]["serializers"][0]["fields"][0]["name"],
            "title"
        );
    }

    #[test]
    fn test_run_reports_missing_project() {
        let temp_dir = TempDir::new().unwrap();
        let args = CliArgs::try_parse_from([
            "drf-docs-from-source",
            temp_dir.path().join("missing").to_str().unwrap(),
        ])
        .unwrap();

        let result = run(args).unwrap();

        assert!(!result.success);
        assert!(result.errors[0].starts_with("Validation error"));
    }
}
