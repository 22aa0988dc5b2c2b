use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// File that marks a directory as a Python package and therefore as an application module.
pub const PACKAGE_MARKER: &str = "__init__.py";

/// Scanner for discovering application modules in a Django project.
///
/// The `SourceScanner` looks at the immediate children of a project root. A child directory
/// is an application module when it contains a package marker (`__init__.py`). Every Python
/// file below an application is recorded, and files following the `models`, `serializers`,
/// `views` and `urls` naming conventions are classified by role.
///
/// # Example
///
/// ```no_run
/// use drf_docs_from_source::scanner::SourceScanner;
/// use std::path::PathBuf;
///
/// let scanner = SourceScanner::new(PathBuf::from("./my-django-project"));
/// let result = scanner.scan();
/// println!("Found {} applications", result.discovered_apps.len());
/// ```
pub struct SourceScanner {
    root_path: PathBuf,
}

/// Result of a project scan.
///
/// A failed scan has `success == false`, at least one error and no discovered applications.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub success: bool,
    /// Names of every application module directory
    pub discovered_apps: BTreeSet<String>,
    /// One descriptor per application, in lexicographic order
    pub applications: Vec<ApplicationDescriptor>,
    /// Fatal validation problems
    pub errors: Vec<String>,
    /// Entries that could not be read below an application
    pub warnings: Vec<String>,
}

/// Structural description of one application module.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDescriptor {
    pub name: String,
    pub root_path: PathBuf,
    /// Every `.py` file below the application, sorted
    pub python_files: Vec<PathBuf>,
    pub model_files: Vec<PathBuf>,
    pub serializer_files: Vec<PathBuf>,
    pub view_files: Vec<PathBuf>,
    pub url_files: Vec<PathBuf>,
}

/// Role of a source file, derived from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Models,
    Serializers,
    Views,
    Urls,
}

const ROLE_STEMS: [(FileRole, &[&str]); 4] = [
    (FileRole::Models, &["models"]),
    (FileRole::Serializers, &["serializers", "serializer"]),
    (FileRole::Views, &["views", "view", "viewsets", "viewset"]),
    (FileRole::Urls, &["urls"]),
];

impl FileRole {
    /// Classifies a Python file by its stem.
    ///
    /// A stem matches a role when it equals one of the role names or ends with `_<name>`
    /// (`auth_views.py` is a views file). Files of a package named after a role take that
    /// role. Test modules never get a role.
    pub fn classify(path: &Path) -> Option<FileRole> {
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.starts_with("test") {
            return None;
        }

        let by_stem = ROLE_STEMS.iter().find_map(|(role, names)| {
            names
                .iter()
                .any(|name| stem == *name || stem.ends_with(&format!("_{}", name)))
                .then_some(*role)
        });

        // Split packages: models/order.py is a models file
        by_stem.or_else(|| {
            let parent = path.parent()?.file_name()?.to_str()?;
            ROLE_STEMS
                .iter()
                .find_map(|(role, names)| names.contains(&parent).then_some(*role))
        })
    }
}

impl ApplicationDescriptor {
    fn new(name: String, root_path: PathBuf, python_files: Vec<PathBuf>) -> Self {
        let mut app = Self {
            name,
            root_path,
            python_files: Vec::new(),
            model_files: Vec::new(),
            serializer_files: Vec::new(),
            view_files: Vec::new(),
            url_files: Vec::new(),
        };

        for file in python_files {
            match FileRole::classify(&file) {
                Some(FileRole::Models) => app.model_files.push(file.clone()),
                Some(FileRole::Serializers) => app.serializer_files.push(file.clone()),
                Some(FileRole::Views) => app.view_files.push(file.clone()),
                Some(FileRole::Urls) => app.url_files.push(file.clone()),
                None => {}
            }
            app.python_files.push(file);
        }

        app
    }
}

impl SourceScanner {
    /// Creates a new `SourceScanner` for the specified project root.
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Scans the project root for application modules.
    ///
    /// This never fails with an error value: an invalid root produces a `ScanResult` with
    /// `success == false` and a populated `errors` list. Immediate children without a package
    /// marker are skipped silently, as are hidden directories and `__pycache__`.
    pub fn scan(&self) -> ScanResult {
        let mut result = ScanResult::default();

        if let Err(message) = self.validate_root() {
            warn!("{}", message);
            result.errors.push(message);
            return result;
        }

        for entry in WalkDir::new(&self.root_path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_dir() || is_ignored(&entry) {
                        continue;
                    }
                    if !entry.path().join(PACKAGE_MARKER).is_file() {
                        debug!("Skipping non-package directory: {}", entry.path().display());
                        continue;
                    }

                    let name = entry.file_name().to_string_lossy().to_string();
                    let python_files = collect_python_files(entry.path(), &mut result.warnings);
                    debug!("Application '{}' has {} Python files", name, python_files.len());

                    result.discovered_apps.insert(name.clone());
                    result.applications.push(ApplicationDescriptor::new(
                        name,
                        entry.path().to_path_buf(),
                        python_files,
                    ));
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    result.warnings.push(warning);
                }
            }
        }

        if result.applications.is_empty() {
            let message = format!(
                "No application modules found in {}: no subdirectory contains {}",
                self.root_path.display(),
                PACKAGE_MARKER
            );
            warn!("{}", message);
            result.errors.push(message);
            return result;
        }

        info!(
            "Discovered {} application(s) in {}",
            result.applications.len(),
            self.root_path.display()
        );
        result.success = true;
        result
    }

    fn validate_root(&self) -> Result<(), String> {
        if !self.root_path.exists() {
            return Err(format!(
                "Project path does not exist: {}",
                self.root_path.display()
            ));
        }
        if !self.root_path.is_dir() {
            return Err(format!(
                "Project path is not a directory: {}",
                self.root_path.display()
            ));
        }
        fs::read_dir(&self.root_path).map_err(|e| {
            format!(
                "Project path is not readable: {}: {}",
                self.root_path.display(),
                e
            )
        })?;
        Ok(())
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "__pycache__"
}

/// Collects every `.py` file below an application, sorted by path.
fn collect_python_files(app_root: &Path, warnings: &mut Vec<String>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(app_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e))
    {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if entry.file_type().is_file()
                    && path.extension().and_then(|s| s.to_str()) == Some("py")
                {
                    files.push(path.to_path_buf());
                }
            }
            Err(e) => {
                let warning = format!("Failed to access path: {}", e);
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }

    files
}
