use super::{environment, OutputBatch};
use crate::config::Config;
use crate::naming::title_words;
use crate::synthesizer::{
    InterfaceSynthesizer, TypeImport, TypeKind, TypeModel, TypeModule, COMMON_MODULE,
};
use anyhow::{Context, Result};
use log::{debug, info};
use minijinja::{context, Environment};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const TEMPLATES: &[(&str, &str)] = &[
    ("interface.ts", include_str!("templates/interface.ts")),
    ("enum.ts", include_str!("templates/enum.ts")),
    ("alias.ts", include_str!("templates/alias.ts")),
    ("module.d.ts", include_str!("templates/module.d.ts")),
    ("index.d.ts", include_str!("templates/index.d.ts")),
];

/// Writes the declaration tree: `common.d.ts`, one `<app>.d.ts` per module and `index.d.ts`.
pub struct TypeScriptRenderer {
    root: PathBuf,
    project_name: String,
    version: String,
    dry_run: bool,
    env: Environment<'static>,
}

/// One line of `index.d.ts`: `export *` when `names` is `None`, otherwise the listed names.
#[derive(Serialize)]
struct ModuleExport<'a> {
    module: &'a str,
    names: Option<BTreeSet<&'a str>>,
}

#[derive(Serialize)]
struct TypeView<'a> {
    model: &'a TypeModel,
    parameters: String,
    doc: Vec<String>,
}

impl TypeScriptRenderer {
    pub fn new(config: &Config) -> Result<Self> {
        let env = environment(TEMPLATES).context("Failed to compile TypeScript templates")?;
        Ok(Self {
            root: config.output.typescript_dir.clone(),
            project_name: config.project_name.clone(),
            version: config.version.clone(),
            dry_run: config.dry_run,
            env,
        })
    }

    /// Renders the declaration files of `modules`, appending a render error per failed file,
    /// per duplicate type name inside a file and per name already exported by an earlier
    /// file. Such names are left out of `index.d.ts` so that the index stays unambiguous.
    ///
    /// Returns the files written, in write order.
    pub fn render_types(&self, modules: &[TypeModule], errors: &mut Vec<String>) -> Vec<PathBuf> {
        info!("Rendering TypeScript declarations into {}", self.root.display());
        let mut batch = OutputBatch::new(self.dry_run, errors);
        let mut exported: BTreeMap<String, String> = BTreeMap::new();

        let common_types = InterfaceSynthesizer::common_types();
        let common_path = self.module_path(COMMON_MODULE);
        let common = self.render_module(
            "Common API Types",
            &common_types,
            &[],
            &common_path,
            &mut batch,
        );
        batch.emit(common_path, common);
        for model in &common_types {
            exported.insert(model.name.clone(), COMMON_MODULE.to_string());
        }

        let index_path = self.root.join("index.d.ts");
        let mut exports = Vec::with_capacity(modules.len());
        for module in modules {
            let path = self.module_path(&module.app_name);
            let rendered = self.render_module(
                &format!("{} API Types", title_words(&module.app_name)),
                &module.types,
                &module.imports,
                &path,
                &mut batch,
            );
            batch.emit(path, rendered);

            let mut names = BTreeSet::new();
            let mut shadowed = false;
            for model in &module.types {
                if !names.insert(model.name.as_str()) {
                    continue;
                }
                match exported.get(&model.name) {
                    Some(owner) => {
                        shadowed = true;
                        batch.error(
                            &index_path,
                            format!(
                                "type name '{}' of '{}' is already exported by '{}', not re-exported",
                                model.name, module.app_name, owner
                            ),
                        );
                    }
                    None => {
                        exported.insert(model.name.clone(), module.app_name.clone());
                    }
                }
            }

            let names = shadowed.then(|| {
                module
                    .types
                    .iter()
                    .map(|model| model.name.as_str())
                    .filter(|name| {
                        exported.get(*name).map(String::as_str) == Some(module.app_name.as_str())
                    })
                    .collect::<BTreeSet<_>>()
            });
            exports.push(ModuleExport {
                module: &module.app_name,
                names,
            });
        }

        let index = self.env.get_template("index.d.ts").and_then(|template| {
            template.render(context! {
                project_name => &self.project_name,
                version => &self.version,
                modules => exports,
            })
        });
        batch.emit(index_path, index);

        batch.finish()
    }

    fn module_path(&self, module: &str) -> PathBuf {
        self.root.join(format!("{}.d.ts", module))
    }

    fn render_module(
        &self,
        title: &str,
        types: &[TypeModel],
        imports: &[TypeImport],
        path: &Path,
        batch: &mut OutputBatch<'_>,
    ) -> Result<String, minijinja::Error> {
        let mut seen = BTreeSet::new();
        let mut blocks = Vec::with_capacity(types.len());

        for model in types {
            if !seen.insert(model.name.as_str()) {
                batch.error(
                    path,
                    format!("duplicate type name '{}', later declaration skipped", model.name),
                );
                continue;
            }
            blocks.push(self.render_type(model)?.trim_end().to_string());
        }
        debug!("{} declarations for {}", blocks.len(), path.display());

        self.env.get_template("module.d.ts")?.render(context! {
            title => title,
            project_name => &self.project_name,
            version => &self.version,
            imports => imports,
            declarations => blocks,
        })
    }

    /// The declaration text of one type. The template is chosen by kind alone.
    pub fn render_type(&self, model: &TypeModel) -> Result<String, minijinja::Error> {
        let template = match model.kind {
            TypeKind::Interface => "interface.ts",
            TypeKind::Enum => "enum.ts",
            TypeKind::Alias => "alias.ts",
        };
        let view = TypeView {
            model,
            parameters: if model.type_parameters.is_empty() {
                String::new()
            } else {
                format!("<{}>", model.type_parameters.join(", "))
            },
            doc: doc_comment(model.description.as_deref()),
        };
        self.env.get_template(template)?.render(&view)
    }
}

/// A JSDoc block for a description, one line per source line.
fn doc_comment(description: Option<&str>) -> Vec<String> {
    let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Vec::new();
    };

    let mut lines = vec!["/**".to_string()];
    for line in description.lines() {
        let line = line.trim_end().replace("*/", "*\\/");
        if line.is_empty() {
            lines.push(" *".to_string());
        } else {
            lines.push(format!(" * {}", line));
        }
    }
    lines.push(" */".to_string());
    lines
}
