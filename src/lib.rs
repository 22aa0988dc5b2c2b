//! Documentation and type generation for Django REST Framework projects.
//!
//! The library reads a project's Python sources without executing them, extracts serializers,
//! models, views and URL routes, and renders two trees: Sphinx reStructuredText pages and
//! TypeScript declaration files.
//!
//! # Architecture
//!
//! 1. [`scanner`] - Discovers application packages and classifies their files
//! 2. [`parser`] - Splits Python source into logical lines, blocks and literal values
//! 3. [`detector`] - Detects which Django REST libraries an application imports
//! 4. [`extractor`] - Extracts classes, fields, views and endpoints
//! 5. [`analyzer`] - Runs extraction per application and resolves inherited fields
//! 6. [`enrichment`] - Optionally rewrites descriptions through a completion client
//! 7. [`synthesizer`] - Builds TypeScript type models from the analysis
//! 8. [`renderer`] - Renders and writes the Sphinx and TypeScript trees
//! 9. [`generator`] - Drives the whole pipeline and reports a [`generator::GenerationResult`]
//!
//! # Example Usage
//!
//! ```no_run
//! use drf_docs_from_source::{config::Config, generator::DocsGenerator};
//! use std::path::Path;
//!
//! let mut config = Config::default();
//! config.set_output_root(Path::new("build"));
//!
//! let result = DocsGenerator::new(config).generate_all(Path::new("./myproject"));
//! for error in &result.errors {
//!     eprintln!("{}", error);
//! }
//! println!("{} files written", result.generated_files.len());
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module.

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod detector;
pub mod enrichment;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod naming;
pub mod parser;
pub mod renderer;
pub mod scanner;
pub mod serializer;
pub mod synthesizer;
