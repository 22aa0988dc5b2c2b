//! Structure extraction for Django REST Framework code.
//!
//! The extractor turns parsed Python files into the records the rest of the pipeline works
//! with: class descriptors, field descriptors for serializers and models, view descriptors
//! and endpoint descriptors.
//!
//! - [`classes`]: class discovery and base-type classification
//! - [`fields`]: serializer and model field extraction
//! - [`views`]: view classes, function views and their endpoints
//! - [`urls`]: URL patterns and router registrations, see [`RouteExtractor`]
//!
//! # Example
//!
//! ```no_run
//! use drf_docs_from_source::config::ExtractionConfig;
//! use drf_docs_from_source::extractor::StructureExtractor;
//! use drf_docs_from_source::parser::SourceParser;
//! use std::path::Path;
//!
//! let parsed = SourceParser::parse_file(Path::new("users/serializers.py")).unwrap();
//! let extractor = StructureExtractor::new(&ExtractionConfig::default());
//! for class in extractor.extract_classes(&[parsed]) {
//!     if extractor.is_serializer_like(&class) {
//!         println!("{}: {} fields", class.name, extractor.extract_fields(&class).len());
//!     }
//! }
//! ```

pub mod classes;
pub mod fields;
pub mod urls;
pub mod views;

use crate::config::ExtractionConfig;
use crate::parser::expr::PyValue;
use crate::parser::{ClassBlock, ParsedFile};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

pub use classes::ClassRole;
pub use urls::{Route, RouteExtractor, RouteTarget, RouterExtractor, UrlPatternExtractor};

/// Field lists of the model classes of one application, keyed by class name.
pub type ModelIndex = BTreeMap<String, Vec<FieldDescriptor>>;

/// Extracts classes, fields, views and endpoints from parsed files.
///
/// Base-type tables are fixed name lists extended by [`ExtractionConfig`]. Classes whose
/// bases are other classes of the same application are recognized once
/// [`register_local_classes`](StructureExtractor::register_local_classes) has seen them.
#[derive(Debug, Clone)]
pub struct StructureExtractor {
    serializer_bases: BTreeSet<String>,
    view_bases: BTreeSet<String>,
    model_bases: BTreeSet<String>,
    /// Local class name to its role and the framework base it ultimately derives from
    local_roots: BTreeMap<String, (ClassRole, String)>,
}

/// Items extracted from source together with the non-fatal problems met on the way.
#[derive(Debug, Clone)]
pub struct Extracted<T> {
    pub items: Vec<T>,
    pub warnings: Vec<String>,
}

impl<T> Default for Extracted<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// A class found in source.
#[derive(Debug, Clone, Serialize)]
pub struct ClassDescriptor {
    pub name: String,
    pub source_file: PathBuf,
    pub line: usize,
    /// Base expressions as written
    pub base_types: Vec<String>,
    pub docstring: Option<String>,
    #[serde(skip)]
    pub block: ClassBlock,
    /// Module-level assignments of the defining file
    #[serde(skip)]
    pub module_constants: BTreeMap<String, PyValue>,
}

/// Semantic category of a field, independent of any output language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum SemanticType {
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    Email,
    Url,
    Uuid,
    Slug,
    Date,
    Datetime,
    Time,
    Duration,
    Choice,
    File,
    Image,
    Json,
    Object,
    PrimaryKey,
    Hyperlink,
    Method,
    /// A nested serializer, by class name
    Nested(String),
    ListOf(Box<SemanticType>),
    Unknown,
}

impl SemanticType {
    pub fn list_of(inner: SemanticType) -> Self {
        SemanticType::ListOf(Box::new(inner))
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            SemanticType::String => "string",
            SemanticType::Integer => "integer",
            SemanticType::Float => "float",
            SemanticType::Decimal => "decimal",
            SemanticType::Boolean => "boolean",
            SemanticType::Email => "email",
            SemanticType::Url => "url",
            SemanticType::Uuid => "uuid",
            SemanticType::Slug => "slug",
            SemanticType::Date => "date",
            SemanticType::Datetime => "datetime",
            SemanticType::Time => "time",
            SemanticType::Duration => "duration",
            SemanticType::Choice => "choice",
            SemanticType::File => "file",
            SemanticType::Image => "image",
            SemanticType::Json => "json",
            SemanticType::Object => "object",
            SemanticType::PrimaryKey => "primary_key",
            SemanticType::Hyperlink => "hyperlink",
            SemanticType::Method => "method",
            SemanticType::Nested(name) => return write!(f, "nested({})", name),
            SemanticType::ListOf(inner) => return write!(f, "list_of({})", inner),
            SemanticType::Unknown => "unknown",
        };
        f.write_str(tag)
    }
}

/// A choice value: Django choices are keyed by strings or integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChoiceValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for ChoiceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChoiceValue::Int(i) => write!(f, "{}", i),
            ChoiceValue::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceOption {
    pub value: ChoiceValue,
    pub label: String,
}

/// A serializer or model field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
    pub required: bool,
    pub read_only: bool,
    pub write_only: bool,
    pub nullable: bool,
    /// Default value as Python source text
    pub default: Option<String>,
    pub help_text: Option<String>,
    pub choices: Vec<ChoiceOption>,
    pub max_length: Option<i64>,
    pub source: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            required: true,
            read_only: false,
            write_only: false,
            nullable: false,
            default: None,
            help_text: None,
            choices: Vec::new(),
            max_length: None,
            source: None,
        }
    }
}

/// HTTP methods an endpoint can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    /// Parses a verb case-insensitively. `HEAD`, `OPTIONS` and anything else give `None`.
    pub fn parse(verb: &str) -> Option<Self> {
        match verb.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Name of the handler method a class-based view defines for this verb.
    pub fn handler_name(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Patch => "patch",
            HttpMethod::Delete => "delete",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointDescriptor {
    /// Path with `{param}` placeholders, always starting with `/`
    pub path: String,
    pub http_method: HttpMethod,
    /// View class name, or the module name for function views
    pub handler_class: String,
    /// Handler method, viewset action or function name
    pub handler_function: String,
    pub description: String,
    pub serializer_class: Option<String>,
    pub permission_classes: Vec<String>,
}

/// How a view class maps verbs to code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// `View`, `APIView`, `GenericAPIView`: one handler method per verb
    Handler,
    /// Concrete generic views with a fixed verb table
    Generic,
    /// ViewSets: actions bound to verbs by a router or an `as_view` mapping
    ViewSet,
    /// `@api_view` functions
    Function,
}

/// A verb served by a view, bound to the code that handles it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerBinding {
    pub method: HttpMethod,
    /// Handler method or action name
    pub function: String,
    pub docstring: Option<String>,
}

/// A viewset action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewAction {
    pub name: String,
    pub methods: Vec<HttpMethod>,
    /// Detail actions live below the lookup segment
    pub detail: bool,
    /// Extra path segment of `@action` routes
    pub url_path: Option<String>,
    pub docstring: Option<String>,
    pub custom: bool,
}

/// A view class or function view.
#[derive(Debug, Clone, Serialize)]
pub struct ViewDescriptor {
    pub name: String,
    pub source_file: PathBuf,
    pub line: usize,
    pub kind: ViewKind,
    /// Handler class reported on endpoints: the class name or the module of a function view
    pub handler_class: String,
    pub docstring: Option<String>,
    pub serializer_class: Option<String>,
    pub model: Option<String>,
    pub permission_classes: Vec<String>,
    pub lookup_field: String,
    /// Verb bindings of handler, generic and function views
    pub handlers: Vec<HandlerBinding>,
    /// Actions of viewsets
    pub actions: Vec<ViewAction>,
}

impl StructureExtractor {
    /// Creates an extractor with the built-in base tables extended by `config`.
    pub fn new(config: &ExtractionConfig) -> Self {
        let table = |builtin: &[&str], extra: &[String]| -> BTreeSet<String> {
            builtin
                .iter()
                .map(|s| s.to_string())
                .chain(extra.iter().cloned())
                .collect()
        };

        Self {
            serializer_bases: table(classes::SERIALIZER_BASES, &config.serializer_bases),
            view_bases: table(classes::VIEW_BASES, &config.view_bases),
            model_bases: table(classes::MODEL_BASES, &config.model_bases),
            local_roots: BTreeMap::new(),
        }
    }

    /// Top-level classes of each file, in file then declaration order.
    pub fn extract_classes(&self, files: &[ParsedFile]) -> Vec<ClassDescriptor> {
        classes::extract_classes(files)
    }

    pub fn is_serializer_like(&self, class: &ClassDescriptor) -> bool {
        self.root_base(class, ClassRole::Serializer).is_some()
    }

    pub fn is_view_like(&self, class: &ClassDescriptor) -> bool {
        self.root_base(class, ClassRole::View).is_some()
    }

    pub fn is_model_like(&self, class: &ClassDescriptor) -> bool {
        self.root_base(class, ClassRole::Model).is_some()
    }

    /// Fields of a serializer-like or model-like class. Other classes have none.
    pub fn extract_fields(&self, class: &ClassDescriptor) -> Vec<FieldDescriptor> {
        self.extract_fields_with_models(class, &ModelIndex::new())
    }

    /// Like [`extract_fields`](Self::extract_fields), resolving serializer `Meta.fields`
    /// against the models of the application.
    pub fn extract_fields_with_models(
        &self,
        class: &ClassDescriptor,
        models: &ModelIndex,
    ) -> Vec<FieldDescriptor> {
        if self.is_model_like(class) {
            fields::extract_model_fields(class)
        } else if self.is_serializer_like(class) {
            fields::extract_serializer_fields(class, models)
        } else {
            Vec::new()
        }
    }

    /// View classes and `@api_view` functions of the given files.
    pub fn extract_views(&self, files: &[ParsedFile]) -> Extracted<ViewDescriptor> {
        views::extract_views(self, files)
    }

    /// Endpoints of the given files: views are bound to the URL patterns and router
    /// registrations found among the same files.
    pub fn extract_endpoints(&self, files: &[ParsedFile]) -> Extracted<EndpointDescriptor> {
        let views = self.extract_views(files);
        let mut endpoints = views::bind_endpoints(&views.items, files);
        let mut warnings = views.warnings;
        warnings.append(&mut endpoints.warnings);
        Extracted {
            items: endpoints.items,
            warnings,
        }
    }
}
