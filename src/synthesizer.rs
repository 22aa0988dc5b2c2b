//! Synthesis of language-neutral type models from extracted serializers.
//!
//! Every serializer becomes an interface, plus `Create`/`Update` request variants and
//! one enum per field with resolved choices. Endpoints get request and response aliases
//! pointing at those interfaces. The models carry TypeScript type expressions and are
//! turned into text by the renderer, which picks a template from [`TypeKind`] alone.

use crate::analyzer::AppAnalysis;
use crate::extractor::{
    ChoiceOption, ChoiceValue, ClassDescriptor, EndpointDescriptor, FieldDescriptor, HttpMethod,
    SemanticType, ViewKind,
};
use crate::naming::{constant_case, pascal_case, strip_suffix_nonempty};
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Module every application module imports shared types from.
pub const COMMON_MODULE: &str = "common";

const ANY_OBJECT: &str = "Record<string, any>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Interface,
    Enum,
    Alias,
}

/// A property of an interface, or a member of an enum (`expression` is the literal).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeProperty {
    pub name: String,
    pub expression: String,
    pub optional: bool,
    pub read_only: bool,
}

/// One named type declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeModel {
    pub name: String,
    pub kind: TypeKind,
    pub type_parameters: Vec<String>,
    pub properties: Vec<TypeProperty>,
    pub description: Option<String>,
    /// Right-hand side of an alias
    pub alias_expression: Option<String>,
}

impl TypeModel {
    pub fn interface(name: impl Into<String>, properties: Vec<TypeProperty>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Interface,
            type_parameters: Vec::new(),
            properties,
            description: None,
            alias_expression: None,
        }
    }

    pub fn alias(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Alias,
            type_parameters: Vec::new(),
            properties: Vec::new(),
            description: None,
            alias_expression: Some(expression.into()),
        }
    }

    pub fn enumeration(name: impl Into<String>, members: Vec<TypeProperty>) -> Self {
        Self {
            kind: TypeKind::Enum,
            ..Self::interface(name, members)
        }
    }

    fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn generic(mut self, parameter: &str) -> Self {
        self.type_parameters.push(parameter.to_string());
        self
    }
}

impl TypeProperty {
    fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            optional: false,
            read_only: false,
        }
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Names a declaration file imports from a sibling module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeImport {
    /// Module name without extension, e.g. `users`
    pub module: String,
    pub names: Vec<String>,
}

/// The content of one declaration file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeModule {
    pub app_name: String,
    pub types: Vec<TypeModel>,
    pub imports: Vec<TypeImport>,
}

#[derive(Debug, Clone)]
struct SerializerEntry {
    app: String,
    interface: String,
    /// Whether `Create`/`Update` variants exist
    writable: bool,
}

/// Imports collected while synthesizing one module.
struct References<'a> {
    app: Option<&'a str>,
    imports: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> References<'a> {
    fn detached() -> Self {
        Self {
            app: None,
            imports: BTreeMap::new(),
        }
    }

    fn for_app(app: &'a str) -> Self {
        Self {
            app: Some(app),
            ..Self::detached()
        }
    }

    fn import(&mut self, module: &str, name: &str) {
        if self.app.map_or(false, |app| app != module) {
            self.imports
                .entry(module.to_string())
                .or_default()
                .insert(name.to_string());
        }
    }

    fn into_imports(self) -> Vec<TypeImport> {
        self.imports
            .into_iter()
            .map(|(module, names)| TypeImport {
                module,
                names: names.into_iter().collect(),
            })
            .collect()
    }
}

/// Builds [`TypeModel`]s and [`TypeModule`]s.
///
/// Serializers of every application are registered up front so nested serializers and
/// endpoint aliases can refer to interfaces declared in other applications.
#[derive(Debug, Clone, Default)]
pub struct InterfaceSynthesizer {
    registry: BTreeMap<String, Vec<SerializerEntry>>,
}

/// Interface name of a serializer class: a trailing `Serializer` is dropped.
pub fn interface_name(class_name: &str) -> String {
    strip_suffix_nonempty(class_name, "Serializer").to_string()
}

impl InterfaceSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_apps(apps: &[AppAnalysis]) -> Self {
        let mut synthesizer = Self::new();
        for app in apps {
            synthesizer.register_app(app);
        }
        synthesizer
    }

    pub fn register_app(&mut self, app: &AppAnalysis) {
        for serializer in &app.serializers {
            self.registry
                .entry(serializer.class.name.clone())
                .or_default()
                .push(SerializerEntry {
                    app: app.name.clone(),
                    interface: interface_name(&serializer.class.name),
                    writable: serializer.fields.iter().any(|f| !f.read_only),
                });
        }
    }

    /// A registered serializer, preferring the one declared in `app`.
    fn resolve(&self, class_name: &str, app: Option<&str>) -> Option<&SerializerEntry> {
        let entries = self.registry.get(class_name)?;
        entries
            .iter()
            .find(|entry| Some(entry.app.as_str()) == app)
            .or_else(|| entries.first())
    }

    /// The interface of one serializer class.
    pub fn synthesize(&self, class: &ClassDescriptor, fields: &[FieldDescriptor]) -> TypeModel {
        self.interface(class, fields, &mut References::detached())
    }

    fn interface(
        &self,
        class: &ClassDescriptor,
        fields: &[FieldDescriptor],
        refs: &mut References<'_>,
    ) -> TypeModel {
        let properties = fields
            .iter()
            .map(|field| TypeProperty {
                name: field.name.clone(),
                expression: self.field_expression(field, refs),
                optional: field.write_only || (!field.required && !field.read_only),
                read_only: field.read_only,
            })
            .collect();

        TypeModel {
            description: class.docstring.clone(),
            ..TypeModel::interface(interface_name(&class.name), properties)
        }
    }

    /// TypeScript expression for a field, including `| null` for nullable fields.
    pub fn type_expression(&self, field: &FieldDescriptor) -> String {
        self.field_expression(field, &mut References::detached())
    }

    fn field_expression(&self, field: &FieldDescriptor, refs: &mut References<'_>) -> String {
        let expression = self.semantic_expression(&field.semantic_type, &field.choices, refs);
        if field.nullable && expression != "any" {
            format!("{} | null", expression)
        } else {
            expression
        }
    }

    fn semantic_expression(
        &self,
        semantic_type: &SemanticType,
        choices: &[ChoiceOption],
        refs: &mut References<'_>,
    ) -> String {
        match semantic_type {
            SemanticType::String
            | SemanticType::Email
            | SemanticType::Url
            | SemanticType::Uuid
            | SemanticType::Slug
            | SemanticType::Date
            | SemanticType::Datetime
            | SemanticType::Time
            | SemanticType::Duration
            | SemanticType::Hyperlink => "string".to_string(),
            SemanticType::Integer | SemanticType::Float | SemanticType::Decimal => {
                "number".to_string()
            }
            SemanticType::Boolean => "boolean".to_string(),
            SemanticType::File | SemanticType::Image => "File | string".to_string(),
            SemanticType::Json | SemanticType::Object => ANY_OBJECT.to_string(),
            SemanticType::PrimaryKey => "number | string".to_string(),
            SemanticType::Choice => {
                if choices.is_empty() {
                    "string".to_string()
                } else {
                    choices
                        .iter()
                        .map(|option| literal(&option.value))
                        .collect::<Vec<_>>()
                        .join(" | ")
                }
            }
            SemanticType::Nested(class_name) => match self.resolve(class_name, refs.app) {
                Some(entry) => {
                    refs.import(&entry.app, &entry.interface);
                    entry.interface.clone()
                }
                None => {
                    debug!("Nested serializer {} is unknown, typing it as any", class_name);
                    "any".to_string()
                }
            },
            SemanticType::ListOf(inner) => {
                let inner = self.semantic_expression(inner, choices, refs);
                if inner.contains(" | ") {
                    format!("({})[]", inner)
                } else {
                    format!("{}[]", inner)
                }
            }
            SemanticType::Method | SemanticType::Unknown => "any".to_string(),
        }
    }

    /// `Create<Name>` and `Update<Name>` request variants of an interface.
    ///
    /// Both drop read-only properties. `Create` keeps optionality, `Update` makes every
    /// property optional. A variant with no properties left is not produced.
    pub fn derive_variants(model: &TypeModel) -> Vec<TypeModel> {
        if model.kind != TypeKind::Interface {
            return Vec::new();
        }
        let writable: Vec<TypeProperty> = model
            .properties
            .iter()
            .filter(|p| !p.read_only)
            .cloned()
            .collect();
        if writable.is_empty() {
            return Vec::new();
        }

        let update = writable.iter().cloned().map(TypeProperty::optional).collect();
        vec![
            TypeModel::interface(format!("Create{}", model.name), writable)
                .described(format!("Payload for creating {}", model.name)),
            TypeModel::interface(format!("Update{}", model.name), update)
                .described(format!("Payload for updating {}", model.name)),
        ]
    }

    /// One enum per field with resolved choices, named `<Class><Field>Choices`.
    pub fn synthesize_choice_enums(
        class: &ClassDescriptor,
        fields: &[FieldDescriptor],
    ) -> Vec<TypeModel> {
        fields
            .iter()
            .filter(|field| !field.choices.is_empty())
            .map(|field| {
                let mut used = BTreeSet::new();
                let members = field
                    .choices
                    .iter()
                    .map(|option| {
                        let symbol = unique_symbol(&member_symbol(option), &mut used);
                        TypeProperty::new(symbol, literal(&option.value))
                    })
                    .collect();

                TypeModel::enumeration(
                    format!("{}{}Choices", class.name, pascal_case(&field.name)),
                    members,
                )
                .described(format!("Choices for {}.{}", class.name, field.name))
            })
            .collect()
    }

    /// The declaration module of one application.
    ///
    /// Per serializer: the interface, its variants, then its choice enums. Endpoint
    /// aliases follow in endpoint order; an alias already produced by an earlier endpoint
    /// is not repeated.
    pub fn synthesize_module(&self, app: &AppAnalysis) -> TypeModule {
        let mut refs = References::for_app(&app.name);
        let mut types = Vec::new();

        for serializer in &app.serializers {
            let model = self.interface(&serializer.class, &serializer.fields, &mut refs);
            let variants = Self::derive_variants(&model);
            types.push(model);
            types.extend(variants);
            types.extend(Self::synthesize_choice_enums(
                &serializer.class,
                &serializer.fields,
            ));
        }

        let shared_names = shared_function_names(app);
        let mut aliases: BTreeMap<String, Option<String>> = BTreeMap::new();
        for endpoint in &app.endpoints {
            for alias in self.endpoint_aliases(app, endpoint, &shared_names, &mut refs) {
                match aliases.get(&alias.name) {
                    Some(expression) if *expression == alias.alias_expression => {
                        debug!("Alias {} already declared", alias.name);
                    }
                    // A clashing alias is kept so the renderer reports it.
                    _ => {
                        aliases.insert(alias.name.clone(), alias.alias_expression.clone());
                        types.push(alias);
                    }
                }
            }
        }

        TypeModule {
            app_name: app.name.clone(),
            types,
            imports: refs.into_imports(),
        }
    }

    fn endpoint_aliases(
        &self,
        app: &AppAnalysis,
        endpoint: &EndpointDescriptor,
        shared_names: &BTreeSet<&str>,
        refs: &mut References<'_>,
    ) -> Vec<TypeModel> {
        let owner = if is_function_view(app, endpoint)
            && !shared_names.contains(endpoint.handler_function.as_str())
        {
            String::new()
        } else {
            pascal_case(&endpoint.handler_class)
        };
        let base_name = format!("{}{}", owner, pascal_case(&endpoint.handler_function));
        let target = endpoint
            .serializer_class
            .as_deref()
            .and_then(|class_name| self.resolve(class_name, Some(&app.name)))
            .cloned();
        let signature = format!("{} {}", endpoint.http_method, endpoint.path);
        let mut aliases = Vec::new();

        if matches!(
            endpoint.http_method,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch
        ) {
            let request = match &target {
                Some(entry) if entry.writable => {
                    let prefix = if endpoint.http_method == HttpMethod::Post {
                        "Create"
                    } else {
                        "Update"
                    };
                    let name = format!("{}{}", prefix, entry.interface);
                    refs.import(&entry.app, &name);
                    name
                }
                _ => ANY_OBJECT.to_string(),
            };
            aliases.push(
                TypeModel::alias(format!("{}Request", base_name), request)
                    .described(format!("Request payload for {}", signature)),
            );
        }

        let response = match (&target, endpoint.http_method) {
            (_, HttpMethod::Delete) => "void".to_string(),
            (Some(entry), HttpMethod::Get) if endpoint.handler_function == "list" => {
                refs.import(&entry.app, &entry.interface);
                refs.import(COMMON_MODULE, "PaginatedResponse");
                format!("PaginatedResponse<{}>", entry.interface)
            }
            (Some(entry), _) => {
                refs.import(&entry.app, &entry.interface);
                entry.interface.clone()
            }
            (None, _) => ANY_OBJECT.to_string(),
        };
        aliases.push(
            TypeModel::alias(format!("{}Response", base_name), response)
                .described(format!("Response of {}", signature)),
        );

        aliases
    }

    /// Shared declarations written to the common module.
    pub fn common_types() -> Vec<TypeModel> {
        vec![
            TypeModel::alias("Nullable", "T | null")
                .generic("T")
                .described("A value that may be null"),
            TypeModel::interface(
                "PaginatedResponse",
                vec![
                    TypeProperty::new("count", "number"),
                    TypeProperty::new("next", "string | null"),
                    TypeProperty::new("previous", "string | null"),
                    TypeProperty::new("results", "T[]"),
                ],
            )
            .generic("T")
            .described("Page of results from a paginated list endpoint"),
            TypeModel::interface(
                "ApiError",
                vec![
                    TypeProperty::new("detail", "string").optional(),
                    TypeProperty::new("non_field_errors", "string[]").optional(),
                    TypeProperty::new("[field: string]", "string[] | string | undefined"),
                ],
            )
            .described("Error body returned by the API"),
            TypeModel::alias(
                "HttpMethod",
                HttpMethod::ALL
                    .iter()
                    .map(|method| format!("'{}'", method))
                    .collect::<Vec<_>>()
                    .join(" | "),
            )
            .described("HTTP methods used by the API"),
        ]
    }
}

fn is_function_view(app: &AppAnalysis, endpoint: &EndpointDescriptor) -> bool {
    app.views.iter().any(|view| {
        view.kind == ViewKind::Function
            && view.handler_class == endpoint.handler_class
            && view.name == endpoint.handler_function
    })
}

/// Function view names defined in more than one file of `app`. Their aliases keep the
/// module prefix.
fn shared_function_names(app: &AppAnalysis) -> BTreeSet<&str> {
    let mut modules: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for endpoint in app.endpoints.iter().filter(|e| is_function_view(app, e)) {
        modules
            .entry(endpoint.handler_function.as_str())
            .or_default()
            .insert(endpoint.handler_class.as_str());
    }
    modules
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(name, _)| name)
        .collect()
}

/// A choice value as a TypeScript literal.
fn literal(value: &ChoiceValue) -> String {
    match value {
        ChoiceValue::Int(i) => i.to_string(),
        ChoiceValue::Str(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push('\'');
            for c in s.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("\\'"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\u{2028}' => out.push_str("\\u2028"),
                    '\u{2029}' => out.push_str("\\u2029"),
                    _ => out.push(c),
                }
            }
            out.push('\'');
            out
        }
    }
}

/// Enum member symbol: the value in `UPPER_SNAKE`, falling back to the label for values
/// with no usable characters.
fn member_symbol(option: &ChoiceOption) -> String {
    let symbol = constant_case(&option.value.to_string());
    if symbol == "VALUE" && !option.label.is_empty() {
        constant_case(&option.label)
    } else {
        symbol
    }
}

fn unique_symbol(symbol: &str, used: &mut BTreeSet<String>) -> String {
    let mut candidate = symbol.to_string();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}_{}", symbol, n);
        n += 1;
    }
    candidate
}
