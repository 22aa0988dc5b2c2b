//! Field extraction for serializers and models.

use super::{ChoiceOption, ChoiceValue, ClassDescriptor, FieldDescriptor, ModelIndex, SemanticType};
use crate::parser::expr::{last_segment, Call, PyValue};
use crate::parser::Suite;
use log::debug;

/// DRF serializer field constructors: semantic type and whether the field is always read-only.
fn serializer_field_type(constructor: &str) -> Option<(SemanticType, bool)> {
    let mapped = match constructor {
        "BooleanField" => SemanticType::Boolean,
        "NullBooleanField" => SemanticType::Boolean,
        "CharField" | "RegexField" | "IPAddressField" | "FilePathField" => SemanticType::String,
        "ChoiceField" => SemanticType::Choice,
        "MultipleChoiceField" => SemanticType::list_of(SemanticType::Choice),
        "DateField" => SemanticType::Date,
        "DateTimeField" => SemanticType::Datetime,
        "DecimalField" => SemanticType::Decimal,
        "DictField" | "HStoreField" => SemanticType::Object,
        "DurationField" => SemanticType::Duration,
        "EmailField" => SemanticType::Email,
        "FileField" => SemanticType::File,
        "FloatField" => SemanticType::Float,
        "ImageField" => SemanticType::Image,
        "IntegerField" => SemanticType::Integer,
        "JSONField" => SemanticType::Json,
        "ListField" => SemanticType::list_of(SemanticType::Unknown),
        "PrimaryKeyRelatedField" => SemanticType::PrimaryKey,
        "SlugField" => SemanticType::Slug,
        "TimeField" => SemanticType::Time,
        "URLField" => SemanticType::Url,
        "UUIDField" => SemanticType::Uuid,
        "HyperlinkedRelatedField" => SemanticType::Hyperlink,
        "SlugRelatedField" => SemanticType::String,
        "HyperlinkedIdentityField" => return Some((SemanticType::Hyperlink, true)),
        "StringRelatedField" => return Some((SemanticType::String, true)),
        "ReadOnlyField" => return Some((SemanticType::String, true)),
        "SerializerMethodField" => return Some((SemanticType::Method, true)),
        _ => return None,
    };
    Some((mapped, false))
}

/// Django model field constructors: semantic type and whether the field is an automatic key.
fn model_field_type(constructor: &str) -> Option<(SemanticType, bool)> {
    let mapped = match constructor {
        "AutoField" | "BigAutoField" | "SmallAutoField" => return Some((SemanticType::Integer, true)),
        "CharField" | "TextField" | "FilePathField" | "GenericIPAddressField" | "IPAddressField"
        | "BinaryField" => SemanticType::String,
        "SlugField" => SemanticType::Slug,
        "EmailField" => SemanticType::Email,
        "URLField" => SemanticType::Url,
        "UUIDField" => SemanticType::Uuid,
        "IntegerField" | "BigIntegerField" | "SmallIntegerField" | "PositiveIntegerField"
        | "PositiveSmallIntegerField" | "PositiveBigIntegerField" => SemanticType::Integer,
        "FloatField" => SemanticType::Float,
        "DecimalField" => SemanticType::Decimal,
        "BooleanField" | "NullBooleanField" => SemanticType::Boolean,
        "DateField" => SemanticType::Date,
        "DateTimeField" => SemanticType::Datetime,
        "TimeField" => SemanticType::Time,
        "DurationField" => SemanticType::Duration,
        "FileField" => SemanticType::File,
        "ImageField" => SemanticType::Image,
        "JSONField" => SemanticType::Json,
        "ForeignKey" | "OneToOneField" => SemanticType::PrimaryKey,
        "ManyToManyField" => SemanticType::list_of(SemanticType::PrimaryKey),
        _ => return None,
    };
    Some((mapped, false))
}

/// Fields declared on a serializer class, followed by the implicit fields its `Meta` names.
pub(crate) fn extract_serializer_fields(
    class: &ClassDescriptor,
    models: &ModelIndex,
) -> Vec<FieldDescriptor> {
    let suite = class.block.suite();
    let mut fields = Vec::new();

    for assignment in &suite.assignments {
        if assignment.target.starts_with('_') || assignment.augmented {
            continue;
        }
        let Some(call) = assignment.value.as_call() else {
            continue;
        };
        if let Some(field) = serializer_field(&assignment.target, call, &suite, class) {
            fields.push(field);
        }
    }

    if let Some(meta) = class.block.inner_class("Meta") {
        apply_meta(&mut fields, &meta.suite(), models, &class.name);
    }

    debug!("{}: {} serializer fields", class.name, fields.len());
    fields
}

fn serializer_field(
    name: &str,
    call: &Call,
    suite: &Suite,
    class: &ClassDescriptor,
) -> Option<FieldDescriptor> {
    let constructor = call.short_name();
    let (base_type, implied_read_only) = match serializer_field_type(constructor) {
        Some(mapped) => mapped,
        None if constructor.ends_with("Serializer") => {
            (SemanticType::Nested(constructor.to_string()), false)
        }
        None if constructor.ends_with("Field") => (SemanticType::Unknown, false),
        None => return None,
    };

    let mut semantic_type = base_type;
    if constructor == "ListField" {
        if let Some(child) = call.kwarg("child").and_then(PyValue::as_call) {
            let inner = serializer_field_type(child.short_name())
                .map(|(t, _)| t)
                .unwrap_or(SemanticType::Unknown);
            semantic_type = SemanticType::list_of(inner);
        }
    }
    if call.flag("many") {
        semantic_type = SemanticType::list_of(semantic_type);
    }

    let mut field = FieldDescriptor::new(name, semantic_type);
    field.read_only = implied_read_only || call.flag("read_only");
    field.write_only = call.flag("write_only");
    field.required = !call.flag_false("required") && !field.read_only;
    field.nullable = call.flag("allow_null") || constructor == "NullBooleanField";
    capture_common(&mut field, call);

    let choices_arg = call.kwarg("choices").or_else(|| {
        matches!(constructor, "ChoiceField" | "MultipleChoiceField")
            .then(|| call.args.first())
            .flatten()
    });
    apply_choices(&mut field, choices_arg, suite, class);

    Some(field)
}

/// Fields declared on a model class, with the implicit `id` key first when no field is
/// declared as primary key.
pub(crate) fn extract_model_fields(class: &ClassDescriptor) -> Vec<FieldDescriptor> {
    let suite = class.block.suite();
    let mut fields = Vec::new();
    let mut has_primary_key = false;

    for assignment in &suite.assignments {
        if assignment.target.starts_with('_') || assignment.augmented {
            continue;
        }
        let Some(call) = assignment.value.as_call() else {
            continue;
        };
        let constructor = call.short_name();
        let (semantic_type, auto_key) = match model_field_type(constructor) {
            Some(mapped) => mapped,
            None if constructor.ends_with("Field") => (SemanticType::Unknown, false),
            None => continue,
        };

        let mut field = FieldDescriptor::new(&assignment.target, semantic_type);
        field.read_only = auto_key
            || call.flag("auto_now")
            || call.flag("auto_now_add")
            || call.flag_false("editable");
        field.nullable = call.flag("null") || constructor == "NullBooleanField";
        field.required = !(field.read_only
            || call.flag("blank")
            || call.flag("null")
            || call.kwarg("default").is_some());
        capture_common(&mut field, call);
        apply_choices(&mut field, call.kwarg("choices"), &suite, class);

        has_primary_key |= auto_key || call.flag("primary_key");
        fields.push(field);
    }

    if !has_primary_key && !fields.iter().any(|f| f.name == "id") {
        fields.insert(0, implicit_id());
    }

    debug!("{}: {} model fields", class.name, fields.len());
    fields
}

fn implicit_id() -> FieldDescriptor {
    let mut id = FieldDescriptor::new("id", SemanticType::Integer);
    id.read_only = true;
    id.required = false;
    id
}

fn capture_common(field: &mut FieldDescriptor, call: &Call) {
    field.default = call.kwarg("default").map(|v| v.to_string());
    field.help_text = call
        .kwarg("help_text")
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()));
    field.max_length = call.kwarg("max_length").and_then(PyValue::as_int);
    field.source = call.kwarg("source").and_then(PyValue::as_str).map(str::to_string);
}

/// Resolves a `choices` argument and narrows string and integer fields to `choice`.
fn apply_choices(
    field: &mut FieldDescriptor,
    value: Option<&PyValue>,
    suite: &Suite,
    class: &ClassDescriptor,
) {
    let Some(value) = value else {
        return;
    };
    let resolved = match value {
        PyValue::Name(name) => suite
            .value_of(name)
            .or_else(|| class.module_constants.get(last_segment(name)))
            .or_else(|| class.module_constants.get(name.as_str())),
        other => Some(other),
    };

    let choices = resolved.map(choice_options).unwrap_or_default();
    if choices.is_empty() {
        return;
    }

    field.choices = choices;
    if matches!(field.semantic_type, SemanticType::String | SemanticType::Integer) {
        field.semantic_type = SemanticType::Choice;
    }
}

/// Reads `[(value, label), ...]` choices, flattening named groups.
fn choice_options(value: &PyValue) -> Vec<ChoiceOption> {
    let Some(items) = value.as_seq() else {
        return Vec::new();
    };

    let mut options = Vec::new();
    for item in items {
        match item.as_seq() {
            Some([group_label, group]) if group.as_seq().is_some() && group_label.as_str().is_some() => {
                options.extend(choice_options(group));
            }
            Some([value, label, ..]) => {
                if let Some(value) = choice_value(value) {
                    let label = label
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| value.to_string());
                    options.push(ChoiceOption { value, label });
                }
            }
            _ => {
                if let Some(value) = choice_value(item) {
                    options.push(ChoiceOption {
                        label: value.to_string(),
                        value,
                    });
                }
            }
        }
    }
    options
}

fn choice_value(value: &PyValue) -> Option<ChoiceValue> {
    match value {
        PyValue::Int(i) => Some(ChoiceValue::Int(*i)),
        other => other.as_str().map(|s| ChoiceValue::Str(s.to_string())),
    }
}

/// Applies `Meta.fields`, `exclude`, `read_only_fields` and `extra_kwargs`.
///
/// Implicit fields come from the referenced model of the same application. Declared fields
/// are left untouched by `read_only_fields` and `extra_kwargs`.
fn apply_meta(fields: &mut Vec<FieldDescriptor>, meta: &Suite, models: &ModelIndex, owner: &str) {
    let model_name = meta
        .value_of("model")
        .and_then(PyValue::as_name)
        .map(|name| last_segment(name).to_string());
    let model_fields = model_name.as_ref().and_then(|name| models.get(name));
    let exclude = meta
        .value_of("exclude")
        .map(PyValue::string_items)
        .unwrap_or_default();

    let wanted: Vec<String> = match meta.value_of("fields") {
        Some(PyValue::Str(all)) if all == "__all__" => all_model_field_names(model_fields),
        Some(list @ (PyValue::List(_) | PyValue::Tuple(_))) => list.string_items(),
        None if meta.value_of("exclude").is_some() => all_model_field_names(model_fields),
        _ => Vec::new(),
    };

    let declared_count = fields.len();
    for name in wanted {
        if exclude.contains(&name) || fields.iter().any(|f| f.name == name) {
            continue;
        }
        let field = model_fields
            .and_then(|mf| mf.iter().find(|f| f.name == name))
            .cloned()
            .unwrap_or_else(|| {
                if name == "id" {
                    implicit_id()
                } else {
                    debug!(
                        "{}: field '{}' not found on model {:?}",
                        owner, name, model_name
                    );
                    FieldDescriptor::new(name.as_str(), SemanticType::Unknown)
                }
            });
        fields.push(field);
    }

    let read_only_fields = meta
        .value_of("read_only_fields")
        .map(PyValue::string_items)
        .unwrap_or_default();
    let extra_kwargs = meta.value_of("extra_kwargs");

    for field in fields.iter_mut().skip(declared_count) {
        if read_only_fields.contains(&field.name) {
            field.read_only = true;
            field.required = false;
        }
        let Some(options) = extra_kwargs.and_then(|e| e.dict_get(&field.name)) else {
            continue;
        };
        if let Some(PyValue::Bool(read_only)) = options.dict_get("read_only") {
            field.read_only = *read_only;
            if *read_only {
                field.required = false;
            }
        }
        if let Some(PyValue::Bool(write_only)) = options.dict_get("write_only") {
            field.write_only = *write_only;
        }
        if let Some(PyValue::Bool(required)) = options.dict_get("required") {
            field.required = *required && !field.read_only;
        }
    }
}

fn all_model_field_names(model_fields: Option<&Vec<FieldDescriptor>>) -> Vec<String> {
    model_fields
        .map(|mf| mf.iter().map(|f| f.name.clone()).collect())
        .unwrap_or_default()
}
