use serde::Deserialize;
use serde_json::{Map, Value};

use super::field::{
    AttributeConstraints, FieldKind, FormAttribute, FormDocument, FormGroup, OptionItem,
};
use super::form::DynamicForm;

/// Errors raised while hydrating a fetched schema into a [`DynamicForm`].
///
/// Any of these is fatal to the session: there is no safe way to collect
/// answers against a schema the engine cannot fully interpret.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("form schema is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("schema is missing required key '{0}'")]
    MissingKey(&'static str),
    #[error("attribute {id} declares unknown type_code '{type_code}'")]
    UnknownTypeCode { id: i64, type_code: String },
    #[error("field '{0}' does not exist in this form")]
    UnknownField(String),
}

#[derive(Debug, Deserialize)]
struct RawForm {
    #[serde(default)]
    groups: Vec<RawGroup>,
    #[serde(default)]
    documents: Vec<RawDocument>,
    form_version_id: Option<Value>,
    full_files_size: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    id: Option<i64>,
    display_group_id: Option<i64>,
    #[serde(default)]
    order: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    attributes: Vec<RawAttribute>,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    id: Option<i64>,
    code: Option<String>,
    type_code: Option<String>,
    component_type: Option<String>,
    component_characters_type: Option<String>,
    #[serde(default)]
    order: i64,
    #[serde(default)]
    name: String,
    hint: Option<String>,
    example: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    required: bool,
    #[serde(default)]
    extra: Value,
    #[serde(default)]
    options: Vec<RawOption>,
    #[serde(default)]
    ar: Value,
    #[serde(default)]
    en: Value,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    id: Option<i64>,
    documents_type_id: Option<i64>,
    #[serde(default)]
    documents_type_name: String,
    #[serde(default)]
    accept_extension: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    is_multi: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    required: bool,
    max_file_size: Option<u64>,
}

// The backend emits booleans as 0/1, "0"/"1", or true/false depending on
// the field and the form version.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => flag,
        Value::Number(n) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "True"),
        _ => false,
    })
}

impl DynamicForm {
    /// Hydrate a freshly fetched schema payload.
    pub fn from_schema(schema: &Value) -> Result<Self, SchemaError> {
        let raw: RawForm = serde_json::from_value(schema.clone())?;

        let form_version_id = raw
            .form_version_id
            .ok_or(SchemaError::MissingKey("form_version_id"))?;

        let mut groups = Vec::with_capacity(raw.groups.len());
        for group in raw.groups {
            groups.push(build_group(group)?);
        }
        groups.sort_by_key(|group: &FormGroup| group.order);

        let mut documents = Vec::with_capacity(raw.documents.len());
        for document in raw.documents {
            documents.push(build_document(document)?);
        }

        Ok(DynamicForm::from_parts(
            groups,
            documents,
            form_version_id,
            raw.full_files_size,
        ))
    }
}

fn build_group(raw: RawGroup) -> Result<FormGroup, SchemaError> {
    let id = raw.id.ok_or(SchemaError::MissingKey("groups[].id"))?;

    let mut attributes = Vec::with_capacity(raw.attributes.len());
    for attribute in raw.attributes {
        attributes.push(build_attribute(attribute)?);
    }
    attributes.sort_by_key(|attribute: &FormAttribute| attribute.order);

    Ok(FormGroup {
        id,
        display_group_id: raw.display_group_id,
        order: raw.order,
        name: raw.name,
        attributes,
    })
}

fn build_attribute(raw: RawAttribute) -> Result<FormAttribute, SchemaError> {
    let id = raw.id.ok_or(SchemaError::MissingKey("attributes[].id"))?;
    let code = raw
        .code
        .ok_or(SchemaError::MissingKey("attributes[].code"))?;
    let type_code = raw
        .type_code
        .ok_or(SchemaError::MissingKey("attributes[].type_code"))?;
    let kind = FieldKind::from_wire(&type_code)
        .ok_or(SchemaError::UnknownTypeCode { id, type_code })?;

    let extra = match raw.extra {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let constraints = AttributeConstraints::from_extra(&extra);

    let options = raw
        .options
        .into_iter()
        .map(|option| OptionItem {
            id: option.id,
            name: option.name,
        })
        .collect();

    Ok(FormAttribute {
        id,
        code,
        kind,
        order: raw.order,
        name: raw.name,
        hint: raw.hint,
        example: raw.example,
        required: raw.required,
        constraints,
        options,
        extra,
        component_type: raw.component_type,
        component_characters_type: raw.component_characters_type,
        ar: raw.ar,
        en: raw.en,
    })
}

fn build_document(raw: RawDocument) -> Result<FormDocument, SchemaError> {
    let id = raw.id.ok_or(SchemaError::MissingKey("documents[].id"))?;
    let documents_type_id = raw
        .documents_type_id
        .ok_or(SchemaError::MissingKey("documents[].documents_type_id"))?;

    Ok(FormDocument {
        id,
        documents_type_id,
        documents_type_name: raw.documents_type_name,
        accept_extension: raw.accept_extension,
        is_multi: raw.is_multi,
        required: raw.required,
        max_file_size: raw.max_file_size,
    })
}
