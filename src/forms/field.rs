use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of attribute kinds a form schema may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    TextArea,
    Number,
    Money,
    Date,
    Time,
    Mobile,
    Phone,
    Switch,
    Options,
    Autocomplete,
    MultiOptions,
    MultipleAutocomplete,
    Map,
}

impl FieldKind {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "text_area" => Some(Self::TextArea),
            "number" => Some(Self::Number),
            "money" => Some(Self::Money),
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            "mobile" => Some(Self::Mobile),
            "phone" => Some(Self::Phone),
            "switch" => Some(Self::Switch),
            "options" => Some(Self::Options),
            "autocomplete" => Some(Self::Autocomplete),
            "multi_options" => Some(Self::MultiOptions),
            "multiple_autocomplete" => Some(Self::MultipleAutocomplete),
            "map" => Some(Self::Map),
            _ => None,
        }
    }

    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::TextArea => "text_area",
            Self::Number => "number",
            Self::Money => "money",
            Self::Date => "date",
            Self::Time => "time",
            Self::Mobile => "mobile",
            Self::Phone => "phone",
            Self::Switch => "switch",
            Self::Options => "options",
            Self::Autocomplete => "autocomplete",
            Self::MultiOptions => "multi_options",
            Self::MultipleAutocomplete => "multiple_autocomplete",
            Self::Map => "map",
        }
    }

    pub const fn is_single_choice(self) -> bool {
        matches!(self, Self::Options | Self::Autocomplete)
    }

    pub const fn is_multi_choice(self) -> bool {
        matches!(self, Self::MultiOptions | Self::MultipleAutocomplete)
    }

    pub const fn uses_autocomplete(self) -> bool {
        matches!(self, Self::Autocomplete | Self::MultipleAutocomplete)
    }
}

/// One selectable choice for option-backed attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionItem {
    pub id: i64,
    pub name: String,
}

/// Rectangular bounding box for map attributes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_lat
            && latitude <= self.max_lat
            && longitude >= self.min_lon
            && longitude <= self.max_lon
    }
}

/// Typed projection of the schema's free-form `extra` bag.
///
/// Constraint values arrive loosely typed from the backend (numbers as
/// strings, blank strings for "unset"); anything unparsable is treated as
/// absent, matching the backend's own tolerance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeConstraints {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub digit_num: Option<usize>,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub min_time: Option<NaiveTime>,
    pub max_time: Option<NaiveTime>,
    pub period_min_time: Option<String>,
    pub period_max_time: Option<String>,
    pub resource: Option<String>,
    pub bounds: Option<GeoBounds>,
    pub min_accuracy: Option<f64>,
    pub max_file_size: Option<u64>,
}

fn extra_str(extra: &Map<String, Value>, key: &str) -> Option<String> {
    match extra.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn extra_usize(extra: &Map<String, Value>, key: &str) -> Option<usize> {
    extra_str(extra, key).and_then(|s| s.parse().ok())
}

fn extra_u64(extra: &Map<String, Value>, key: &str) -> Option<u64> {
    extra_str(extra, key).and_then(|s| s.parse().ok())
}

fn extra_f64(extra: &Map<String, Value>, key: &str) -> Option<f64> {
    match extra.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn extra_date(extra: &Map<String, Value>, key: &str) -> Option<NaiveDate> {
    extra_str(extra, key).and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn extra_time(extra: &Map<String, Value>, key: &str) -> Option<NaiveTime> {
    extra_str(extra, key).and_then(|s| {
        NaiveTime::parse_from_str(&s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M"))
            .ok()
    })
}

impl AttributeConstraints {
    pub fn from_extra(extra: &Map<String, Value>) -> Self {
        let bounds = match (
            extra_f64(extra, "min_lat"),
            extra_f64(extra, "max_lat"),
            extra_f64(extra, "min_lon"),
            extra_f64(extra, "max_lon"),
        ) {
            (Some(min_lat), Some(max_lat), Some(min_lon), Some(max_lon)) => Some(GeoBounds {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
            }),
            _ => None,
        };

        Self {
            min_length: extra_usize(extra, "min_length"),
            max_length: extra_usize(extra, "max_length"),
            digit_num: extra_usize(extra, "digit_num"),
            min_date: extra_date(extra, "min_date"),
            max_date: extra_date(extra, "max_date"),
            min_time: extra_time(extra, "min_time"),
            max_time: extra_time(extra, "max_time"),
            period_min_time: extra_str(extra, "period_min_time"),
            period_max_time: extra_str(extra, "period_max_time"),
            resource: extra_str(extra, "resource"),
            bounds,
            min_accuracy: extra_f64(extra, "min_accuracy"),
            max_file_size: extra_u64(extra, "max_file_size"),
        }
    }
}

/// One user-fillable question from the fetched schema.
///
/// Immutable for the lifetime of a form session except for `options`,
/// which may be hydrated lazily from the autocomplete API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormAttribute {
    pub id: i64,
    pub code: String,
    pub kind: FieldKind,
    pub order: i64,
    pub name: String,
    pub hint: Option<String>,
    pub example: Option<String>,
    pub required: bool,
    pub constraints: AttributeConstraints,
    pub options: Vec<OptionItem>,
    /// Raw `extra` bag, echoed back on submission.
    pub extra: Map<String, Value>,
    /// Opaque schema fields the backend expects echoed verbatim.
    pub component_type: Option<String>,
    pub component_characters_type: Option<String>,
    pub ar: Value,
    pub en: Value,
}

impl FormAttribute {
    pub fn option_by_label(&self, label: &str) -> Option<&OptionItem> {
        let label = label.trim();
        self.options
            .iter()
            .find(|option| option.name == label)
            .or_else(|| {
                label
                    .parse::<i64>()
                    .ok()
                    .and_then(|id| self.options.iter().find(|option| option.id == id))
            })
    }

    pub fn option_by_id(&self, id: i64) -> Option<&OptionItem> {
        self.options.iter().find(|option| option.id == id)
    }

    /// Schema echo required by the backend for server-side re-validation.
    pub(crate) fn to_schema_value(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "type_code": self.kind.wire_name(),
            "component_type": self.component_type,
            "component_characters_type": self.component_characters_type,
            "code": self.code,
            "order": self.order,
            "name": self.name,
            "hint": self.hint,
            "required": self.required,
            "extra": self.extra,
            "options": self.options,
            "example": self.example,
            "ar": self.ar,
            "en": self.en,
        })
    }
}

/// One attachment slot from the fetched schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDocument {
    pub id: i64,
    pub documents_type_id: i64,
    pub documents_type_name: String,
    pub accept_extension: Vec<String>,
    pub is_multi: bool,
    pub required: bool,
    /// Per-slot size cap overriding the media-class default.
    pub max_file_size: Option<u64>,
}

/// Ordered set of attributes under a display heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormGroup {
    pub id: i64,
    pub display_group_id: Option<i64>,
    pub order: i64,
    pub name: String,
    pub attributes: Vec<FormAttribute>,
}

impl FormGroup {
    pub(crate) fn to_schema_value(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "display_group_id": self.display_group_id,
            "order": self.order,
            "name": self.name,
            "attributes": self
                .attributes
                .iter()
                .map(FormAttribute::to_schema_value)
                .collect::<Vec<_>>(),
        })
    }
}

/// A traversal unit: either a question or an attachment slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormField<'a> {
    Attribute(&'a FormAttribute),
    Document(&'a FormDocument),
}

impl<'a> FormField<'a> {
    pub fn id(&self) -> i64 {
        match self {
            FormField::Attribute(attr) => attr.id,
            FormField::Document(doc) => doc.id,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            FormField::Attribute(attr) => &attr.name,
            FormField::Document(doc) => &doc.documents_type_name,
        }
    }

    pub fn required(&self) -> bool {
        match self {
            FormField::Attribute(attr) => attr.required,
            FormField::Document(doc) => doc.required,
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self, FormField::Document(_))
    }
}
