use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;

use super::field::{FormAttribute, FormDocument};

/// Strongly-typed result of validating one raw input.
///
/// Values stay typed while the engine reasons about them and are flattened
/// to the backend's string encoding only at store time via [`to_wire`].
///
/// [`to_wire`]: NormalizedValue::to_wire
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    /// Empty input on a non-required field.
    Skipped,
    Text(String),
    Digits(String),
    Money(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Mobile(String),
    Phone(String),
    Switch(bool),
    Choice(i64),
    MultiChoice(Vec<i64>),
    Location { latitude: f64, longitude: f64 },
}

impl NormalizedValue {
    pub fn to_wire(&self) -> String {
        match self {
            NormalizedValue::Skipped => String::new(),
            NormalizedValue::Text(value)
            | NormalizedValue::Digits(value)
            | NormalizedValue::Money(value)
            | NormalizedValue::Mobile(value)
            | NormalizedValue::Phone(value) => value.clone(),
            NormalizedValue::Date(date) => date.format("%Y-%m-%d").to_string(),
            NormalizedValue::Time(time) => time.format("%H:%M").to_string(),
            NormalizedValue::Switch(flag) => {
                if *flag {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            NormalizedValue::Choice(id) => id.to_string(),
            NormalizedValue::MultiChoice(ids) => ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
            NormalizedValue::Location {
                latitude,
                longitude,
            } => format!("{latitude},{longitude}"),
        }
    }
}

/// Validation failures; `Display` carries the user-facing Arabic text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("هذا الحقل مطلوب.")]
    Required,
    #[error("النص يجب أن يكون على الأقل {0} حرفًا.")]
    TextTooShort(usize),
    #[error("النص يجب ألا يتجاوز {0} حرفًا.")]
    TextTooLong(usize),
    #[error("يرجى إدخال رقم مكون من {0} أرقام على الأكثر.")]
    InvalidNumber(usize),
    #[error("يرجى إدخال مبلغ صحيح")]
    InvalidMoney,
    #[error("يرجى إدخال تاريخ بالصيغة yyyy-mm-dd.")]
    InvalidDate,
    #[error("التاريخ يجب أن يكون بين {min} و{max}.")]
    DateOutOfRange { min: String, max: String },
    #[error("يرجى إدخال وقت بالصيغة hh:mm.")]
    InvalidTime,
    #[error("الوقت يجب أن يكون بين {min} و{max}.\nيرجى إدخال وقت بالصيغة hh:mm")]
    TimeOutOfRange { min: String, max: String },
    #[error("يرجى إدخال رقم موبايل صحيح (مثال: +9639xxxxxxxx).")]
    InvalidMobile,
    #[error("يرجى إدخال رقم هاتف صحيح.")]
    InvalidPhone,
    #[error("يرجى اختيار نعم أو لا فقط.")]
    InvalidSwitch,
    #[error("يرجى اختيار خيار صالح.")]
    InvalidOption,
    #[error("يرجى اختيار خيارات صالحة من القائمة.")]
    InvalidMultiOption,
    #[error("يرجى اختيار خيار واحد على الأقل إذا كان الحقل مطلوبًا.")]
    EmptySelection,
    #[error("الموقع غير صحيح")]
    InvalidLocation,
    #[error("دقة الموقع غير كافية ({actual:.0} م، المطلوب {required:.0} م)")]
    InsufficientAccuracy { required: f64, actual: f64 },
    #[error("نوع الملف غير مدعوم. الأنواع المدعومة: {0}")]
    UnsupportedExtension(String),
    #[error("حجم الملف كبير جداً. الحد الأقصى: {0:.1} MB")]
    FileTooLarge(f64),
}

fn money_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+(\.\d{1,2})?$").expect("money pattern compiles"))
}

fn mobile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\+963|09)[0-9]{8,9}$").expect("mobile pattern compiles"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?\d{7,15}$").expect("phone pattern compiles"))
}

fn digits_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+$").expect("digits pattern compiles"))
}

const DEFAULT_DIGIT_NUM: usize = 10;
const DEFAULT_MIN_DATE: (i32, u32, u32) = (1900, 1, 1);
const DEFAULT_MAX_DATE: (i32, u32, u32) = (2100, 12, 31);

fn default_min_date() -> NaiveDate {
    let (y, m, d) = DEFAULT_MIN_DATE;
    NaiveDate::from_ymd_opt(y, m, d).expect("valid default min date")
}

fn default_max_date() -> NaiveDate {
    let (y, m, d) = DEFAULT_MAX_DATE;
    NaiveDate::from_ymd_opt(y, m, d).expect("valid default max date")
}

fn default_min_time() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).expect("valid default min time")
}

fn default_max_time() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).expect("valid default max time")
}

/// Validate a raw text input against an attribute's rules.
///
/// Pure; called once per user input against the current field only.
pub fn validate_attribute(
    attribute: &FormAttribute,
    raw: &str,
) -> Result<NormalizedValue, ValidationError> {
    let value = raw.trim();

    if value.is_empty() {
        if attribute.required {
            return Err(ValidationError::Required);
        }
        return Ok(NormalizedValue::Skipped);
    }

    use super::field::FieldKind::*;
    match attribute.kind {
        Text | TextArea => validate_text(attribute, value),
        Number => validate_number(attribute, value),
        Money => {
            if money_pattern().is_match(value) {
                Ok(NormalizedValue::Money(value.to_string()))
            } else {
                Err(ValidationError::InvalidMoney)
            }
        }
        Date => validate_date(attribute, value),
        Time => validate_time(attribute, value),
        Mobile => {
            let cleaned: String = value
                .chars()
                .filter(|c| *c != ' ' && *c != '-')
                .collect();
            if mobile_pattern().is_match(&cleaned) {
                Ok(NormalizedValue::Mobile(cleaned))
            } else {
                Err(ValidationError::InvalidMobile)
            }
        }
        Phone => {
            if phone_pattern().is_match(value) {
                Ok(NormalizedValue::Phone(value.to_string()))
            } else {
                Err(ValidationError::InvalidPhone)
            }
        }
        Switch => validate_switch(value),
        Options | Autocomplete => attribute
            .option_by_label(value)
            .map(|option| NormalizedValue::Choice(option.id))
            .ok_or(ValidationError::InvalidOption),
        MultiOptions | MultipleAutocomplete => validate_multi_choice(attribute, value),
        Map => Err(ValidationError::InvalidLocation),
    }
}

fn validate_text(
    attribute: &FormAttribute,
    value: &str,
) -> Result<NormalizedValue, ValidationError> {
    let length = value.chars().count();
    if let Some(min) = attribute.constraints.min_length {
        if length < min {
            return Err(ValidationError::TextTooShort(min));
        }
    }
    if let Some(max) = attribute.constraints.max_length {
        if length > max {
            return Err(ValidationError::TextTooLong(max));
        }
    }
    Ok(NormalizedValue::Text(value.to_string()))
}

fn validate_number(
    attribute: &FormAttribute,
    value: &str,
) -> Result<NormalizedValue, ValidationError> {
    let digit_num = attribute.constraints.digit_num.unwrap_or(DEFAULT_DIGIT_NUM);
    if !digits_pattern().is_match(value) || value.len() > digit_num {
        return Err(ValidationError::InvalidNumber(digit_num));
    }
    Ok(NormalizedValue::Digits(value.to_string()))
}

fn validate_date(
    attribute: &FormAttribute,
    value: &str,
) -> Result<NormalizedValue, ValidationError> {
    let parsed =
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate)?;

    let min = attribute.constraints.min_date.unwrap_or_else(default_min_date);
    let max = attribute.constraints.max_date.unwrap_or_else(default_max_date);
    if parsed < min || parsed > max {
        return Err(ValidationError::DateOutOfRange {
            min: min.format("%Y-%m-%d").to_string(),
            max: max.format("%Y-%m-%d").to_string(),
        });
    }
    Ok(NormalizedValue::Date(parsed))
}

fn validate_time(
    attribute: &FormAttribute,
    value: &str,
) -> Result<NormalizedValue, ValidationError> {
    let parsed =
        NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| ValidationError::InvalidTime)?;
    validate_time_value(attribute, parsed)
}

/// Range check for an already-parsed time, shared with the AM/PM
/// disambiguation path.
pub(crate) fn validate_time_value(
    attribute: &FormAttribute,
    parsed: NaiveTime,
) -> Result<NormalizedValue, ValidationError> {
    let min = attribute.constraints.min_time.unwrap_or_else(default_min_time);
    let max = attribute.constraints.max_time.unwrap_or_else(default_max_time);
    if parsed < min || parsed > max {
        let display_min = attribute
            .constraints
            .period_min_time
            .clone()
            .unwrap_or_else(|| min.format("%H:%M").to_string());
        let display_max = attribute
            .constraints
            .period_max_time
            .clone()
            .unwrap_or_else(|| max.format("%H:%M").to_string());
        return Err(ValidationError::TimeOutOfRange {
            min: display_min,
            max: display_max,
        });
    }
    Ok(NormalizedValue::Time(parsed))
}

fn validate_switch(value: &str) -> Result<NormalizedValue, ValidationError> {
    match value {
        super::messages::SWITCH_YES | "نعم" | "true" | "yes" => Ok(NormalizedValue::Switch(true)),
        super::messages::SWITCH_NO | "لا" | "false" | "no" => Ok(NormalizedValue::Switch(false)),
        _ => Err(ValidationError::InvalidSwitch),
    }
}

fn validate_multi_choice(
    attribute: &FormAttribute,
    value: &str,
) -> Result<NormalizedValue, ValidationError> {
    let mut ids = Vec::new();
    for token in value.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let option = attribute
            .option_by_label(token)
            .ok_or(ValidationError::InvalidMultiOption)?;
        if !ids.contains(&option.id) {
            ids.push(option.id);
        }
    }
    if ids.is_empty() {
        if attribute.required {
            return Err(ValidationError::EmptySelection);
        }
        return Ok(NormalizedValue::Skipped);
    }
    Ok(NormalizedValue::MultiChoice(ids))
}

/// Incoming location payload for map attributes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
}

pub fn validate_location(
    attribute: &FormAttribute,
    location: GeoPoint,
) -> Result<NormalizedValue, ValidationError> {
    let GeoPoint {
        latitude,
        longitude,
        accuracy,
    } = location;

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(ValidationError::InvalidLocation);
    }
    if let Some(bounds) = &attribute.constraints.bounds {
        if !bounds.contains(latitude, longitude) {
            return Err(ValidationError::InvalidLocation);
        }
    }
    if let (Some(required), Some(actual)) = (attribute.constraints.min_accuracy, accuracy) {
        if actual > required {
            return Err(ValidationError::InsufficientAccuracy { required, actual });
        }
    }
    Ok(NormalizedValue::Location {
        latitude,
        longitude,
    })
}

/// Media classes with their default upload size caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaClass {
    Image,
    Document,
    Video,
    Audio,
}

impl MediaClass {
    fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" => Some(Self::Image),
            "pdf" | "doc" | "docx" | "txt" | "rtf" => Some(Self::Document),
            "mp4" | "avi" | "mov" | "wmv" | "flv" | "mkv" => Some(Self::Video),
            "mp3" | "wav" | "ogg" | "aac" | "wma" => Some(Self::Audio),
            _ => None,
        }
    }

    fn from_mime(mime_type: &str) -> Self {
        match mime_type.parse::<mime::Mime>() {
            Ok(parsed) if parsed.type_() == mime::IMAGE => Self::Image,
            Ok(parsed) if parsed.type_() == mime::VIDEO => Self::Video,
            Ok(parsed) if parsed.type_() == mime::AUDIO => Self::Audio,
            _ => Self::Document,
        }
    }

    const fn max_size(self) -> u64 {
        match self {
            Self::Image => 5 * 1024 * 1024,
            Self::Document => 10 * 1024 * 1024,
            Self::Video => 50 * 1024 * 1024,
            Self::Audio => 20 * 1024 * 1024,
        }
    }
}

fn file_extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Validate an upload against a document slot: extension membership and
/// a size cap derived from the media class (or the slot's override).
pub fn validate_document(
    document: &FormDocument,
    file_name: &str,
    size_bytes: u64,
    mime_type: Option<&str>,
) -> Result<(), ValidationError> {
    let extension = file_extension(file_name).unwrap_or_default();

    if !document.accept_extension.is_empty()
        && !document
            .accept_extension
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(&extension))
    {
        return Err(ValidationError::UnsupportedExtension(
            document.accept_extension.join(", "),
        ));
    }

    let class = MediaClass::from_extension(&extension)
        .unwrap_or_else(|| mime_type.map(MediaClass::from_mime).unwrap_or(MediaClass::Document));
    let max_size = document.max_file_size.unwrap_or_else(|| class.max_size());
    if size_bytes > max_size {
        return Err(ValidationError::FileTooLarge(
            max_size as f64 / (1024.0 * 1024.0),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::field::{AttributeConstraints, FieldKind, FormAttribute, OptionItem};
    use serde_json::Map;

    fn attribute(kind: FieldKind, required: bool) -> FormAttribute {
        FormAttribute {
            id: 1,
            code: "field".to_string(),
            kind,
            order: 1,
            name: "حقل".to_string(),
            hint: None,
            example: None,
            required,
            constraints: AttributeConstraints::default(),
            options: Vec::new(),
            extra: Map::new(),
            component_type: None,
            component_characters_type: None,
            ar: serde_json::Value::Null,
            en: serde_json::Value::Null,
        }
    }

    #[test]
    fn empty_input_honors_required_flag() {
        let optional = attribute(FieldKind::Text, false);
        assert_eq!(
            validate_attribute(&optional, "  "),
            Ok(NormalizedValue::Skipped)
        );

        let mandatory = attribute(FieldKind::Text, true);
        assert_eq!(
            validate_attribute(&mandatory, ""),
            Err(ValidationError::Required)
        );
    }

    #[test]
    fn number_enforces_digit_count_and_charset() {
        let mut attr = attribute(FieldKind::Number, true);
        attr.constraints.digit_num = Some(5);

        assert_eq!(
            validate_attribute(&attr, "12345"),
            Ok(NormalizedValue::Digits("12345".to_string()))
        );
        assert_eq!(
            validate_attribute(&attr, "123456"),
            Err(ValidationError::InvalidNumber(5))
        );
        assert_eq!(
            validate_attribute(&attr, "12a45"),
            Err(ValidationError::InvalidNumber(5))
        );
    }

    #[test]
    fn date_enforces_configured_window() {
        let mut attr = attribute(FieldKind::Date, true);
        attr.constraints.min_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1);
        attr.constraints.max_date = chrono::NaiveDate::from_ymd_opt(2024, 12, 31);

        assert!(matches!(
            validate_attribute(&attr, "2024-06-15"),
            Ok(NormalizedValue::Date(_))
        ));
        assert!(matches!(
            validate_attribute(&attr, "2023-12-31"),
            Err(ValidationError::DateOutOfRange { .. })
        ));
        assert_eq!(
            validate_attribute(&attr, "2024-13-01"),
            Err(ValidationError::InvalidDate)
        );
    }

    #[test]
    fn time_error_surfaces_period_display_strings() {
        let mut attr = attribute(FieldKind::Time, true);
        attr.constraints.min_time = chrono::NaiveTime::from_hms_opt(9, 0, 0);
        attr.constraints.max_time = chrono::NaiveTime::from_hms_opt(17, 0, 0);
        attr.constraints.period_min_time = Some("9:00 ص".to_string());
        attr.constraints.period_max_time = Some("5:00 م".to_string());

        match validate_attribute(&attr, "18:30") {
            Err(ValidationError::TimeOutOfRange { min, max }) => {
                assert_eq!(min, "9:00 ص");
                assert_eq!(max, "5:00 م");
            }
            other => panic!("expected out-of-range time, got {other:?}"),
        }
    }

    #[test]
    fn mobile_strips_separators_before_matching() {
        let attr = attribute(FieldKind::Mobile, true);
        assert_eq!(
            validate_attribute(&attr, "+963 93-1234567"),
            Ok(NormalizedValue::Mobile("+963931234567".to_string()))
        );
        assert_eq!(
            validate_attribute(&attr, "12345"),
            Err(ValidationError::InvalidMobile)
        );
    }

    #[test]
    fn money_accepts_up_to_two_decimals() {
        let attr = attribute(FieldKind::Money, true);
        assert!(validate_attribute(&attr, "1500").is_ok());
        assert!(validate_attribute(&attr, "1500.25").is_ok());
        assert_eq!(
            validate_attribute(&attr, "1500.255"),
            Err(ValidationError::InvalidMoney)
        );
    }

    #[test]
    fn switch_maps_quick_replies_to_booleans() {
        let attr = attribute(FieldKind::Switch, true);
        assert_eq!(
            validate_attribute(&attr, "✅ نعم"),
            Ok(NormalizedValue::Switch(true))
        );
        assert_eq!(
            validate_attribute(&attr, "❌ لا"),
            Ok(NormalizedValue::Switch(false))
        );
        assert_eq!(
            validate_attribute(&attr, "ربما"),
            Err(ValidationError::InvalidSwitch)
        );
    }

    #[test]
    fn choice_resolves_labels_and_literal_ids() {
        let mut attr = attribute(FieldKind::Options, true);
        attr.options = vec![
            OptionItem {
                id: 4,
                name: "كهرباء".to_string(),
            },
            OptionItem {
                id: 9,
                name: "مياه".to_string(),
            },
        ];

        assert_eq!(
            validate_attribute(&attr, "مياه"),
            Ok(NormalizedValue::Choice(9))
        );
        assert_eq!(
            validate_attribute(&attr, "4"),
            Ok(NormalizedValue::Choice(4))
        );
        assert_eq!(
            validate_attribute(&attr, "غاز"),
            Err(ValidationError::InvalidOption)
        );
    }

    #[test]
    fn multi_choice_resolves_each_token() {
        let mut attr = attribute(FieldKind::MultiOptions, true);
        attr.options = vec![
            OptionItem {
                id: 1,
                name: "أ".to_string(),
            },
            OptionItem {
                id: 2,
                name: "ب".to_string(),
            },
            OptionItem {
                id: 3,
                name: "ج".to_string(),
            },
        ];

        assert_eq!(
            validate_attribute(&attr, "أ, ج"),
            Ok(NormalizedValue::MultiChoice(vec![1, 3]))
        );
        assert_eq!(
            validate_attribute(&attr, "أ, د"),
            Err(ValidationError::InvalidMultiOption)
        );
    }

    #[test]
    fn location_checks_ranges_bounds_and_accuracy() {
        let mut attr = attribute(FieldKind::Map, true);
        let input = |lat, lon, accuracy| GeoPoint {
            latitude: lat,
            longitude: lon,
            accuracy,
        };

        assert!(validate_location(&attr, input(33.5, 36.3, None)).is_ok());
        assert_eq!(
            validate_location(&attr, input(91.0, 36.3, None)),
            Err(ValidationError::InvalidLocation)
        );

        attr.constraints.bounds = Some(crate::forms::field::GeoBounds {
            min_lat: 32.0,
            max_lat: 37.5,
            min_lon: 35.5,
            max_lon: 42.5,
        });
        assert_eq!(
            validate_location(&attr, input(30.0, 36.0, None)),
            Err(ValidationError::InvalidLocation)
        );

        attr.constraints.min_accuracy = Some(50.0);
        assert!(matches!(
            validate_location(&attr, input(33.5, 36.3, Some(120.0))),
            Err(ValidationError::InsufficientAccuracy { .. })
        ));
        assert!(validate_location(&attr, input(33.5, 36.3, Some(20.0))).is_ok());
    }

    #[test]
    fn document_rejects_extension_and_size_violations() {
        let document = crate::forms::field::FormDocument {
            id: 31,
            documents_type_id: 5,
            documents_type_name: "صورة".to_string(),
            accept_extension: vec!["jpg".to_string(), "png".to_string()],
            is_multi: false,
            required: true,
            max_file_size: None,
        };

        assert!(validate_document(&document, "damage.JPG", 1024, None).is_ok());
        assert!(matches!(
            validate_document(&document, "damage.pdf", 1024, None),
            Err(ValidationError::UnsupportedExtension(_))
        ));
        assert!(matches!(
            validate_document(&document, "damage.jpg", 6 * 1024 * 1024, Some("image/jpeg")),
            Err(ValidationError::FileTooLarge(_))
        ));
    }
}
