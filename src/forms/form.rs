use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::field::{FormAttribute, FormDocument, FormField, FormGroup, OptionItem};
use super::schema::SchemaError;
use super::validate::{validate_attribute, NormalizedValue};

/// Aggregate root for one form-filling session.
///
/// Owns the hydrated schema and the collected answers. Created once per
/// session from a freshly fetched schema and discarded on submission or
/// cancellation; schemas are never reused across sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicForm {
    groups: Vec<FormGroup>,
    documents: Vec<FormDocument>,
    form_version_id: Value,
    full_files_size: Option<Value>,
    data: BTreeMap<String, String>,
    document_data: BTreeMap<i64, Vec<String>>,
    errors: BTreeMap<String, String>,
}

impl DynamicForm {
    pub(crate) fn from_parts(
        groups: Vec<FormGroup>,
        documents: Vec<FormDocument>,
        form_version_id: Value,
        full_files_size: Option<Value>,
    ) -> Self {
        Self {
            groups,
            documents,
            form_version_id,
            full_files_size,
            data: BTreeMap::new(),
            document_data: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    pub fn groups(&self) -> &[FormGroup] {
        &self.groups
    }

    pub fn documents(&self) -> &[FormDocument] {
        &self.documents
    }

    pub fn form_version_id(&self) -> &Value {
        &self.form_version_id
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn document_data(&self) -> &BTreeMap<i64, Vec<String>> {
        &self.document_data
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Every field in traversal order: attributes group by group, then
    /// document slots.
    pub fn all_fields(&self) -> Vec<FormField<'_>> {
        let mut fields = Vec::new();
        for group in &self.groups {
            for attribute in &group.attributes {
                fields.push(FormField::Attribute(attribute));
            }
        }
        for document in &self.documents {
            fields.push(FormField::Document(document));
        }
        fields
    }

    pub fn field_by_id(&self, field_id: i64) -> Option<FormField<'_>> {
        for group in &self.groups {
            for attribute in &group.attributes {
                if attribute.id == field_id {
                    return Some(FormField::Attribute(attribute));
                }
            }
        }
        self.documents
            .iter()
            .find(|document| document.id == field_id)
            .map(FormField::Document)
    }

    pub fn attribute_by_code(&self, code: &str) -> Option<&FormAttribute> {
        self.groups
            .iter()
            .flat_map(|group| group.attributes.iter())
            .find(|attribute| attribute.code == code)
    }

    fn is_answered(&self, field: &FormField<'_>) -> bool {
        match field {
            FormField::Attribute(attribute) => self.data.contains_key(&attribute.id.to_string()),
            FormField::Document(document) => self.document_data.contains_key(&document.id),
        }
    }

    pub fn field_answered(&self, field_id: i64) -> bool {
        self.field_by_id(field_id)
            .map(|field| self.is_answered(&field))
            .unwrap_or(false)
    }

    /// Schema-order scan for the next unanswered field.
    ///
    /// `open_batch` is the one stateful branch: while a multi-upload batch
    /// is open for a document, that document keeps being returned until the
    /// caller closes the batch.
    pub fn next_field(&self, open_batch: Option<i64>) -> Option<FormField<'_>> {
        if let Some(batch_id) = open_batch {
            if let Some(document) = self
                .documents
                .iter()
                .find(|document| document.id == batch_id && document.is_multi)
            {
                return Some(FormField::Document(document));
            }
        }

        for group in &self.groups {
            for attribute in &group.attributes {
                if !self.data.contains_key(&attribute.id.to_string()) {
                    return Some(FormField::Attribute(attribute));
                }
            }
        }

        self.documents
            .iter()
            .find(|document| !self.document_data.contains_key(&document.id))
            .map(FormField::Document)
    }

    /// Validate and store a value for the still-unanswered attribute with
    /// the given code.
    ///
    /// Validation failures are reported through the return value (and the
    /// `errors` map); an unknown code is a programmer error.
    pub fn set_field_value(&mut self, code: &str, raw: &str) -> Result<bool, SchemaError> {
        let attribute = self
            .attribute_by_code(code)
            .ok_or_else(|| SchemaError::UnknownField(code.to_string()))?;
        let key = attribute.id.to_string();
        if self.data.contains_key(&key) {
            return Ok(false);
        }

        match validate_attribute(attribute, raw) {
            Ok(value) => {
                self.data.insert(key.clone(), value.to_wire());
                self.errors.remove(&key);
                Ok(true)
            }
            Err(error) => {
                self.errors.insert(key, error.to_string());
                Ok(false)
            }
        }
    }

    /// Store an already-validated value under an attribute id.
    pub(crate) fn store_value(&mut self, attribute_id: i64, value: &NormalizedValue) {
        let key = attribute_id.to_string();
        self.data.insert(key.clone(), value.to_wire());
        self.errors.remove(&key);
    }

    /// Mark a non-required field as deliberately left blank.
    pub fn skip_field(&mut self, field_id: i64) -> bool {
        match self.field_by_id(field_id) {
            Some(FormField::Attribute(attribute)) if !attribute.required => {
                self.data.insert(attribute.id.to_string(), String::new());
                true
            }
            Some(FormField::Document(document)) if !document.required => {
                self.document_data.insert(document.id, Vec::new());
                true
            }
            _ => false,
        }
    }

    pub fn set_document(&mut self, document_id: i64, file_ids: Vec<String>) -> bool {
        if !self
            .documents
            .iter()
            .any(|document| document.id == document_id)
        {
            return false;
        }
        self.document_data.insert(document_id, file_ids);
        true
    }

    pub fn append_document_file(&mut self, document_id: i64, file_id: String) -> bool {
        if !self
            .documents
            .iter()
            .any(|document| document.id == document_id)
        {
            return false;
        }
        self.document_data
            .entry(document_id)
            .or_default()
            .push(file_id);
        true
    }

    /// Remove a stored answer so re-answering overwrites cleanly.
    pub fn clear_field(&mut self, field_id: i64) {
        self.data.remove(&field_id.to_string());
        self.document_data.remove(&field_id);
        self.errors.remove(&field_id.to_string());
    }

    /// True iff every required attribute and document has an entry.
    pub fn is_complete(&self) -> bool {
        for group in &self.groups {
            for attribute in &group.attributes {
                if attribute.required && !self.data.contains_key(&attribute.id.to_string()) {
                    return false;
                }
            }
        }
        self.documents.iter().all(|document| {
            !document.required || self.document_data.contains_key(&document.id)
        })
    }

    /// Cache lazily fetched autocomplete options on an attribute.
    pub fn hydrate_options(&mut self, attribute_id: i64, options: Vec<OptionItem>) -> bool {
        for group in &mut self.groups {
            for attribute in &mut group.attributes {
                if attribute.id == attribute_id {
                    attribute.options = options;
                    return true;
                }
            }
        }
        false
    }

    /// Pure projection of the collected answers into the submission shape
    /// the backend expects, including the schema echo it re-validates
    /// against.
    pub fn to_submission(&self) -> SubmissionPayload {
        let documents = self
            .document_data
            .iter()
            .filter_map(|(document_id, file_ids)| {
                self.documents
                    .iter()
                    .find(|document| document.id == *document_id)
                    .map(|document| SubmissionDocument {
                        id: document.id,
                        documents_type_id: document.documents_type_id,
                        file_ids: file_ids
                            .iter()
                            .map(|file_id| SubmissionFileId {
                                file_id: file_id.clone(),
                            })
                            .collect(),
                    })
            })
            .collect();

        SubmissionPayload {
            form_version_id: self.form_version_id.clone(),
            data: self.data.clone(),
            documents,
            groups: self.groups.iter().map(FormGroup::to_schema_value).collect(),
            full_files_size: self.full_files_size.clone(),
        }
    }

    /// Re-apply previously collected answers when resuming a session.
    /// Entries for fields no longer present in the schema are dropped.
    pub(crate) fn restore_data(
        &mut self,
        data: BTreeMap<String, String>,
        document_data: BTreeMap<i64, Vec<String>>,
    ) {
        for (key, value) in data {
            let known = key
                .parse::<i64>()
                .ok()
                .and_then(|id| self.field_by_id(id))
                .is_some();
            if known {
                self.data.insert(key, value);
            }
        }
        for (document_id, file_ids) in document_data {
            if self
                .documents
                .iter()
                .any(|document| document.id == document_id)
            {
                self.document_data.insert(document_id, file_ids);
            }
        }
    }
}

/// Serialized form answers plus the schema echo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionPayload {
    pub form_version_id: Value,
    pub data: BTreeMap<String, String>,
    pub documents: Vec<SubmissionDocument>,
    pub groups: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_files_size: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionDocument {
    pub id: i64,
    pub documents_type_id: i64,
    pub file_ids: Vec<SubmissionFileId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionFileId {
    pub file_id: String,
}
