use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::api::{
    ApiError, ComplaintApi, FormSchemaRequest, SubmissionEnvelope, SubmissionReceipt, UploadedFile,
};
use crate::config::FormConfig;
use crate::forms::OptionItem;
use crate::transport::{ChatTransport, FieldPrompt, TransportError};

/// Engine config that fails fast so retry exhaustion does not sleep.
pub(super) fn fast_config() -> FormConfig {
    FormConfig {
        auto_save_interval: Duration::from_secs(300),
        upload_retries: 1,
    }
}

pub(super) fn routing() -> FormSchemaRequest {
    FormSchemaRequest {
        request_type_id: 3,
        subject_id: 14,
        other_subject_id: None,
        service_id: None,
        side_id: Some(7),
    }
}

/// The reference scenario: a required text attribute, an optional switch,
/// and a required single-file photo slot.
pub(super) fn complaint_schema() -> Value {
    json!({
        "form_version_id": 42,
        "groups": [
            {
                "id": 1,
                "order": 1,
                "name": "البلاغ",
                "attributes": [
                    {
                        "id": 101, "code": "description", "type_code": "text",
                        "order": 1, "name": "الوصف", "required": 1,
                        "extra": {"min_length": 3}
                    },
                    {
                        "id": 102, "code": "urgent", "type_code": "switch",
                        "order": 2, "name": "عاجل", "required": 0
                    }
                ]
            }
        ],
        "documents": [
            {
                "id": 201, "documents_type_id": 9, "documents_type_name": "صورة",
                "accept_extension": ["jpg"], "is_multi": 0, "required": 1
            }
        ]
    })
}

pub(super) fn multi_upload_schema() -> Value {
    json!({
        "form_version_id": 43,
        "groups": [],
        "documents": [
            {
                "id": 301, "documents_type_id": 11, "documents_type_name": "مستندات داعمة",
                "accept_extension": ["pdf", "jpg"], "is_multi": 1, "required": 1
            }
        ]
    })
}

pub(super) fn multi_options_schema() -> Value {
    json!({
        "form_version_id": 44,
        "groups": [
            {
                "id": 1, "order": 1, "name": "الخدمات",
                "attributes": [
                    {
                        "id": 401, "code": "affected_services", "type_code": "multi_options",
                        "order": 1, "name": "الخدمات المتأثرة", "required": 1,
                        "options": [
                            {"id": 1, "name": "كهرباء"},
                            {"id": 2, "name": "مياه"},
                            {"id": 3, "name": "هاتف"},
                            {"id": 4, "name": "صرف صحي"}
                        ]
                    }
                ]
            }
        ],
        "documents": []
    })
}

pub(super) fn time_schema() -> Value {
    json!({
        "form_version_id": 45,
        "groups": [
            {
                "id": 1, "order": 1, "name": "الزيارة",
                "attributes": [
                    {
                        "id": 501, "code": "visit_time", "type_code": "time",
                        "order": 1, "name": "وقت الزيارة", "required": 1,
                        "extra": {
                            "min_time": "08:00:00", "max_time": "22:00:00",
                            "period_min_time": "8:00 ص", "period_max_time": "10:00 م"
                        }
                    }
                ]
            }
        ],
        "documents": []
    })
}

pub(super) fn autocomplete_schema() -> Value {
    json!({
        "form_version_id": 46,
        "groups": [
            {
                "id": 1, "order": 1, "name": "الموقع",
                "attributes": [
                    {
                        "id": 601, "code": "district", "type_code": "autocomplete",
                        "order": 1, "name": "الحي", "required": 1,
                        "extra": {"resource": "districts"}
                    }
                ]
            }
        ],
        "documents": []
    })
}

pub(super) fn jpg_upload(name: &str) -> crate::forms::FileUpload {
    crate::forms::FileUpload {
        file_name: name.to_string(),
        size_bytes: 64 * 1024,
        mime_type: Some("image/jpeg".to_string()),
        bytes: vec![0xff, 0xd8],
    }
}

#[derive(Default)]
pub(super) struct MemoryApi {
    pub schema: Mutex<Option<Value>>,
    pub autocomplete: Mutex<HashMap<String, Vec<OptionItem>>>,
    pub fail_uploads: AtomicBool,
    pub fail_autocomplete: AtomicBool,
    pub submit_failures: AtomicU32,
    pub submissions: Mutex<Vec<SubmissionEnvelope>>,
    upload_counter: AtomicU64,
    submit_counter: AtomicU64,
}

impl MemoryApi {
    pub(super) fn submitted(&self) -> Vec<SubmissionEnvelope> {
        self.submissions.lock().expect("submissions mutex").clone()
    }
}

#[async_trait]
impl ComplaintApi for MemoryApi {
    async fn fetch_form_schema(&self, _request: &FormSchemaRequest) -> Result<Value, ApiError> {
        self.schema
            .lock()
            .expect("schema mutex")
            .clone()
            .ok_or_else(|| ApiError::Payload("no schema configured".to_string()))
    }

    async fn fetch_autocomplete_options(
        &self,
        resource: &str,
    ) -> Result<Vec<OptionItem>, ApiError> {
        if self.fail_autocomplete.load(Ordering::SeqCst) {
            return Err(ApiError::Timeout);
        }
        Ok(self
            .autocomplete
            .lock()
            .expect("autocomplete mutex")
            .get(resource)
            .cloned()
            .unwrap_or_default())
    }

    async fn upload_file(&self, _bytes: &[u8], _file_name: &str) -> Result<UploadedFile, ApiError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ApiError::Status(503));
        }
        let n = self.upload_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UploadedFile {
            file_id: format!("file-{n:04}"),
            mime_type: None,
        })
    }

    async fn submit_form(
        &self,
        submission: &SubmissionEnvelope,
    ) -> Result<SubmissionReceipt, ApiError> {
        self.submissions
            .lock()
            .expect("submissions mutex")
            .push(submission.clone());

        let failures = self.submit_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.submit_failures.store(failures - 1, Ordering::SeqCst);
            return Err(ApiError::Status(500));
        }
        let n = self.submit_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SubmissionReceipt {
            request_number: format!("REQ-2026-{n:06}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Sent {
    Prompt(FieldPrompt),
    Message(String),
}

#[derive(Default)]
pub(super) struct MemoryTransport {
    sent: Mutex<Vec<Sent>>,
}

impl MemoryTransport {
    pub(super) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("transport mutex").clone()
    }

    pub(super) fn last_prompt(&self) -> Option<FieldPrompt> {
        self.sent()
            .into_iter()
            .rev()
            .find_map(|entry| match entry {
                Sent::Prompt(prompt) => Some(prompt),
                Sent::Message(_) => None,
            })
    }

    pub(super) fn messages(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|entry| match entry {
                Sent::Message(text) => Some(text),
                Sent::Prompt(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    async fn send_prompt(&self, prompt: &FieldPrompt) -> Result<(), TransportError> {
        self.sent
            .lock()
            .expect("transport mutex")
            .push(Sent::Prompt(prompt.clone()));
        Ok(())
    }

    async fn send_message(&self, text: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .expect("transport mutex")
            .push(Sent::Message(text.to_string()));
        Ok(())
    }
}
