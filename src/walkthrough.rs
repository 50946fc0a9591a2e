//! Scripted walkthroughs of the form engine.
//!
//! A walkthrough hydrates a form schema, replays a list of scripted inputs
//! against in-memory collaborators, and reports the resulting engine state,
//! progress, and (when the script confirms) the submission payload. The
//! same machinery powers the `POST /api/v1/forms/walkthrough` endpoint and
//! the `form walkthrough` CLI demo.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Json;
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::{
    ApiError, ComplaintApi, FormSchemaRequest, SubmissionEnvelope, SubmissionReceipt, UploadedFile,
};
use crate::config::FormConfig;
use crate::error::AppError;
use crate::forms::{EngineState, FileUpload, FormEngine, GeoPoint, OptionItem, UserCommand, UserEvent};
use crate::transport::{ChatTransport, FieldPrompt, TransportError};

/// One scripted user turn.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedInput {
    Text {
        value: String,
    },
    File {
        file_name: String,
        size_bytes: u64,
        #[serde(default)]
        mime_type: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        accuracy: Option<f64>,
    },
    Back,
    Skip,
    Done,
    MainMenu,
    Confirm,
    Edit {
        field_id: i64,
    },
}

impl ScriptedInput {
    fn into_event(self) -> UserEvent {
        match self {
            ScriptedInput::Text { value } => UserEvent::Text(value),
            ScriptedInput::File {
                file_name,
                size_bytes,
                mime_type,
            } => UserEvent::File(FileUpload {
                file_name,
                size_bytes,
                mime_type,
                bytes: Vec::new(),
            }),
            ScriptedInput::Location {
                latitude,
                longitude,
                accuracy,
            } => UserEvent::Location(GeoPoint {
                latitude,
                longitude,
                accuracy,
            }),
            ScriptedInput::Back => UserEvent::Command(UserCommand::Back),
            ScriptedInput::Skip => UserEvent::Command(UserCommand::Skip),
            ScriptedInput::Done => UserEvent::Command(UserCommand::Done),
            ScriptedInput::MainMenu => UserEvent::Command(UserCommand::MainMenu),
            ScriptedInput::Confirm => UserEvent::Command(UserCommand::Confirm),
            ScriptedInput::Edit { field_id } => UserEvent::Command(UserCommand::Edit(field_id)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WalkthroughRequest {
    /// Raw form schema, exactly as the complaint backend would serve it.
    pub schema: Value,
    #[serde(default)]
    pub routing: FormSchemaRequest,
    /// Options served for autocomplete resources during the walkthrough.
    #[serde(default)]
    pub autocomplete: HashMap<String, Vec<OptionItem>>,
    #[serde(default)]
    pub script: Vec<ScriptedInput>,
}

/// Everything the engine sent through the transport, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Prompt { prompt: FieldPrompt },
    Message { text: String },
}

#[derive(Debug, Serialize)]
pub struct WalkthroughReport {
    pub state: EngineState,
    pub progress_percentage: f64,
    pub remaining_fields: usize,
    pub is_complete: bool,
    pub transcript: Vec<TranscriptEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionEnvelope>,
}

/// In-memory complaint API serving a fixed schema and canned autocomplete
/// options; uploads and submissions always succeed.
struct ScriptedApi {
    schema: Value,
    autocomplete: HashMap<String, Vec<OptionItem>>,
    upload_counter: AtomicU64,
    submissions: Mutex<Vec<SubmissionEnvelope>>,
}

impl ScriptedApi {
    fn new(schema: Value, autocomplete: HashMap<String, Vec<OptionItem>>) -> Self {
        Self {
            schema,
            autocomplete,
            upload_counter: AtomicU64::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    fn last_submission(&self) -> Option<SubmissionEnvelope> {
        self.submissions
            .lock()
            .expect("submissions mutex poisoned")
            .last()
            .cloned()
    }
}

#[async_trait]
impl ComplaintApi for ScriptedApi {
    async fn fetch_form_schema(&self, _request: &FormSchemaRequest) -> Result<Value, ApiError> {
        Ok(self.schema.clone())
    }

    async fn fetch_autocomplete_options(
        &self,
        resource: &str,
    ) -> Result<Vec<OptionItem>, ApiError> {
        Ok(self
            .autocomplete
            .get(resource)
            .cloned()
            .unwrap_or_default())
    }

    async fn upload_file(&self, _bytes: &[u8], _file_name: &str) -> Result<UploadedFile, ApiError> {
        let n = self.upload_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UploadedFile {
            file_id: format!("walkthrough-file-{n:04}"),
            mime_type: None,
        })
    }

    async fn submit_form(
        &self,
        submission: &SubmissionEnvelope,
    ) -> Result<SubmissionReceipt, ApiError> {
        let mut guard = self.submissions.lock().expect("submissions mutex poisoned");
        guard.push(submission.clone());
        Ok(SubmissionReceipt {
            request_number: format!("REQ-{:06}", guard.len()),
        })
    }
}

#[derive(Default)]
struct RecordingTransport {
    transcript: Mutex<Vec<TranscriptEntry>>,
}

impl RecordingTransport {
    fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript
            .lock()
            .expect("transcript mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_prompt(&self, prompt: &FieldPrompt) -> Result<(), TransportError> {
        self.transcript
            .lock()
            .expect("transcript mutex poisoned")
            .push(TranscriptEntry::Prompt {
                prompt: prompt.clone(),
            });
        Ok(())
    }

    async fn send_message(&self, text: &str) -> Result<(), TransportError> {
        self.transcript
            .lock()
            .expect("transcript mutex poisoned")
            .push(TranscriptEntry::Message {
                text: text.to_string(),
            });
        Ok(())
    }
}

/// Drive a fresh engine through the scripted inputs and report the result.
pub async fn run_walkthrough(request: WalkthroughRequest) -> Result<WalkthroughReport, AppError> {
    let WalkthroughRequest {
        schema,
        routing,
        autocomplete,
        script,
    } = request;

    let api = Arc::new(ScriptedApi::new(schema, autocomplete));
    let transport = Arc::new(RecordingTransport::default());
    let config = FormConfig::default();

    let mut engine =
        FormEngine::start(Arc::clone(&api), Arc::clone(&transport), routing, &config).await?;
    for input in script {
        engine.submit_input(input.into_event()).await?;
    }

    let tracker = engine.tracker();
    Ok(WalkthroughReport {
        state: engine.state().clone(),
        progress_percentage: tracker.progress_percentage(),
        remaining_fields: tracker.remaining_fields_count(),
        is_complete: tracker.form().is_complete(),
        transcript: transport.transcript(),
        submission: api.last_submission(),
    })
}

pub async fn walkthrough_endpoint(
    Json(request): Json<WalkthroughRequest>,
) -> Result<Json<WalkthroughReport>, AppError> {
    let report = run_walkthrough(request).await?;
    Ok(Json(report))
}

pub fn walkthrough_router() -> axum::Router {
    axum::Router::new().route(
        "/api/v1/forms/walkthrough",
        axum::routing::post(walkthrough_endpoint),
    )
}

/// Sample complaint schema used by the CLI demo: a described problem, an
/// urgency switch, a service category, and one photo slot.
pub fn sample_schema() -> Value {
    json!({
        "form_version_id": 7101,
        "groups": [
            {
                "id": 1,
                "order": 1,
                "name": "تفاصيل البلاغ",
                "attributes": [
                    {
                        "id": 101, "code": "description", "type_code": "text",
                        "order": 1, "name": "وصف المشكلة", "required": 1,
                        "extra": {"min_length": 3, "max_length": 500},
                        "example": "انقطاع الكهرباء منذ يومين"
                    },
                    {
                        "id": 102, "code": "urgent", "type_code": "switch",
                        "order": 2, "name": "بلاغ عاجل", "required": 0
                    },
                    {
                        "id": 103, "code": "category", "type_code": "options",
                        "order": 3, "name": "نوع الخدمة", "required": 1,
                        "options": [
                            {"id": 1, "name": "كهرباء"},
                            {"id": 2, "name": "مياه"},
                            {"id": 3, "name": "طرق"}
                        ]
                    }
                ]
            }
        ],
        "documents": [
            {
                "id": 201, "documents_type_id": 9,
                "documents_type_name": "صورة توضيحية",
                "accept_extension": ["jpg", "png"],
                "is_multi": 0, "required": 1
            }
        ]
    })
}

#[derive(Args, Debug)]
pub struct WalkthroughArgs {
    /// Complaint description for the required text field
    #[arg(long, default_value = "انقطاع متكرر للتيار الكهربائي في الحي")]
    pub description: String,
    /// Mark the complaint as urgent instead of skipping the switch
    #[arg(long)]
    pub urgent: bool,
    /// Service category answered on the options field
    #[arg(long, default_value = "كهرباء")]
    pub category: String,
    /// File name attached to the photo slot
    #[arg(long, default_value = "damage.jpg")]
    pub photo: String,
    /// Stop at the summary instead of confirming the submission
    #[arg(long)]
    pub skip_submit: bool,
}

impl Default for WalkthroughArgs {
    fn default() -> Self {
        Self {
            description: "انقطاع متكرر للتيار الكهربائي في الحي".to_string(),
            urgent: false,
            category: "كهرباء".to_string(),
            photo: "damage.jpg".to_string(),
            skip_submit: false,
        }
    }
}

pub fn sample_script(args: &WalkthroughArgs) -> Vec<ScriptedInput> {
    let mut script = vec![ScriptedInput::Text {
        value: args.description.clone(),
    }];
    if args.urgent {
        script.push(ScriptedInput::Text {
            value: "نعم".to_string(),
        });
    } else {
        script.push(ScriptedInput::Skip);
    }
    script.push(ScriptedInput::Text {
        value: args.category.clone(),
    });
    script.push(ScriptedInput::File {
        file_name: args.photo.clone(),
        size_bytes: 256 * 1024,
        mime_type: Some("image/jpeg".to_string()),
    });
    if !args.skip_submit {
        script.push(ScriptedInput::Confirm);
    }
    script
}

pub async fn run_walkthrough_demo(args: WalkthroughArgs) -> Result<(), AppError> {
    let script = sample_script(&args);
    let report = run_walkthrough(WalkthroughRequest {
        schema: sample_schema(),
        routing: FormSchemaRequest::default(),
        autocomplete: HashMap::new(),
        script,
    })
    .await?;

    println!("Form walkthrough demo");
    println!("\nConversation transcript");
    for entry in &report.transcript {
        match entry {
            TranscriptEntry::Prompt { prompt } => {
                println!("- bot: {}", prompt.title);
                if !prompt.body.is_empty() {
                    for line in prompt.body.lines() {
                        println!("    {line}");
                    }
                }
                if !prompt.quick_replies.is_empty() {
                    println!("    [{}]", prompt.quick_replies.join(" | "));
                }
            }
            TranscriptEntry::Message { text } => {
                for (index, line) in text.lines().enumerate() {
                    if index == 0 {
                        println!("- bot: {line}");
                    } else {
                        println!("    {line}");
                    }
                }
            }
        }
    }

    println!(
        "\nFinal state: {}",
        serde_json::to_string(&report.state).unwrap_or_else(|_| "?".to_string())
    );
    println!(
        "Progress: {:.1}% | remaining fields: {} | complete: {}",
        report.progress_percentage, report.remaining_fields, report.is_complete
    );

    match &report.submission {
        Some(envelope) => match serde_json::to_string_pretty(envelope) {
            Ok(json) => println!("\nSubmission payload:\n{json}"),
            Err(err) => println!("\nSubmission payload unavailable: {err}"),
        },
        None => println!("\nSubmission payload: none (form not confirmed)"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn walkthrough_endpoint_completes_sample_form() {
        let args = WalkthroughArgs {
            urgent: true,
            ..WalkthroughArgs::default()
        };
        let request = WalkthroughRequest {
            schema: sample_schema(),
            routing: FormSchemaRequest::default(),
            autocomplete: HashMap::new(),
            script: sample_script(&args),
        };

        let Json(report) = walkthrough_endpoint(Json(request))
            .await
            .expect("walkthrough runs");

        assert!(matches!(report.state, EngineState::Submitted { .. }));
        assert!(report.is_complete);
        assert_eq!(report.remaining_fields, 0);

        let submission = report.submission.expect("submission captured");
        assert_eq!(submission.form.form_version_id, json!(7101));
        assert_eq!(
            submission.form.data.get("101").map(String::as_str),
            Some("انقطاع متكرر للتيار الكهربائي في الحي")
        );
        assert_eq!(
            submission.form.data.get("102").map(String::as_str),
            Some("true")
        );
        assert_eq!(submission.form.documents.len(), 1);
        assert_eq!(submission.form.documents[0].file_ids.len(), 1);
    }

    #[tokio::test]
    async fn walkthrough_reports_validation_reprompt() {
        let request = WalkthroughRequest {
            schema: sample_schema(),
            routing: FormSchemaRequest::default(),
            autocomplete: HashMap::new(),
            script: vec![ScriptedInput::Text {
                value: "اه".to_string(),
            }],
        };

        let Json(report) = walkthrough_endpoint(Json(request))
            .await
            .expect("walkthrough runs");

        assert_eq!(report.state, EngineState::ShowingField);
        assert_eq!(report.progress_percentage, 0.0);
        assert!(!report.is_complete);
        assert!(report.submission.is_none());
        assert!(report.transcript.iter().any(|entry| matches!(
            entry,
            TranscriptEntry::Message { text } if text.starts_with('❌')
        )));
    }

    #[tokio::test]
    async fn walkthrough_stops_at_summary_without_confirm() {
        let args = WalkthroughArgs {
            skip_submit: true,
            ..WalkthroughArgs::default()
        };
        let request = WalkthroughRequest {
            schema: sample_schema(),
            routing: FormSchemaRequest::default(),
            autocomplete: HashMap::new(),
            script: sample_script(&args),
        };

        let Json(report) = walkthrough_endpoint(Json(request))
            .await
            .expect("walkthrough runs");

        assert_eq!(report.state, EngineState::ShowingSummary);
        assert!(report.is_complete);
        assert!(report.submission.is_none());
    }
}
