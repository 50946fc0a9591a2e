use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ComplaintApi, FormSchemaRequest, RetryPolicy, SubmissionEnvelope};
use crate::config::FormConfig;
use crate::transport::{ChatTransport, FieldPrompt, PromptKind, TransportError};

use super::field::{FormAttribute, FormDocument, FormField};
use super::form::DynamicForm;
use super::messages;
use super::progress::{FormProgressTracker, ProgressSnapshot};
use super::schema::SchemaError;
use super::validate::{
    validate_attribute, validate_document, validate_location, validate_time_value, GeoPoint,
    NormalizedValue, ValidationError,
};

/// Where the conversation currently stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineState {
    ShowingField,
    AwaitingDisambiguation,
    ShowingSummary,
    Submitted { request_number: String },
    Abandoned,
}

/// Incoming attachment payload from the chat transport.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Navigation and flow-control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Back,
    Skip,
    Done,
    MainMenu,
    Confirm,
    Edit(i64),
}

impl UserCommand {
    /// Recognize the quick-reply labels the prompts themselves offer.
    pub fn from_text(text: &str) -> Option<Self> {
        match text.trim() {
            messages::BACK => Some(Self::Back),
            messages::SKIP => Some(Self::Skip),
            messages::DONE => Some(Self::Done),
            messages::MAIN_MENU => Some(Self::MainMenu),
            messages::CONFIRM_SUBMISSION => Some(Self::Confirm),
            _ => None,
        }
    }
}

/// The single event type the engine consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    Text(String),
    File(FileUpload),
    Location(GeoPoint),
    Command(UserCommand),
}

/// Failures that escape the engine.
///
/// Validation and upload problems never appear here; they are resolved at
/// the field level by re-prompting. Only a broken schema, an exhausted
/// API, or a dead transport can surface.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("complaint API unavailable: {0}")]
    Network(#[from] ApiError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// State-machine driver for one form-filling session.
///
/// Collaborators are injected; the engine holds no process-wide state and
/// expects the transport to serialize events per user, so a single
/// `&mut self` entry point is enough.
pub struct FormEngine<A, T> {
    api: Arc<A>,
    transport: Arc<T>,
    routing: FormSchemaRequest,
    tracker: FormProgressTracker,
    state: EngineState,
    retry: RetryPolicy,
    auto_save_interval: Duration,
    multi_select: Vec<i64>,
    pending_time: Option<(u32, u32)>,
    last_snapshot: Option<ProgressSnapshot>,
}

enum TimeInput {
    Explicit(NaiveTime),
    Ambiguous { hour: u32, minute: u32 },
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    fn apply(self, hour: u32, minute: u32) -> Option<NaiveTime> {
        let hour = match (self, hour) {
            (Meridiem::Am, 12) => 0,
            (Meridiem::Am, h) => h,
            (Meridiem::Pm, 12) => 12,
            (Meridiem::Pm, h) => h + 12,
        };
        NaiveTime::from_hms_opt(hour, minute, 0)
    }
}

fn parse_hm(raw: &str) -> Option<(u32, u32)> {
    let (hour, minute) = raw.split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let minute: u32 = minute.trim().parse().ok()?;
    if minute > 59 {
        return None;
    }
    Some((hour, minute))
}

fn split_meridiem(raw: &str) -> Option<(String, Meridiem)> {
    const AM_SUFFIXES: &[&str] = &["صباحًا", "صباحا", "AM", "am", "Am", "ص"];
    const PM_SUFFIXES: &[&str] = &["مساءً", "مساء", "PM", "pm", "Pm", "م"];
    for suffix in AM_SUFFIXES {
        if let Some(rest) = raw.strip_suffix(suffix) {
            return Some((rest.trim().to_string(), Meridiem::Am));
        }
    }
    for suffix in PM_SUFFIXES {
        if let Some(rest) = raw.strip_suffix(suffix) {
            return Some((rest.trim().to_string(), Meridiem::Pm));
        }
    }
    None
}

fn parse_time_input(raw: &str) -> TimeInput {
    let trimmed = raw.trim();
    if let Some((time_part, meridiem)) = split_meridiem(trimmed) {
        return match parse_hm(&time_part) {
            Some((hour @ 1..=12, minute)) => meridiem
                .apply(hour, minute)
                .map(TimeInput::Explicit)
                .unwrap_or(TimeInput::Invalid),
            _ => TimeInput::Invalid,
        };
    }
    match parse_hm(trimmed) {
        Some((hour @ 1..=12, minute)) => TimeInput::Ambiguous { hour, minute },
        Some((hour, minute)) if hour <= 23 => NaiveTime::from_hms_opt(hour, minute, 0)
            .map(TimeInput::Explicit)
            .unwrap_or(TimeInput::Invalid),
        _ => TimeInput::Invalid,
    }
}

fn parse_meridiem_answer(raw: &str) -> Option<Meridiem> {
    let trimmed = raw.trim();
    if trimmed.contains('ص') || trimmed.eq_ignore_ascii_case("am") {
        Some(Meridiem::Am)
    } else if trimmed.contains('م') || trimmed.eq_ignore_ascii_case("pm") {
        Some(Meridiem::Pm)
    } else {
        None
    }
}

impl<A, T> FormEngine<A, T>
where
    A: ComplaintApi + 'static,
    T: ChatTransport + 'static,
{
    /// Fetch the schema for `routing` and open a fresh session on it.
    pub async fn start(
        api: Arc<A>,
        transport: Arc<T>,
        routing: FormSchemaRequest,
        config: &FormConfig,
    ) -> Result<Self, EngineError> {
        let retry = RetryPolicy::new(config.upload_retries);
        let fetch_api = Arc::clone(&api);
        let schema = retry
            .run("fetch_form_schema", || {
                fetch_api.fetch_form_schema(&routing)
            })
            .await?;
        let form = DynamicForm::from_schema(&schema)?;
        Self::with_form(api, transport, routing, form, config).await
    }

    /// Open a session over an already-hydrated form.
    pub async fn with_form(
        api: Arc<A>,
        transport: Arc<T>,
        routing: FormSchemaRequest,
        form: DynamicForm,
        config: &FormConfig,
    ) -> Result<Self, EngineError> {
        let tracker = FormProgressTracker::new(form);
        Self::open(api, transport, routing, tracker, config).await
    }

    /// Re-open an abandoned session from a snapshot against a freshly
    /// fetched schema.
    pub async fn resume(
        api: Arc<A>,
        transport: Arc<T>,
        routing: FormSchemaRequest,
        schema: &Value,
        snapshot: ProgressSnapshot,
        config: &FormConfig,
    ) -> Result<Self, EngineError> {
        let form = DynamicForm::from_schema(schema)?;
        let tracker = FormProgressTracker::restore(form, snapshot);
        Self::open(api, transport, routing, tracker, config).await
    }

    async fn open(
        api: Arc<A>,
        transport: Arc<T>,
        routing: FormSchemaRequest,
        tracker: FormProgressTracker,
        config: &FormConfig,
    ) -> Result<Self, EngineError> {
        let mut engine = Self {
            api,
            transport,
            routing,
            tracker,
            state: EngineState::ShowingField,
            retry: RetryPolicy::new(config.upload_retries),
            auto_save_interval: config.auto_save_interval,
            multi_select: Vec::new(),
            pending_time: None,
            last_snapshot: None,
        };

        if engine.tracker.is_exhausted() {
            engine.enter_summary().await?;
        } else {
            engine.render_current_field().await?;
        }
        Ok(engine)
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn tracker(&self) -> &FormProgressTracker {
        &self.tracker
    }

    pub fn routing(&self) -> &FormSchemaRequest {
        &self.routing
    }

    /// Serializable resume point for the current progress.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }

    /// Snapshot taken when the session was abandoned or lost the API.
    pub fn last_snapshot(&self) -> Option<&ProgressSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn should_auto_save(&self) -> bool {
        self.tracker.should_auto_save(self.auto_save_interval)
    }

    /// The prompt a transport would need to re-render the current step.
    pub fn current_prompt(&self) -> Option<FieldPrompt> {
        match &self.state {
            EngineState::ShowingField => self.tracker.current_field().map(|field| match field {
                FormField::Attribute(attribute) => self.attribute_prompt(attribute),
                FormField::Document(document) => self.document_prompt(document),
            }),
            EngineState::AwaitingDisambiguation => Some(self.disambiguation_prompt()),
            EngineState::ShowingSummary => Some(self.summary_prompt()),
            EngineState::Submitted { .. } | EngineState::Abandoned => None,
        }
    }

    /// Single entry point for any user event.
    pub async fn submit_input(&mut self, event: UserEvent) -> Result<EngineState, EngineError> {
        self.tracker.touch();
        debug!(state = ?self.state, "form engine event");

        match self.state.clone() {
            EngineState::Submitted { .. } | EngineState::Abandoned => {
                self.transport.send_message(messages::SESSION_ENDED).await?;
            }
            EngineState::AwaitingDisambiguation => self.handle_disambiguation(event).await?,
            EngineState::ShowingSummary => self.handle_summary_event(event).await?,
            EngineState::ShowingField => self.handle_field_event(event).await?,
        }

        Ok(self.state.clone())
    }

    fn normalize(event: UserEvent) -> UserEvent {
        match event {
            UserEvent::Text(text) => match UserCommand::from_text(&text) {
                Some(command) => UserEvent::Command(command),
                None => UserEvent::Text(text),
            },
            other => other,
        }
    }

    async fn handle_field_event(&mut self, event: UserEvent) -> Result<(), EngineError> {
        match Self::normalize(event) {
            UserEvent::Command(command) => self.handle_field_command(command).await,
            UserEvent::Text(text) => self.handle_text_input(&text).await,
            UserEvent::File(upload) => self.handle_file_input(upload).await,
            UserEvent::Location(point) => self.handle_location_input(point).await,
        }
    }

    async fn handle_field_command(&mut self, command: UserCommand) -> Result<(), EngineError> {
        match command {
            UserCommand::MainMenu => self.abandon().await,
            UserCommand::Back => self.go_back().await,
            UserCommand::Skip => self.skip_current().await,
            UserCommand::Done => self.handle_done().await,
            UserCommand::Confirm | UserCommand::Edit(_) => self.render_current_field().await,
        }
    }

    async fn go_back(&mut self) -> Result<(), EngineError> {
        if !self.tracker.retreat() {
            self.transport
                .send_message(messages::CANNOT_GO_BACK)
                .await?;
            return Ok(());
        }

        // Clear the previous answer so re-answering overwrites cleanly.
        if let Some(field_id) = self.tracker.current_field().map(|field| field.id()) {
            self.tracker.form_mut().clear_field(field_id);
            self.tracker.mark_incomplete(field_id);
        }
        self.multi_select.clear();
        self.tracker.close_batch();
        self.render_current_field().await
    }

    async fn skip_current(&mut self) -> Result<(), EngineError> {
        let Some((field_id, field_name, required)) = self
            .tracker
            .current_field()
            .map(|field| (field.id(), field.name().to_string(), field.required()))
        else {
            return self.enter_summary().await;
        };

        if required {
            self.transport
                .send_message(messages::CANNOT_SKIP_REQUIRED)
                .await?;
            return Ok(());
        }

        self.tracker.form_mut().skip_field(field_id);
        self.tracker.mark_incomplete(field_id);
        self.transport
            .send_message(&messages::field_skipped(&field_name))
            .await?;
        self.advance_past_current().await
    }

    async fn handle_done(&mut self) -> Result<(), EngineError> {
        let Some(field) = self.tracker.current_field() else {
            return self.enter_summary().await;
        };

        match field {
            FormField::Attribute(attribute) if attribute.kind.is_multi_choice() => {
                let attribute = attribute.clone();
                self.finish_multi_selection(&attribute).await
            }
            FormField::Document(document) if self.tracker.open_batch() == Some(document.id) => {
                let document = document.clone();
                self.finish_upload_batch(&document).await
            }
            _ => self.render_current_field().await,
        }
    }

    async fn finish_multi_selection(
        &mut self,
        attribute: &FormAttribute,
    ) -> Result<(), EngineError> {
        if self.multi_select.is_empty() {
            if attribute.required {
                return self.reject_input(&ValidationError::EmptySelection).await;
            }
            self.tracker.form_mut().skip_field(attribute.id);
            self.tracker.mark_incomplete(attribute.id);
        } else {
            let value = NormalizedValue::MultiChoice(self.multi_select.clone());
            self.store_and_record(attribute.id, &value);
        }
        self.advance_past_current().await
    }

    async fn finish_upload_batch(&mut self, document: &FormDocument) -> Result<(), EngineError> {
        let has_files = self
            .tracker
            .form()
            .document_data()
            .get(&document.id)
            .map(|files| !files.is_empty())
            .unwrap_or(false);

        if !has_files {
            if document.required {
                return self.reject_input(&ValidationError::Required).await;
            }
            self.tracker.form_mut().skip_field(document.id);
        }
        self.advance_past_current().await
    }

    async fn handle_text_input(&mut self, text: &str) -> Result<(), EngineError> {
        let Some(field) = self.tracker.current_field() else {
            return self.enter_summary().await;
        };

        let attribute = match field {
            FormField::Document(_) => {
                self.transport
                    .send_message(messages::UPLOAD_EXPECTED)
                    .await?;
                return Ok(());
            }
            FormField::Attribute(attribute) => attribute.clone(),
        };

        use super::field::FieldKind;
        match attribute.kind {
            FieldKind::Map => {
                self.transport
                    .send_message(messages::LOCATION_EXPECTED)
                    .await?;
                Ok(())
            }
            FieldKind::Time => self.handle_time_input(&attribute, text).await,
            kind if kind.is_multi_choice() => self.toggle_multi_selection(&attribute, text).await,
            _ => match validate_attribute(&attribute, text) {
                Ok(value) => {
                    self.store_and_record(attribute.id, &value);
                    self.advance_past_current().await
                }
                Err(error) => self.reject_input(&error).await,
            },
        }
    }

    async fn handle_time_input(
        &mut self,
        attribute: &FormAttribute,
        text: &str,
    ) -> Result<(), EngineError> {
        let has_display_period = attribute.constraints.period_min_time.is_some()
            || attribute.constraints.period_max_time.is_some();

        match parse_time_input(text) {
            TimeInput::Explicit(time) => self.finish_time(attribute, time).await,
            TimeInput::Ambiguous { hour, minute } if has_display_period => {
                self.pending_time = Some((hour, minute));
                self.state = EngineState::AwaitingDisambiguation;
                let prompt = self.disambiguation_prompt();
                self.transport.send_prompt(&prompt).await?;
                Ok(())
            }
            TimeInput::Ambiguous { hour, minute } => match NaiveTime::from_hms_opt(hour, minute, 0)
            {
                Some(time) => self.finish_time(attribute, time).await,
                None => self.reject_input(&ValidationError::InvalidTime).await,
            },
            TimeInput::Invalid => self.reject_input(&ValidationError::InvalidTime).await,
        }
    }

    async fn finish_time(
        &mut self,
        attribute: &FormAttribute,
        time: NaiveTime,
    ) -> Result<(), EngineError> {
        match validate_time_value(attribute, time) {
            Ok(value) => {
                self.store_and_record(attribute.id, &value);
                self.advance_past_current().await
            }
            Err(error) => self.reject_input(&error).await,
        }
    }

    async fn handle_disambiguation(&mut self, event: UserEvent) -> Result<(), EngineError> {
        match Self::normalize(event) {
            UserEvent::Command(UserCommand::MainMenu) => return self.abandon().await,
            UserEvent::Command(UserCommand::Back) => {
                self.pending_time = None;
                self.state = EngineState::ShowingField;
                return self.render_current_field().await;
            }
            UserEvent::Text(text) => {
                if let Some(meridiem) = parse_meridiem_answer(&text) {
                    let Some((hour, minute)) = self.pending_time.take() else {
                        self.state = EngineState::ShowingField;
                        return self.render_current_field().await;
                    };
                    let attribute = match self.tracker.current_field() {
                        Some(FormField::Attribute(attribute)) => attribute.clone(),
                        _ => {
                            self.state = EngineState::ShowingField;
                            return self.render_current_field().await;
                        }
                    };
                    self.state = EngineState::ShowingField;
                    return match meridiem.apply(hour, minute) {
                        Some(time) => self.finish_time(&attribute, time).await,
                        None => self.reject_input(&ValidationError::InvalidTime).await,
                    };
                }
            }
            _ => {}
        }

        let prompt = self.disambiguation_prompt();
        self.transport.send_prompt(&prompt).await?;
        Ok(())
    }

    async fn toggle_multi_selection(
        &mut self,
        attribute: &FormAttribute,
        text: &str,
    ) -> Result<(), EngineError> {
        let resolved: Option<Vec<i64>> = if text.contains(',') {
            match validate_attribute(attribute, text) {
                Ok(NormalizedValue::MultiChoice(ids)) => Some(ids),
                _ => None,
            }
        } else {
            attribute
                .option_by_label(text)
                .map(|option| vec![option.id])
        };

        let Some(ids) = resolved else {
            self.transport
                .send_message(&ValidationError::InvalidMultiOption.to_string())
                .await?;
            return Ok(());
        };

        for id in ids {
            if let Some(position) = self.multi_select.iter().position(|existing| *existing == id)
            {
                self.multi_select.remove(position);
            } else {
                self.multi_select.push(id);
            }
        }

        let names: Vec<&str> = self
            .multi_select
            .iter()
            .filter_map(|id| attribute.option_by_id(*id))
            .map(|option| option.name.as_str())
            .collect();
        self.transport
            .send_message(&messages::selection_state(&names))
            .await?;
        Ok(())
    }

    async fn handle_file_input(&mut self, upload: FileUpload) -> Result<(), EngineError> {
        let Some(field) = self.tracker.current_field() else {
            return self.enter_summary().await;
        };

        let document = match field {
            FormField::Attribute(_) => {
                self.transport.send_message(messages::TEXT_EXPECTED).await?;
                return Ok(());
            }
            FormField::Document(document) => document.clone(),
        };

        if let Err(error) = validate_document(
            &document,
            &upload.file_name,
            upload.size_bytes,
            upload.mime_type.as_deref(),
        ) {
            return self.reject_input(&error).await;
        }

        let api = Arc::clone(&self.api);
        let retry = self.retry.clone();
        let uploaded = retry
            .run("upload_file", || {
                api.upload_file(&upload.bytes, &upload.file_name)
            })
            .await;

        match uploaded {
            Ok(stored) => {
                self.tracker
                    .form_mut()
                    .append_document_file(document.id, stored.file_id.clone());
                self.tracker
                    .record_attachment(document.id, stored.file_id, upload.file_name.clone());

                if document.is_multi {
                    let count = self
                        .tracker
                        .form()
                        .document_data()
                        .get(&document.id)
                        .map(Vec::len)
                        .unwrap_or(0);
                    self.transport
                        .send_message(&messages::upload_accepted(count))
                        .await?;
                    self.render_current_field().await
                } else {
                    self.transport
                        .send_message(&messages::upload_accepted(1))
                        .await?;
                    self.advance_past_current().await
                }
            }
            Err(error) => {
                // Upload-endpoint failure stays local to the document field.
                warn!(%error, document_id = document.id, "file upload failed");
                self.transport
                    .send_message(messages::NETWORK_FAILURE)
                    .await?;
                self.render_current_field().await
            }
        }
    }

    async fn handle_location_input(&mut self, point: GeoPoint) -> Result<(), EngineError> {
        let Some(field) = self.tracker.current_field() else {
            return self.enter_summary().await;
        };

        let attribute = match field {
            FormField::Attribute(attribute) if attribute.kind == super::field::FieldKind::Map => {
                attribute.clone()
            }
            _ => {
                self.transport.send_message(messages::TEXT_EXPECTED).await?;
                return Ok(());
            }
        };

        match validate_location(&attribute, point) {
            Ok(value) => {
                self.store_and_record(attribute.id, &value);
                self.advance_past_current().await
            }
            Err(error) => self.reject_input(&error).await,
        }
    }

    async fn handle_summary_event(&mut self, event: UserEvent) -> Result<(), EngineError> {
        match Self::normalize(event) {
            UserEvent::Command(UserCommand::Confirm) => self.submit().await,
            UserEvent::Command(UserCommand::MainMenu) => self.abandon().await,
            UserEvent::Command(UserCommand::Edit(field_id)) => self.edit_field(field_id).await,
            UserEvent::Text(text) if text.trim() == messages::EDIT_ANSWERS => {
                let prompt = self.edit_chooser_prompt();
                self.transport.send_prompt(&prompt).await?;
                Ok(())
            }
            UserEvent::Text(text) => {
                let chosen = self
                    .tracker
                    .form()
                    .all_fields()
                    .iter()
                    .find(|field| field.name() == text.trim())
                    .map(|field| field.id());
                match chosen {
                    Some(field_id) => self.edit_field(field_id).await,
                    None => self.enter_summary().await,
                }
            }
            _ => self.enter_summary().await,
        }
    }

    async fn edit_field(&mut self, field_id: i64) -> Result<(), EngineError> {
        if !self.tracker.go_to_field(field_id) {
            return self.enter_summary().await;
        }
        self.tracker.form_mut().clear_field(field_id);
        self.tracker.mark_incomplete(field_id);
        self.multi_select.clear();
        self.render_current_field().await
    }

    async fn submit(&mut self) -> Result<(), EngineError> {
        let envelope = SubmissionEnvelope {
            routing: self.routing.clone(),
            form: self.tracker.form().to_submission(),
        };
        let api = Arc::clone(&self.api);
        let retry = self.retry.clone();

        match retry
            .run("submit_form", || api.submit_form(&envelope))
            .await
        {
            Ok(receipt) => {
                info!(request_number = %receipt.request_number, "complaint submitted");
                self.transport
                    .send_message(&messages::submission_accepted(&receipt.request_number))
                    .await?;
                self.state = EngineState::Submitted {
                    request_number: receipt.request_number,
                };
                Ok(())
            }
            Err(error) => {
                // The payload does not mutate between attempts, so the
                // user may retry the identical submission from here.
                warn!(%error, "submission failed");
                self.transport
                    .send_message(messages::SUBMISSION_FAILED)
                    .await?;
                self.enter_summary().await
            }
        }
    }

    async fn abandon(&mut self) -> Result<(), EngineError> {
        self.last_snapshot = Some(self.tracker.snapshot());
        self.transport
            .send_message(messages::PROGRESS_SAVED)
            .await?;
        self.state = EngineState::Abandoned;
        Ok(())
    }

    fn store_and_record(&mut self, attribute_id: i64, value: &NormalizedValue) {
        let wire = value.to_wire();
        self.tracker.form_mut().store_value(attribute_id, value);
        self.tracker.record_value(attribute_id, wire);
    }

    async fn reject_input(&mut self, error: &ValidationError) -> Result<(), EngineError> {
        self.transport
            .send_message(&format!("❌ {error}"))
            .await?;
        self.render_current_field().await
    }

    /// Move the cursor forward, hopping over fields answered out of order
    /// (edit-from-summary), then render the next step or the summary.
    async fn advance_past_current(&mut self) -> Result<(), EngineError> {
        self.multi_select.clear();
        self.tracker.close_batch();
        self.tracker.advance();

        loop {
            match self.tracker.current_field().map(|field| field.id()) {
                Some(field_id) if self.tracker.form().field_answered(field_id) => {
                    self.tracker.advance();
                }
                _ => break,
            }
        }

        if self.tracker.is_exhausted() {
            self.enter_summary().await
        } else {
            self.render_current_field().await
        }
    }

    async fn render_current_field(&mut self) -> Result<(), EngineError> {
        let Some(field) = self.tracker.current_field() else {
            return self.enter_summary().await;
        };

        enum Step {
            Attribute(FormAttribute),
            Document(FormDocument),
        }
        let step = match field {
            FormField::Attribute(attribute) => Step::Attribute(attribute.clone()),
            FormField::Document(document) => Step::Document(document.clone()),
        };

        match step {
            Step::Attribute(mut attribute) => {
                if attribute.kind.uses_autocomplete() && attribute.options.is_empty() {
                    if let Some(resource) = attribute.constraints.resource.clone() {
                        if !self.hydrate_autocomplete(attribute.id, &resource).await? {
                            return Ok(());
                        }
                        if let Some(FormField::Attribute(hydrated)) =
                            self.tracker.form().field_by_id(attribute.id)
                        {
                            attribute = hydrated.clone();
                        }
                    }
                }
                let prompt = self.attribute_prompt(&attribute);
                self.transport.send_prompt(&prompt).await?;
            }
            Step::Document(document) => {
                if document.is_multi {
                    self.tracker.open_batch_for(document.id);
                }
                let prompt = self.document_prompt(&document);
                self.transport.send_prompt(&prompt).await?;
            }
        }

        self.state = EngineState::ShowingField;
        Ok(())
    }

    /// Returns false when the session had to be abandoned because the
    /// options could not be fetched.
    async fn hydrate_autocomplete(
        &mut self,
        attribute_id: i64,
        resource: &str,
    ) -> Result<bool, EngineError> {
        let api = Arc::clone(&self.api);
        let retry = self.retry.clone();
        match retry
            .run("fetch_autocomplete_options", || {
                api.fetch_autocomplete_options(resource)
            })
            .await
        {
            Ok(options) => {
                self.tracker.form_mut().hydrate_options(attribute_id, options);
                Ok(true)
            }
            Err(error) => {
                warn!(%error, resource, "autocomplete fetch failed after retries");
                self.last_snapshot = Some(self.tracker.snapshot());
                self.transport
                    .send_message(messages::NETWORK_FAILURE)
                    .await?;
                self.state = EngineState::Abandoned;
                Ok(false)
            }
        }
    }

    fn progress_body(&self) -> String {
        messages::progress_line(
            self.tracker.progress_percentage(),
            self.tracker.remaining_fields_count(),
            &self.tracker.estimated_time_remaining(),
        )
    }

    fn nav_replies(&self, required: bool, replies: &mut Vec<String>) {
        if self.tracker.can_go_back() {
            replies.push(messages::BACK.to_string());
        }
        if !required {
            replies.push(messages::SKIP.to_string());
        }
        replies.push(messages::MAIN_MENU.to_string());
    }

    fn attribute_prompt(&self, attribute: &FormAttribute) -> FieldPrompt {
        use super::field::FieldKind;

        let mut body = self.progress_body();
        if let Some(example) = &attribute.example {
            if !example.is_empty() {
                body.push_str(&format!("\n💡 مثال: {example}"));
            }
        }
        if let Some(hint) = &attribute.hint {
            if !hint.is_empty() {
                body.push_str(&format!("\nℹ️ {hint}"));
            }
        }
        if let Some(state) = self.tracker.field_state(attribute.id) {
            if let Some(value) = &state.value {
                if !value.is_empty() {
                    body.push_str(&format!("\n✅ القيمة الحالية: {value}"));
                }
            }
        }

        let mut quick_replies = Vec::new();
        match attribute.kind {
            FieldKind::Switch => {
                quick_replies.push(messages::SWITCH_YES.to_string());
                quick_replies.push(messages::SWITCH_NO.to_string());
            }
            FieldKind::Map => quick_replies.push(messages::SHARE_LOCATION.to_string()),
            kind if kind.is_single_choice() || kind.is_multi_choice() => {
                quick_replies.extend(
                    attribute
                        .options
                        .iter()
                        .map(|option| option.name.clone()),
                );
                if kind.is_multi_choice() {
                    quick_replies.push(messages::DONE.to_string());
                }
            }
            _ => {}
        }
        self.nav_replies(attribute.required, &mut quick_replies);

        FieldPrompt {
            field_id: Some(attribute.id),
            kind: PromptKind::Attribute,
            title: format!("📝 {}", attribute.name),
            body,
            quick_replies,
        }
    }

    fn document_prompt(&self, document: &FormDocument) -> FieldPrompt {
        let mut body = self.progress_body();
        if !document.accept_extension.is_empty() {
            body.push_str(&format!(
                "\nالملفات المسموحة: {}",
                document.accept_extension.join(", ")
            ));
        }

        let attachments = self
            .tracker
            .field_state(document.id)
            .map(|state| state.attachments.as_slice())
            .unwrap_or(&[]);
        if !attachments.is_empty() {
            body.push_str(&format!("\n✅ تم رفع {} ملف:", attachments.len()));
            for (index, attachment) in attachments.iter().enumerate() {
                body.push_str(&format!("\n{}. {}", index + 1, attachment.file_name));
            }
        }
        if document.is_multi {
            body.push_str("\n💡 يمكنك رفع ملفات متعددة");
        }

        let mut quick_replies = Vec::new();
        if document.is_multi && !attachments.is_empty() {
            quick_replies.push(messages::DONE.to_string());
        }
        self.nav_replies(document.required, &mut quick_replies);

        FieldPrompt {
            field_id: Some(document.id),
            kind: PromptKind::Document,
            title: format!("📎 {}", document.documents_type_name),
            body,
            quick_replies,
        }
    }

    fn disambiguation_prompt(&self) -> FieldPrompt {
        FieldPrompt {
            field_id: self.tracker.current_field().map(|field| field.id()),
            kind: PromptKind::Disambiguation,
            title: messages::ASK_MERIDIEM.to_string(),
            body: String::new(),
            quick_replies: vec![
                messages::MERIDIEM_AM.to_string(),
                messages::MERIDIEM_PM.to_string(),
                messages::MAIN_MENU.to_string(),
            ],
        }
    }

    fn edit_chooser_prompt(&self) -> FieldPrompt {
        let quick_replies = self
            .tracker
            .form()
            .all_fields()
            .iter()
            .map(|field| field.name().to_string())
            .collect();
        FieldPrompt {
            field_id: None,
            kind: PromptKind::Summary,
            title: messages::CHOOSE_FIELD_TO_EDIT.to_string(),
            body: String::new(),
            quick_replies,
        }
    }

    fn summary_prompt(&self) -> FieldPrompt {
        use super::field::FieldKind;

        let form = self.tracker.form();
        let mut body = String::from("📋 ملخص البيانات:\n");

        for group in form.groups() {
            if !group.name.is_empty() {
                body.push_str(&format!("\n**{}**\n", group.name));
            }
            for attribute in &group.attributes {
                let stored = form.data().get(&attribute.id.to_string());
                match stored {
                    Some(value) if !value.is_empty() => {
                        let display = match attribute.kind {
                            FieldKind::Switch => {
                                if value == "true" {
                                    "نعم".to_string()
                                } else {
                                    "لا".to_string()
                                }
                            }
                            kind if kind.is_single_choice() => value
                                .parse::<i64>()
                                .ok()
                                .and_then(|id| attribute.option_by_id(id))
                                .map(|option| option.name.clone())
                                .unwrap_or_else(|| value.clone()),
                            kind if kind.is_multi_choice() => value
                                .split(',')
                                .filter_map(|token| token.trim().parse::<i64>().ok())
                                .filter_map(|id| attribute.option_by_id(id))
                                .map(|option| option.name.clone())
                                .collect::<Vec<_>>()
                                .join("، "),
                            _ => value.clone(),
                        };
                        body.push_str(&format!("✅ {}: {}\n", attribute.name, display));
                    }
                    Some(_) => body.push_str(&format!("⏭️ {}: تم التخطي\n", attribute.name)),
                    None => body.push_str(&format!("❌ {}: غير مكتمل\n", attribute.name)),
                }
            }
        }

        if !form.documents().is_empty() {
            body.push_str("\n📎 المرفقات:\n");
            for document in form.documents() {
                match form.document_data().get(&document.id) {
                    Some(files) if !files.is_empty() => body.push_str(&format!(
                        "✅ {}: {} ملف\n",
                        document.documents_type_name,
                        files.len()
                    )),
                    Some(_) => body.push_str(&format!(
                        "⏭️ {}: تم التخطي\n",
                        document.documents_type_name
                    )),
                    None => body.push_str(&format!(
                        "❌ {}: لا توجد مرفقات\n",
                        document.documents_type_name
                    )),
                }
            }
        }

        let elapsed_minutes =
            (chrono::Utc::now() - self.tracker.start_time()).num_seconds() as f64 / 60.0;
        body.push_str(&format!(
            "\n📊 الإحصائيات:\nنسبة الإنجاز: {:.1}%\nالوقت المستغرق: {:.1} دقيقة",
            self.tracker.progress_percentage(),
            elapsed_minutes
        ));

        FieldPrompt {
            field_id: None,
            kind: PromptKind::Summary,
            title: messages::SUMMARY_TITLE.to_string(),
            body,
            quick_replies: vec![
                messages::CONFIRM_SUBMISSION.to_string(),
                messages::EDIT_ANSWERS.to_string(),
                messages::MAIN_MENU.to_string(),
            ],
        }
    }

    async fn enter_summary(&mut self) -> Result<(), EngineError> {
        self.tracker.close_batch();
        let prompt = self.summary_prompt();
        self.transport.send_prompt(&prompt).await?;
        self.state = EngineState::ShowingSummary;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meridiem_suffixes_resolve_to_explicit_times() {
        match parse_time_input("3:30 م") {
            TimeInput::Explicit(time) => {
                assert_eq!(time, NaiveTime::from_hms_opt(15, 30, 0).expect("valid"))
            }
            _ => panic!("expected explicit time"),
        }
        match parse_time_input("12:00 AM") {
            TimeInput::Explicit(time) => {
                assert_eq!(time, NaiveTime::from_hms_opt(0, 0, 0).expect("valid"))
            }
            _ => panic!("expected explicit time"),
        }
    }

    #[test]
    fn twelve_hour_clock_without_suffix_is_ambiguous() {
        assert!(matches!(
            parse_time_input("9:15"),
            TimeInput::Ambiguous { hour: 9, minute: 15 }
        ));
        assert!(matches!(parse_time_input("17:45"), TimeInput::Explicit(_)));
        assert!(matches!(parse_time_input("25:00"), TimeInput::Invalid));
        assert!(matches!(parse_time_input("9:75"), TimeInput::Invalid));
    }

    #[test]
    fn quick_reply_labels_map_to_commands() {
        assert_eq!(
            UserCommand::from_text(messages::MAIN_MENU),
            Some(UserCommand::MainMenu)
        );
        assert_eq!(UserCommand::from_text("مرحبا"), None);
    }
}
