use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::field::FormField;
use super::form::DynamicForm;
use super::messages;

/// Per-field completion state mirrored for UI progress computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    pub value: Option<String>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Session cursor over a [`DynamicForm`].
///
/// Tracks which field is currently being collected, per-field completion
/// for percentage/ETA display, and the open multi-upload batch. One
/// tracker per form instance; serializable to a [`ProgressSnapshot`] for
/// resume across sessions.
#[derive(Debug, Clone)]
pub struct FormProgressTracker {
    form: DynamicForm,
    field_states: BTreeMap<String, FieldState>,
    field_order: Vec<i64>,
    current_field_index: usize,
    start_time: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    open_multi_upload_document_id: Option<i64>,
}

impl FormProgressTracker {
    pub fn new(form: DynamicForm) -> Self {
        let field_order: Vec<i64> = form.all_fields().iter().map(|field| field.id()).collect();
        let field_states = field_order
            .iter()
            .map(|id| (id.to_string(), FieldState::default()))
            .collect();
        let now = Utc::now();

        Self {
            form,
            field_states,
            field_order,
            current_field_index: 0,
            start_time: now,
            last_activity: now,
            open_multi_upload_document_id: None,
        }
    }

    pub fn form(&self) -> &DynamicForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut DynamicForm {
        &mut self.form
    }

    pub fn field_states(&self) -> &BTreeMap<String, FieldState> {
        &self.field_states
    }

    pub fn field_state(&self, field_id: i64) -> Option<&FieldState> {
        self.field_states.get(&field_id.to_string())
    }

    pub fn current_field_index(&self) -> usize {
        self.current_field_index
    }

    /// The field under the cursor, or `None` once the cursor has walked
    /// past the last field (form complete, show summary).
    pub fn current_field(&self) -> Option<FormField<'_>> {
        self.field_order
            .get(self.current_field_index)
            .and_then(|id| self.form.field_by_id(*id))
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_field_index >= self.field_order.len()
    }

    pub fn can_go_back(&self) -> bool {
        self.current_field_index > 0
    }

    /// Bounds-checked cursor increment; false at the end without mutating.
    pub fn advance(&mut self) -> bool {
        if self.current_field_index < self.field_order.len() {
            self.current_field_index += 1;
            true
        } else {
            false
        }
    }

    /// Bounds-checked cursor decrement; false at the start without mutating.
    pub fn retreat(&mut self) -> bool {
        if self.current_field_index > 0 {
            self.current_field_index -= 1;
            true
        } else {
            false
        }
    }

    /// Jump the cursor to a specific field (edit-from-summary flows).
    pub fn go_to_field(&mut self, field_id: i64) -> bool {
        match self.field_order.iter().position(|id| *id == field_id) {
            Some(index) => {
                self.current_field_index = index;
                true
            }
            None => false,
        }
    }

    pub fn record_value(&mut self, field_id: i64, value: String) {
        if let Some(state) = self.field_states.get_mut(&field_id.to_string()) {
            state.value = Some(value);
            state.is_completed = true;
            state.completed_at = Some(Utc::now());
        }
    }

    pub fn record_attachment(&mut self, field_id: i64, file_id: String, file_name: String) {
        if let Some(state) = self.field_states.get_mut(&field_id.to_string()) {
            state.attachments.push(Attachment {
                file_id,
                file_name,
                uploaded_at: Utc::now(),
            });
            state.is_completed = true;
            state.completed_at = Some(Utc::now());
        }
    }

    pub fn mark_incomplete(&mut self, field_id: i64) {
        if let Some(state) = self.field_states.get_mut(&field_id.to_string()) {
            state.value = None;
            state.is_completed = false;
            state.completed_at = None;
            state.attachments.clear();
        }
    }

    /// Completion ratio in percent, recomputed on demand. An empty form
    /// reports 0 rather than dividing by zero.
    pub fn progress_percentage(&self) -> f64 {
        let total = self.field_states.len();
        if total == 0 {
            return 0.0;
        }
        let completed = self
            .field_states
            .values()
            .filter(|state| state.is_completed)
            .count();
        completed as f64 / total as f64 * 100.0
    }

    pub fn remaining_fields_count(&self) -> usize {
        self.field_states
            .values()
            .filter(|state| !state.is_completed)
            .count()
    }

    /// Linear extrapolation from elapsed time and progress, bucketed into
    /// seconds/minutes/hours. Returns the "unknown" sentinel at 0 progress.
    pub fn estimated_time_remaining(&self) -> String {
        let ratio = self.progress_percentage() / 100.0;
        if ratio <= 0.0 {
            return messages::ETA_UNKNOWN.to_string();
        }

        let elapsed = (Utc::now() - self.start_time).num_seconds().max(0) as f64;
        let remaining = (elapsed / ratio - elapsed).round() as i64;

        if remaining < 60 {
            messages::eta_seconds(remaining)
        } else if remaining < 3600 {
            messages::eta_minutes(remaining / 60)
        } else {
            messages::eta_hours(remaining / 3600)
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn should_auto_save(&self, interval: Duration) -> bool {
        let idle = (Utc::now() - self.last_activity).num_seconds().max(0) as u64;
        idle >= interval.as_secs()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn open_batch(&self) -> Option<i64> {
        self.open_multi_upload_document_id
    }

    pub fn open_batch_for(&mut self, document_id: i64) {
        self.open_multi_upload_document_id = Some(document_id);
    }

    pub fn close_batch(&mut self) {
        self.open_multi_upload_document_id = None;
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            field_states: self.field_states.clone(),
            current_field_index: self.current_field_index,
            start_time: self.start_time,
            last_activity: self.last_activity,
            open_multi_upload_document_id: self.open_multi_upload_document_id,
            data: self.form.data().clone(),
            document_data: self.form.document_data().clone(),
        }
    }

    /// Rebuild a tracker over a freshly hydrated form. Snapshot entries
    /// for fields the schema no longer declares are dropped; the cursor is
    /// clamped into bounds.
    pub fn restore(mut form: DynamicForm, snapshot: ProgressSnapshot) -> Self {
        form.restore_data(snapshot.data, snapshot.document_data);

        let mut tracker = Self::new(form);
        for (key, state) in snapshot.field_states {
            if tracker.field_states.contains_key(&key) {
                tracker.field_states.insert(key, state);
            }
        }
        tracker.current_field_index = snapshot
            .current_field_index
            .min(tracker.field_order.len());
        tracker.start_time = snapshot.start_time;
        tracker.last_activity = snapshot.last_activity;
        tracker.open_multi_upload_document_id = snapshot
            .open_multi_upload_document_id
            .filter(|id| tracker.field_order.contains(id));
        tracker
    }
}

/// Serializable resume point for an abandoned session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub field_states: BTreeMap<String, FieldState>,
    pub current_field_index: usize,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub open_multi_upload_document_id: Option<i64>,
    pub data: BTreeMap<String, String>,
    pub document_data: BTreeMap<i64, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn four_field_form() -> DynamicForm {
        let schema = json!({
            "form_version_id": 1,
            "groups": [
                {"id": 1, "order": 1, "name": "g", "attributes": [
                    {"id": 11, "code": "a", "type_code": "text", "order": 1, "name": "أ", "required": 1},
                    {"id": 12, "code": "b", "type_code": "text", "order": 2, "name": "ب", "required": 0},
                    {"id": 13, "code": "c", "type_code": "number", "order": 3, "name": "ج", "required": 1}
                ]}
            ],
            "documents": [
                {"id": 21, "documents_type_id": 2, "documents_type_name": "مرفق", "accept_extension": ["jpg"], "required": 0}
            ]
        });
        DynamicForm::from_schema(&schema).expect("schema hydrates")
    }

    #[test]
    fn percentage_counts_completed_fields() {
        let mut tracker = FormProgressTracker::new(four_field_form());
        assert_eq!(tracker.progress_percentage(), 0.0);

        tracker.record_value(11, "ok".to_string());
        assert_eq!(tracker.progress_percentage(), 25.0);
        assert_eq!(tracker.remaining_fields_count(), 3);
    }

    #[test]
    fn empty_form_reports_zero_progress() {
        let form = DynamicForm::from_schema(&json!({
            "form_version_id": 1, "groups": [], "documents": []
        }))
        .expect("empty schema hydrates");
        let tracker = FormProgressTracker::new(form);
        assert_eq!(tracker.progress_percentage(), 0.0);
        assert_eq!(tracker.estimated_time_remaining(), messages::ETA_UNKNOWN);
        assert!(tracker.is_exhausted());
    }

    #[test]
    fn eta_is_unknown_until_progress_exists() {
        let tracker = FormProgressTracker::new(four_field_form());
        assert_eq!(tracker.estimated_time_remaining(), messages::ETA_UNKNOWN);
    }

    #[test]
    fn cursor_is_bounds_checked() {
        let mut tracker = FormProgressTracker::new(four_field_form());
        assert!(!tracker.retreat());
        assert!(tracker.advance());
        assert!(tracker.retreat());
        assert_eq!(tracker.current_field_index(), 0);

        for _ in 0..4 {
            assert!(tracker.advance());
        }
        assert!(tracker.is_exhausted());
        assert!(!tracker.advance());
    }

    #[test]
    fn go_to_field_jumps_cursor() {
        let mut tracker = FormProgressTracker::new(four_field_form());
        assert!(tracker.go_to_field(13));
        assert_eq!(tracker.current_field().map(|f| f.id()), Some(13));
        assert!(!tracker.go_to_field(999));
    }

    #[test]
    fn snapshot_round_trips_through_serde() {
        let mut tracker = FormProgressTracker::new(four_field_form());
        tracker.form_mut().set_field_value("a", "مرحبا").expect("known field");
        tracker.record_value(11, "مرحبا".to_string());
        tracker.advance();
        tracker.open_batch_for(21);

        let snapshot = tracker.snapshot();
        let serialized = serde_json::to_string(&snapshot).expect("snapshot serializes");
        let deserialized: ProgressSnapshot =
            serde_json::from_str(&serialized).expect("snapshot deserializes");
        assert_eq!(snapshot, deserialized);

        let restored = FormProgressTracker::restore(four_field_form(), deserialized);
        assert_eq!(restored.current_field_index(), 1);
        assert_eq!(restored.open_batch(), Some(21));
        assert_eq!(
            restored.form().data().get("11").map(String::as_str),
            Some("مرحبا")
        );
        assert_eq!(restored.progress_percentage(), 25.0);
    }
}
