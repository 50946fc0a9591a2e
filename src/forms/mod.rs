pub mod engine;
mod field;
mod form;
pub(crate) mod messages;
mod progress;
pub mod schema;
mod validate;

#[cfg(test)]
mod tests;

pub use engine::{EngineError, EngineState, FileUpload, FormEngine, UserCommand, UserEvent};
pub use field::{
    AttributeConstraints, FieldKind, FormAttribute, FormDocument, FormField, FormGroup, GeoBounds,
    OptionItem,
};
pub use form::{DynamicForm, SubmissionDocument, SubmissionFileId, SubmissionPayload};
pub use progress::{Attachment, FieldState, FormProgressTracker, ProgressSnapshot};
pub use schema::SchemaError;
pub use validate::{
    validate_attribute, validate_document, validate_location, GeoPoint, NormalizedValue,
    ValidationError,
};
