//! The invocation log
//!
//! Every action call is recorded here before it runs and again when it
//! completes. The log is the causal history the matcher joins over and the
//! only shared mutable state of the engine.

mod observer;
mod store;

pub use observer::{ChainHold, CollectingObserver, LogEvent, LogObserver};
pub use store::InvocationLog;

use crate::error::{EngineError, Result};
use crate::types::{InvocationId, Record, ERROR_FIELD};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// The result of a completed action.
///
/// Outputs are either the success shape (named fields, no `error` key) or the
/// error shape (exactly one `error` field carrying a message).
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Arbitrary named fields
    Success(Record),
    /// A human-readable business error
    Error(String),
}

impl Output {
    /// A success output with the given fields
    pub fn success(fields: Record) -> Self {
        Output::Success(fields)
    }

    /// A success output with no fields
    pub fn empty() -> Self {
        Output::Success(Record::new())
    }

    /// An error output carrying `message`
    pub fn error(message: impl Into<String>) -> Self {
        Output::Error(message.into())
    }

    /// Interpret a raw field map as an output.
    ///
    /// A map with an `error` field must have no other fields and the error
    /// must be a string.
    pub fn from_record(mut record: Record) -> Result<Self> {
        match record.remove(ERROR_FIELD) {
            None => Ok(Output::Success(record)),
            Some(_) if !record.is_empty() => Err(EngineError::InvariantViolation(format!(
                "output mixes error with fields: {}",
                record.keys().cloned().collect::<Vec<_>>().join(", ")
            ))),
            Some(Value::String(message)) => Ok(Output::Error(message)),
            Some(other) => Err(EngineError::InvariantViolation(format!(
                "error field must be a string, got {other}"
            ))),
        }
    }

    /// The field-map form of this output
    pub fn to_record(&self) -> Record {
        match self {
            Output::Success(fields) => fields.clone(),
            Output::Error(message) => {
                let mut record = Record::new();
                record.insert(ERROR_FIELD.to_string(), Value::String(message.clone()));
                record
            }
        }
    }

    /// Check if this is the error shape
    pub fn is_error(&self) -> bool {
        matches!(self, Output::Error(_))
    }

    /// The success fields, if any
    pub fn fields(&self) -> Option<&Record> {
        match self {
            Output::Success(fields) => Some(fields),
            Output::Error(_) => None,
        }
    }

    /// The error message, if any
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Output::Error(message) => Some(message),
            Output::Success(_) => None,
        }
    }

    /// Reject success outputs that smuggle an `error` field.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Output::Success(fields) if fields.contains_key(ERROR_FIELD) => {
                Err(EngineError::InvariantViolation(
                    "success output must not contain an error field".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl Serialize for Output {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

/// One logged call to a concept action.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    pub id: InvocationId,
    pub concept: String,
    pub action: String,
    /// Exactly the arguments passed
    pub input: Record,
    /// Set once, when the action returns
    pub output: Option<Output>,
    /// The invocation whose event fired the rule that produced this one
    pub cause: Option<InvocationId>,
    /// First invocation of the causal chain; its own id for external calls
    pub root: InvocationId,
    /// Causal chain depth; 0 for invocations appended from outside the engine
    pub depth: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Invocation {
    /// Check if the action has returned
    pub fn is_completed(&self) -> bool {
        self.output.is_some()
    }

    /// Check if this invocation is of the given concept action
    pub fn is(&self, concept: &str, action: &str) -> bool {
        self.concept == concept && self.action == action
    }
}
