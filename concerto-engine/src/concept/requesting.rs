//! The built-in `Requesting` concept
//!
//! `Requesting.request` is how the outside world enters the engine and
//! `Requesting.respond` is how a causal chain hands its result back. Each
//! request gets a fresh id; the caller waits on a one-shot channel keyed by
//! that id and the first respond carrying it fills the channel.

use super::Concept;
use crate::log::Output;
use crate::types::Record;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Registered name of the built-in request concept
pub const REQUESTING: &str = "Requesting";

/// Field carrying the request id in request outputs and respond inputs
pub const REQUEST_FIELD: &str = "request";

const REQUEST: &str = "request";
const RESPOND: &str = "respond";

/// Pending callers keyed by request id
#[derive(Default)]
pub struct Requesting {
    waiters: DashMap<String, oneshot::Sender<Record>>,
}

impl Requesting {
    /// Create the concept with no pending requests
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a request id and the receiver its response will arrive on
    pub fn open(&self) -> (String, oneshot::Receiver<Record>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id.clone(), tx);
        (id, rx)
    }

    /// Forget a request whose caller stopped waiting
    pub fn cancel(&self, request: &str) -> bool {
        self.waiters.remove(request).is_some()
    }

    /// Number of callers still waiting
    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    fn respond(&self, mut input: Record) -> Output {
        let request = match input.remove(REQUEST_FIELD) {
            Some(Value::String(request)) => request,
            Some(other) => return Output::error(format!("request id must be a string, got {other}")),
            None => return Output::error("respond requires a request field"),
        };

        let Some((_, waiter)) = self.waiters.remove(&request) else {
            warn!(%request, "respond for unknown or already answered request");
            return Output::error(format!("no pending request {request}"));
        };

        if waiter.send(input).is_err() {
            debug!(%request, "caller went away before the response arrived");
        }
        Output::success(Record::from([(REQUEST_FIELD.to_string(), Value::String(request))]))
    }
}

#[async_trait]
impl Concept for Requesting {
    fn name(&self) -> &str {
        REQUESTING
    }

    fn actions(&self) -> Vec<String> {
        vec![REQUEST.to_string(), RESPOND.to_string()]
    }

    async fn perform(&self, action: &str, input: Record) -> Output {
        match action {
            // A request fired by a rule has no caller to answer; it still gets an id.
            REQUEST => Output::success(Record::from([(
                REQUEST_FIELD.to_string(),
                Value::String(Uuid::new_v4().to_string()),
            )])),
            RESPOND => self.respond(input),
            other => Output::error(format!("{REQUESTING} has no action {other}")),
        }
    }
}
