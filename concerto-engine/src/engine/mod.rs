//! The synchronization engine
//!
//! The engine owns the invocation log, the concept registry and the rules.
//! Every append and completion in the log becomes an event; each event is
//! evaluated on its own task against the rules whose when clauses mention
//! its (concept, action), and matching rules dispatch their then actions,
//! whose own events drive further evaluation.
//!
//! # Example
//!
//! ```
//! use concerto_engine::concept::FnConcept;
//! use concerto_engine::pattern::Pattern;
//! use concerto_engine::rule::{ActionTemplate, Rule};
//! use concerto_engine::types::{lit, var};
//! use concerto_engine::{record, Engine, Output};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = Engine::builder()
//!     .concept(FnConcept::new("Echo").action("say", |input| async move { Output::success(input) }))
//!     .rule(
//!         Rule::named("Say")
//!             .when(
//!                 Pattern::on("Requesting", "request")
//!                     .input("path", lit("/say"))
//!                     .input("text", var("text"))
//!                     .output("request", var("request")),
//!             )
//!             .then(ActionTemplate::on("Echo", "say").input("text", var("text")).input("request", var("request"))),
//!     )
//!     .rule(
//!         Rule::named("SayResponse")
//!             .when(Pattern::on("Echo", "say").output("text", var("text")).output("request", var("request")))
//!             .then(ActionTemplate::on("Requesting", "respond").input("request", var("request")).input("text", var("text"))),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let response = engine.request(record! { "path" => "/say", "text" => "hi" }).await.unwrap();
//! assert_eq!(response, record! { "text" => "hi" });
//! # }
//! ```

mod activity;
mod dispatch;
mod stats;

pub use stats::{EngineStats, StatsSnapshot};

use crate::concept::{Concept, ConceptCatalog, ConceptRegistry, Requesting, REQUESTING, REQUEST_FIELD};
use crate::config::EngineConfig;
use crate::error::{BuildError, EngineError, RequestError, Result};
use crate::log::{InvocationLog, Output};
use crate::rule::{validate, Rule, RuleGraph};
use crate::types::{InvocationId, Record};
use activity::Activity;
use dispatch::{Core, EventSink, Firings};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Collects configuration, concepts and rules for an [`Engine`]
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    concepts: Vec<Arc<dyn Concept>>,
    rules: Vec<Rule>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a concept. `Requesting` is built in and must not be added.
    pub fn concept(self, concept: impl Concept + 'static) -> Self {
        self.shared_concept(Arc::new(concept))
    }

    /// Register a concept the caller keeps a handle to
    pub fn shared_concept(mut self, concept: Arc<dyn Concept>) -> Self {
        self.concepts.push(concept);
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Validate the configuration, then the rules against the concepts, and
    /// start the engine.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the dispatcher runs as
    /// a spawned task.
    pub fn build(self) -> std::result::Result<Engine, BuildError> {
        self.config.validate()?;

        let requesting = Arc::new(Requesting::new());
        let mut concepts = ConceptRegistry::new();
        concepts.register(requesting.clone())?;
        for concept in self.concepts {
            concepts.register(concept)?;
        }

        let validation = validate(&self.rules, &concepts, self.config.strict_acyclic)?;

        let activity = Arc::new(Activity::default());
        let stats = Arc::new(EngineStats::new());
        let firings = Arc::new(Firings::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let log = InvocationLog::new()
            .with_retention(self.config.log_retention)
            .with_observer(Arc::new(EventSink {
                tx,
                activity: activity.clone(),
                stats: stats.clone(),
                firings: firings.clone(),
            }));

        info!(
            concepts = concepts.len(),
            rules = self.rules.len(),
            max_chain_depth = self.config.max_chain_depth,
            "starting engine"
        );

        let core = Arc::new(Core {
            config: self.config,
            log,
            concepts,
            requesting,
            rules: self.rules,
            graph: validation.graph,
            stats,
            activity,
            firings,
        });
        let pump = tokio::spawn(dispatch::pump(core.clone(), rx));

        Ok(Engine {
            core,
            _pump: Arc::new(PumpGuard(pump)),
        })
    }
}

/// Stops the dispatcher when the last engine handle goes away
struct PumpGuard(JoinHandle<()>);

impl Drop for PumpGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A running engine. Cheap to clone; all clones share one log.
#[derive(Clone)]
pub struct Engine {
    core: Arc<Core>,
    _pump: Arc<PumpGuard>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Submit an external request and wait for the chain it starts to respond.
    ///
    /// Appends `Requesting.request` with `fields` as input, completes it with a
    /// fresh request id, and resolves with the fields of the first
    /// `Requesting.respond` carrying that id (minus the id itself).
    #[instrument(skip(self, fields), fields(path = tracing::field::Empty))]
    pub async fn request(&self, fields: Record) -> std::result::Result<Record, RequestError> {
        if let Some(Value::String(path)) = fields.get("path") {
            tracing::Span::current().record("path", path.as_str());
        }

        let (request, rx) = self.core.requesting.open();
        let id = self.core.log.append(REQUESTING, "request", fields);
        let output = Output::success(Record::from([(
            REQUEST_FIELD.to_string(),
            Value::String(request.clone()),
        )]));
        if let Err(err) = self.core.log.complete(id, output) {
            self.core.requesting.cancel(&request);
            return Err(err.into());
        }

        let timeout = self.core.config.request_timeout();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                info!(%request, invocation = %id, "request answered");
                Ok(response)
            }
            Ok(Err(_)) => Err(RequestError::Dropped(request)),
            Err(_) => {
                self.core.requesting.cancel(&request);
                warn!(%request, invocation = %id, "request timed out");
                Err(RequestError::Timeout {
                    request,
                    millis: self.core.config.request_timeout_ms,
                })
            }
        }
    }

    /// Invoke an action from outside any rule, as a causal root.
    ///
    /// The invocation is logged and completed like any other, so rules
    /// observing it fire as usual. An action the concept does not declare is
    /// rejected before anything is logged. An invalid output is returned as
    /// an error after the invocation completes with it as its error.
    pub async fn invoke(
        &self,
        concept: &str,
        action: &str,
        input: Record,
    ) -> Result<(InvocationId, Output)> {
        let target = self
            .core
            .concepts
            .get(concept)
            .cloned()
            .ok_or_else(|| EngineError::UnknownConcept(concept.to_string()))?;
        if !self.core.concepts.has_action(concept, action) {
            return Err(EngineError::UnknownAction {
                concept: concept.to_string(),
                action: action.to_string(),
            });
        }

        let id = self.core.log.append(concept, action, input.clone());
        let output = target.perform(action, input).await;
        self.core.finish(id, output.clone())?;
        Ok((id, output))
    }

    /// Wait until no log event is queued and no dispatched action is running
    pub async fn settled(&self) {
        self.core.activity.settled().await;
    }

    /// Snapshot of engine counters
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            evicted: self.core.log.evicted_count(),
            pending_invocations: self.core.log.pending_count(),
            pending_requests: self.core.requesting.pending(),
            firings_tracked: self.core.firings.len(),
            ..self.core.stats.snapshot()
        }
    }

    /// Read access to the invocation log
    pub fn log(&self) -> &InvocationLog {
        &self.core.log
    }

    pub fn concepts(&self) -> &ConceptRegistry {
        &self.core.concepts
    }

    pub fn rules(&self) -> &[Rule] {
        &self.core.rules
    }

    pub fn graph(&self) -> &RuleGraph {
        &self.core.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }
}
