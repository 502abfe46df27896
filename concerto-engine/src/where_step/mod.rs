//! The where phase of a rule
//!
//! Where steps run in order between matching and firing. Each takes the
//! frame set produced so far and returns a new one:
//! - `Query`: one output frame per returned row (row-oriented expansion)
//! - `Collect`: one output frame per input frame, with the rows gathered into
//!   a single array-valued variable
//! - `Filter`: frames that fail a [`Predicate`] are dropped
//! - `Custom`: an arbitrary async [`FrameTransform`]
//!
//! Once the frame set is empty no further step runs, so no query is issued.

mod predicate;

pub use predicate::{Operand, Predicate};

use crate::concept::ConceptRegistry;
use crate::error::{EngineError, Result};
use crate::frame::{Frame, FrameSet};
use crate::pattern::Shape;
use crate::types::{ActionRef, Record, Term, Var};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Row-oriented query expansion
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryStep {
    #[serde(rename = "query")]
    pub target: ActionRef,
    #[serde(default)]
    pub input: Shape,
    /// Row field → variable it unifies with
    #[serde(default)]
    pub output: BTreeMap<String, Var>,
}

impl QueryStep {
    pub fn new(concept: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            target: ActionRef::new(concept, query),
            input: Shape::new(),
            output: BTreeMap::new(),
        }
    }

    /// Pass a query argument
    pub fn input(mut self, field: impl Into<String>, term: impl Into<Term>) -> Self {
        self.input.insert(field.into(), term.into());
        self
    }

    /// Unify row field `field` with the variable `var`
    pub fn bind(mut self, field: impl Into<String>, var: impl AsRef<str>) -> Self {
        self.output.insert(field.into(), Var::new(var));
        self
    }

    async fn expand(&self, rule: &str, frame: Frame, concepts: &ConceptRegistry) -> Vec<Frame> {
        let Some(input) = instantiate_input(rule, &frame, &self.input) else {
            return Vec::new();
        };

        match concepts.query(&self.target, input).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| {
                    self.output
                        .iter()
                        .try_fold(frame.clone(), |frame, (field, var)| {
                            frame.with(var, row.get(field)?)
                        })
                })
                .collect(),
            Err(message) => {
                warn!(rule, query = %self.target, %message, "query failed, dropping frame");
                Vec::new()
            }
        }
    }
}

/// Aggregate-oriented query: all rows land in one variable
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CollectStep {
    #[serde(rename = "query")]
    pub target: ActionRef,
    #[serde(default)]
    pub input: Shape,
    /// Variable bound to the array of collected values
    pub into: Var,
    /// Collect only this field of each row instead of the whole row
    #[serde(default)]
    pub field: Option<String>,
}

impl CollectStep {
    pub fn new(concept: impl Into<String>, query: impl Into<String>, into: impl AsRef<str>) -> Self {
        Self {
            target: ActionRef::new(concept, query),
            input: Shape::new(),
            into: Var::new(into),
            field: None,
        }
    }

    /// Pass a query argument
    pub fn input(mut self, field: impl Into<String>, term: impl Into<Term>) -> Self {
        self.input.insert(field.into(), term.into());
        self
    }

    /// Collect `field` of each row; rows without it are skipped
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    async fn gather(&self, rule: &str, frame: Frame, concepts: &ConceptRegistry) -> Option<Frame> {
        let input = instantiate_input(rule, &frame, &self.input)?;

        let rows = match concepts.query(&self.target, input).await {
            Ok(rows) => rows,
            Err(message) => {
                warn!(rule, query = %self.target, %message, "query failed, dropping frame");
                return None;
            }
        };

        let values: Vec<Value> = rows
            .into_iter()
            .filter_map(|row| match &self.field {
                Some(field) => row.get(field).cloned(),
                None => Some(Value::Object(row.into_iter().collect())),
            })
            .collect();
        frame.with(&self.into, &Value::Array(values))
    }
}

/// An arbitrary frame-set transformation.
///
/// `binds` must list every variable the transform adds to its output frames;
/// later steps and templates may use those variables, and frames missing any
/// of them are dropped.
#[async_trait]
pub trait FrameTransform: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Variables bound by this transform
    fn binds(&self) -> Vec<Var> {
        Vec::new()
    }

    async fn apply(&self, frames: FrameSet, concepts: &ConceptRegistry) -> Result<FrameSet>;
}

/// One step of a rule's where clause
#[derive(Clone)]
pub enum WhereStep {
    Query(QueryStep),
    Collect(CollectStep),
    Filter(Predicate),
    Custom(Arc<dyn FrameTransform>),
}

impl WhereStep {
    /// Wrap a custom transform
    pub fn custom(transform: impl FrameTransform + 'static) -> Self {
        WhereStep::Custom(Arc::new(transform))
    }

    /// The query this step calls, if any
    pub fn query_target(&self) -> Option<&ActionRef> {
        match self {
            WhereStep::Query(step) => Some(&step.target),
            WhereStep::Collect(step) => Some(&step.target),
            WhereStep::Filter(_) | WhereStep::Custom(_) => None,
        }
    }

    /// Variables that must already be bound when this step runs
    pub fn uses(&self) -> Vec<&Var> {
        match self {
            WhereStep::Query(QueryStep { input, .. }) | WhereStep::Collect(CollectStep { input, .. }) => {
                input.values().filter_map(Term::as_var).collect()
            }
            WhereStep::Filter(predicate) => predicate.compared_variables(),
            WhereStep::Custom(_) => Vec::new(),
        }
    }

    /// Variables this step binds for the steps after it
    pub fn binds(&self) -> Vec<Var> {
        match self {
            WhereStep::Query(step) => step.output.values().cloned().collect(),
            WhereStep::Collect(step) => vec![step.into.clone()],
            WhereStep::Filter(_) => Vec::new(),
            WhereStep::Custom(transform) => transform.binds(),
        }
    }

    fn label(&self) -> String {
        match self {
            WhereStep::Query(step) => format!("query {}", step.target),
            WhereStep::Collect(step) => format!("collect {}", step.target),
            WhereStep::Filter(_) => "filter".to_string(),
            WhereStep::Custom(transform) => format!("custom {}", transform.name()),
        }
    }

    async fn apply(&self, rule: &str, frames: FrameSet, concepts: &ConceptRegistry) -> FrameSet {
        match self {
            WhereStep::Query(step) => join_all(
                frames
                    .into_iter()
                    .map(|frame| step.expand(rule, frame, concepts)),
            )
            .await
            .into_iter()
            .flatten()
            .collect(),

            WhereStep::Collect(step) => join_all(
                frames
                    .into_iter()
                    .map(|frame| step.gather(rule, frame, concepts)),
            )
            .await
            .into_iter()
            .flatten()
            .collect(),

            WhereStep::Filter(predicate) => frames.filter(|frame| predicate.holds(frame)),

            WhereStep::Custom(transform) => match transform.apply(frames, concepts).await {
                Ok(output) => {
                    let declared = transform.binds();
                    output.filter(|frame| match declared.iter().find(|var| !frame.is_bound(var)) {
                        Some(var) => {
                            let err = EngineError::UnboundVariable {
                                rule: rule.to_string(),
                                var: var.clone(),
                            };
                            error!(transform = transform.name(), %err, "dropping frame");
                            false
                        }
                        None => true,
                    })
                }
                Err(err) => {
                    let err = step_failure(rule, transform.name(), &err);
                    error!(%err, "dropping frames");
                    FrameSet::empty()
                }
            },
        }
    }
}

fn step_failure(rule: &str, step: &str, err: &EngineError) -> EngineError {
    EngineError::Where {
        rule: rule.to_string(),
        step: step.to_string(),
        reason: err.to_string(),
    }
}

impl From<QueryStep> for WhereStep {
    fn from(step: QueryStep) -> Self {
        WhereStep::Query(step)
    }
}

impl From<CollectStep> for WhereStep {
    fn from(step: CollectStep) -> Self {
        WhereStep::Collect(step)
    }
}

impl From<Predicate> for WhereStep {
    fn from(predicate: Predicate) -> Self {
        WhereStep::Filter(predicate)
    }
}

impl fmt::Debug for WhereStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhereStep::Query(step) => f.debug_tuple("Query").field(step).finish(),
            WhereStep::Collect(step) => f.debug_tuple("Collect").field(step).finish(),
            WhereStep::Filter(predicate) => f.debug_tuple("Filter").field(predicate).finish(),
            WhereStep::Custom(transform) => f.debug_tuple("Custom").field(&transform.name()).finish(),
        }
    }
}

/// Steps a rule file can express; custom transforms exist only in code.
#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum DeclaredStep {
    Query(QueryStep),
    Collect(CollectStep),
    Filter(Predicate),
}

impl<'de> Deserialize<'de> for WhereStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match DeclaredStep::deserialize(deserializer)? {
            DeclaredStep::Query(step) => WhereStep::Query(step),
            DeclaredStep::Collect(step) => WhereStep::Collect(step),
            DeclaredStep::Filter(predicate) => WhereStep::Filter(predicate),
        })
    }
}

fn instantiate_input(rule: &str, frame: &Frame, shape: &Shape) -> Option<Record> {
    match frame.instantiate(shape) {
        Ok(input) => Some(input),
        Err(var) => {
            let err = EngineError::UnboundVariable {
                rule: rule.to_string(),
                var,
            };
            error!(%err, "dropping frame");
            None
        }
    }
}

/// Run `steps` over `frames` in order.
pub async fn run(
    rule: &str,
    steps: &[WhereStep],
    mut frames: FrameSet,
    concepts: &ConceptRegistry,
) -> FrameSet {
    for step in steps {
        if frames.is_empty() {
            break;
        }
        let before = frames.len();
        frames = step.apply(rule, frames, concepts).await;
        debug!(rule, step = %step.label(), before, after = frames.len(), "where step applied");
    }
    frames
}
