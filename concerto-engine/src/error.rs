//! Error types for the concerto engine

use crate::config::ConfigError;
use crate::types::{InvocationId, Var};
use thiserror::Error;

/// Runtime engine errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// A log or output invariant was broken by the caller
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// An invocation id that the log does not hold
    #[error("unknown invocation {0}")]
    UnknownInvocation(InvocationId),

    /// A template or query input referenced a variable the frame never bound
    #[error("rule {rule}: variable {var} is not bound")]
    UnboundVariable { rule: String, var: Var },

    /// A then-action would extend a causal chain past the configured limit
    #[error("rule {rule}: chain depth {depth} exceeds limit {limit}")]
    ChainDepthExceeded {
        rule: String,
        depth: usize,
        limit: usize,
    },

    /// No concept with this name is registered
    #[error("unknown concept: {0}")]
    UnknownConcept(String),

    /// The concept exists but does not declare the action
    #[error("concept {concept} has no action {action}")]
    UnknownAction { concept: String, action: String },

    /// A custom where step failed; its frames are dropped
    #[error("rule {rule}: where step {step} failed: {reason}")]
    Where {
        rule: String,
        step: String,
        reason: String,
    },
}

/// Static rule defects detected at registration time
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    /// Two rules share a name
    #[error("duplicate rule name: {0}")]
    DuplicateRule(String),

    /// Two concepts share a name
    #[error("duplicate concept name: {0}")]
    DuplicateConcept(String),

    /// A rule without any when clause can never be triggered
    #[error("rule {0} has no when clauses")]
    EmptyWhen(String),

    /// Reference to a concept that is not registered
    #[error("rule {rule}: unknown concept {concept}")]
    UnknownConcept { rule: String, concept: String },

    /// Reference to an action the concept does not declare
    #[error("rule {rule}: concept {concept} has no action {action}")]
    UnknownAction {
        rule: String,
        concept: String,
        action: String,
    },

    /// Reference to a query the concept does not declare
    #[error("rule {rule}: concept {concept} has no query {query}")]
    UnknownQuery {
        rule: String,
        concept: String,
        query: String,
    },

    /// An output pattern naming `error` together with other fields never matches
    #[error("rule {rule}: output pattern on {concept}.{action} mixes error with other fields")]
    MixedOutputPattern {
        rule: String,
        concept: String,
        action: String,
    },

    /// A variable is used before any clause or step binds it
    #[error("rule {rule}: variable {var} is used in {site} but never bound before it")]
    UnboundVariable { rule: String, var: Var, site: String },

    /// The rule graph contains a cycle and strict checking is enabled
    #[error("rule graph contains a cycle through {0}")]
    Cycle(String),
}

/// Errors observed by a caller waiting for a response
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    /// No respond action arrived in time
    #[error("request {request} timed out after {millis}ms")]
    Timeout { request: String, millis: u64 },

    /// The engine shut down before responding
    #[error("request {0} was dropped before a response arrived")]
    Dropped(String),

    /// The request could not be recorded
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Reasons an engine cannot be started
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rules(#[from] RuleError),
}

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type using RuleError
pub type RuleResult<T> = std::result::Result<T, RuleError>;
