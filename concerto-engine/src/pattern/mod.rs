//! Action patterns
//!
//! A pattern describes one clause of a rule's when conjunction: a concept
//! action plus partial input and output shapes whose fields are literals or
//! variables. This module provides:
//! - `Pattern`: the clause itself, buildable in code or loaded from YAML
//! - `match_invocation`: unification of one clause against one invocation
//! - `join`: the left-to-right nested-loop join over the log

mod unify;

pub use unify::{join, match_invocation};

use crate::types::{ActionRef, Term, Var, ERROR_FIELD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name → term
pub type Shape = BTreeMap<String, Term>;

/// One when clause: `(concept, action, input shape?, output shape?)`.
///
/// A missing input shape places no constraint on the input. A missing output
/// shape places no constraint on the output and matches pending invocations
/// too; any output shape requires the invocation to have completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(rename = "action")]
    pub target: ActionRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Shape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Shape>,
}

impl Pattern {
    /// A pattern on `concept.action` with no constraints yet
    pub fn on(concept: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target: ActionRef::new(concept, action),
            input: None,
            output: None,
        }
    }

    /// Constrain an input field
    pub fn input(mut self, field: impl Into<String>, term: impl Into<Term>) -> Self {
        self.input
            .get_or_insert_with(Shape::new)
            .insert(field.into(), term.into());
        self
    }

    /// Constrain an output field; implies the invocation has completed
    pub fn output(mut self, field: impl Into<String>, term: impl Into<Term>) -> Self {
        self.output
            .get_or_insert_with(Shape::new)
            .insert(field.into(), term.into());
        self
    }

    /// Match only completed invocations with the success shape
    pub fn succeeded(mut self) -> Self {
        self.output.get_or_insert_with(Shape::new);
        self
    }

    /// Match only completed invocations with the error shape, binding the message
    pub fn failed(self, term: impl Into<Term>) -> Self {
        self.output(ERROR_FIELD, term)
    }

    /// Check if the output shape asks for the error shape
    pub fn matches_errors(&self) -> bool {
        self.output
            .as_ref()
            .is_some_and(|shape| shape.contains_key(ERROR_FIELD))
    }

    /// Check if the output shape names `error` together with other fields
    pub fn is_mixed_output(&self) -> bool {
        self.output
            .as_ref()
            .is_some_and(|shape| shape.contains_key(ERROR_FIELD) && shape.len() > 1)
    }

    /// Every variable mentioned by this clause
    pub fn variables(&self) -> impl Iterator<Item = &Var> {
        self.input
            .iter()
            .chain(self.output.iter())
            .flat_map(|shape| shape.values())
            .filter_map(Term::as_var)
    }
}
