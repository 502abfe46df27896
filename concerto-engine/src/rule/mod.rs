//! Synchronization rules
//!
//! A rule is `when` (a conjunction of action patterns), `where` (an ordered
//! list of steps that refine the candidate frames) and `then` (the actions to
//! invoke once per surviving frame).
//!
//! Rules can be built in code:
//!
//! ```
//! use concerto_engine::pattern::Pattern;
//! use concerto_engine::rule::{ActionTemplate, Rule};
//! use concerto_engine::types::{lit, var};
//!
//! let rule = Rule::named("RemoveFriendRequest")
//!     .when(
//!         Pattern::on("Requesting", "request")
//!             .input("path", lit("/Friends/removeFriend"))
//!             .input("friend", var("friend"))
//!             .output("request", var("request")),
//!     )
//!     .then(ActionTemplate::on("Friends", "removeFriend").input("friend", var("friend")));
//! assert_eq!(rule.when.len(), 1);
//! ```
//!
//! or loaded from YAML with [`RuleFile`].

mod file;
mod graph;
mod validate;

pub use file::{ConceptSpec, RuleFile};
pub use graph::{RuleGraph, RuleNode};
pub use validate::{validate, Validation};

use crate::pattern::{Pattern, Shape};
use crate::types::{ActionRef, Term, Var};
use crate::where_step::WhereStep;
use serde::Deserialize;

/// An action to invoke, with its input written in terms of frame variables
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionTemplate {
    #[serde(rename = "action")]
    pub target: ActionRef,
    #[serde(default)]
    pub input: Shape,
}

impl ActionTemplate {
    pub fn on(concept: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target: ActionRef::new(concept, action),
            input: Shape::new(),
        }
    }

    /// Set an input field
    pub fn input(mut self, field: impl Into<String>, term: impl Into<Term>) -> Self {
        self.input.insert(field.into(), term.into());
        self
    }

    /// Variables the template reads
    pub fn variables(&self) -> impl Iterator<Item = &Var> {
        self.input.values().filter_map(Term::as_var)
    }
}

/// A synchronization rule
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub name: String,
    pub when: Vec<Pattern>,
    #[serde(default, rename = "where")]
    pub where_steps: Vec<WhereStep>,
    #[serde(default)]
    pub then: Vec<ActionTemplate>,
}

impl Rule {
    /// Start a rule with no clauses
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            when: Vec::new(),
            where_steps: Vec::new(),
            then: Vec::new(),
        }
    }

    /// Add a when clause
    pub fn when(mut self, pattern: Pattern) -> Self {
        self.when.push(pattern);
        self
    }

    /// Add a where step
    pub fn where_step(mut self, step: impl Into<WhereStep>) -> Self {
        self.where_steps.push(step.into());
        self
    }

    /// Add a then action
    pub fn then(mut self, template: ActionTemplate) -> Self {
        self.then.push(template);
        self
    }

    /// Check if any when clause is on `concept.action`
    pub fn triggered_by(&self, concept: &str, action: &str) -> bool {
        self.when
            .iter()
            .any(|p| p.target.concept == concept && p.target.name == action)
    }
}
