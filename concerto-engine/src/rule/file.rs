//! YAML rule files
//!
//! A rule file carries the rules and a catalog of the concepts they are
//! written against, so it can be checked without the concepts themselves:
//!
//! ```yaml
//! concepts:
//!   - name: Friends
//!     actions: [removeFriend]
//!     queries: [_getFriends]
//! rules:
//!   - name: RemoveFriendRequest
//!     when:
//!       - action: Requesting/request
//!         input: { path: /Friends/removeFriend, friend: "?friend" }
//!         output: { request: "?request" }
//!     then:
//!       - action: Friends/removeFriend
//!         input: { friend: "?friend", request: "?request" }
//! ```
//!
//! The built-in `Requesting` concept is always part of the catalog.

use super::{validate, Rule, Validation};
use crate::concept::{ConceptCatalog, REQUESTING};
use crate::config::ConfigError;
use crate::error::RuleResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Declared surface of one concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSpec {
    pub name: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub queries: Vec<String>,
}

impl ConceptSpec {
    pub fn new<A, Q>(name: impl Into<String>, actions: A, queries: Q) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        Q: IntoIterator,
        Q::Item: Into<String>,
    {
        Self {
            name: name.into(),
            actions: actions.into_iter().map(Into::into).collect(),
            queries: queries.into_iter().map(Into::into).collect(),
        }
    }

    fn requesting() -> Self {
        Self::new(REQUESTING, ["request", "respond"], Vec::<String>::new())
    }
}

/// A concept catalog plus the rules written against it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub concepts: Vec<ConceptSpec>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleFile {
    /// Parse a rule file from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Read and parse a rule file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Validate the rules against this file's own catalog
    pub fn validate(&self, strict_acyclic: bool) -> RuleResult<Validation> {
        validate(&self.rules, self, strict_acyclic)
    }

    fn concept(&self, name: &str) -> Option<ConceptSpec> {
        self.concepts
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .or_else(|| (name == REQUESTING).then(ConceptSpec::requesting))
    }
}

impl ConceptCatalog for RuleFile {
    fn has_concept(&self, concept: &str) -> bool {
        self.concept(concept).is_some()
    }

    fn has_action(&self, concept: &str, action: &str) -> bool {
        self.concept(concept)
            .is_some_and(|c| c.actions.iter().any(|a| a == action))
    }

    fn has_query(&self, concept: &str, query: &str) -> bool {
        self.concept(concept)
            .is_some_and(|c| c.queries.iter().any(|q| q == query))
    }
}
