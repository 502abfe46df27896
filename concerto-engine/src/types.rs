//! Core type definitions for the concerto engine
//!
//! These are the foundational identity, value and term types shared by the
//! log, the matcher and the rule layer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A field map: the input or output of an action, or one row of a query result.
pub type Record = BTreeMap<String, Value>;

/// Name of the field that marks the error shape of an action output.
pub const ERROR_FIELD: &str = "error";

/// Build a [`Record`] from `key => value` pairs.
///
/// ```
/// use concerto_engine::record;
///
/// let input = record! { "path" => "/Friends/removeFriend", "limit" => 3 };
/// assert_eq!(input.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $(
            record.insert(($key).to_string(), $crate::serde_json::Value::from($value));
        )+
        record
    }};
}

/// Invocation identifier
///
/// Identifiers are allocated by the log from a strictly increasing counter,
/// so comparing two ids compares their creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvocationId(pub u64);

impl InvocationId {
    /// The raw sequence number
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inv:{}", self.0)
    }
}

/// A reference to a named action or query of a concept.
///
/// Written `Concept/name` in rule files and displayed as `Concept.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionRef {
    pub concept: String,
    pub name: String,
}

impl ActionRef {
    pub fn new(concept: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.concept, self.name)
    }
}

impl Serialize for ActionRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}/{}", self.concept, self.name))
    }
}

impl<'de> Deserialize<'de> for ActionRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.split_once('/') {
            Some((concept, name)) if !concept.is_empty() && !name.is_empty() => {
                Ok(ActionRef::new(concept, name))
            }
            _ => Err(serde::de::Error::custom(format!(
                "expected Concept/name, got {raw}"
            ))),
        }
    }
}

/// A logical variable used inside patterns, where steps and templates.
///
/// Variables are written `?name` in rule files and displayed the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(Arc<str>);

impl Var {
    /// Create a variable with the given name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The variable name, without the leading `?`
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

impl Serialize for Var {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Var {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let name = raw.strip_prefix('?').unwrap_or(&raw);
        if !is_var_name(name) {
            return Err(serde::de::Error::custom(format!(
                "invalid variable name: {raw}"
            )));
        }
        Ok(Var::new(name))
    }
}

fn is_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// The value of one field in a pattern or action template.
///
/// In rule files a string of the form `?name` is a variable. Any other value
/// is a literal; a literal string that itself starts with `?` is written with
/// a doubled prefix (`??raw`).
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// A concrete value that must match exactly
    Lit(Value),
    /// A variable that binds or is checked against the frame
    Var(Var),
}

impl Term {
    /// The variable, if this term is one
    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Term::Var(var) => Some(var),
            Term::Lit(_) => None,
        }
    }
}

/// Shorthand for a variable term
pub fn var(name: impl AsRef<str>) -> Term {
    Term::Var(Var::new(name))
}

/// Shorthand for a literal term
pub fn lit(value: impl Into<Value>) -> Term {
    Term::Lit(value.into())
}

impl From<Var> for Term {
    fn from(var: Var) -> Self {
        Term::Var(var)
    }
}

impl Serialize for Term {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Term::Var(var) => var.serialize(serializer),
            Term::Lit(Value::String(s)) if s.starts_with('?') => {
                serializer.serialize_str(&format!("?{s}"))
            }
            Term::Lit(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Term {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) if s.starts_with("??") => Ok(Term::Lit(Value::String(s[1..].to_string()))),
            Value::String(s) if s.starts_with('?') => {
                let name = &s[1..];
                if !is_var_name(name) {
                    return Err(serde::de::Error::custom(format!(
                        "invalid variable name: {s}"
                    )));
                }
                Ok(Term::Var(Var::new(name)))
            }
            other => Ok(Term::Lit(other)),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(var) => write!(f, "{var}"),
            Term::Lit(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_id_ordering() {
        assert!(InvocationId(1) < InvocationId(2));
        assert_eq!(InvocationId(7).to_string(), "inv:7");
    }

    #[test]
    fn test_var_display() {
        assert_eq!(Var::new("user").to_string(), "?user");
    }

    #[test]
    fn test_term_from_yaml() {
        let term: Term = serde_yaml::from_str("\"?session\"").unwrap();
        assert_eq!(term, var("session"));

        let term: Term = serde_yaml::from_str("\"/Friends/removeFriend\"").unwrap();
        assert_eq!(term, lit("/Friends/removeFriend"));

        let term: Term = serde_yaml::from_str("\"??raw\"").unwrap();
        assert_eq!(term, lit("?raw"));

        let term: Term = serde_yaml::from_str("3").unwrap();
        assert_eq!(term, lit(3));
    }

    #[test]
    fn test_action_ref_yaml() {
        let target: ActionRef = serde_yaml::from_str("Sessioning/_getUser").unwrap();
        assert_eq!(target, ActionRef::new("Sessioning", "_getUser"));
        assert_eq!(target.to_string(), "Sessioning._getUser");
        assert!(serde_yaml::from_str::<ActionRef>("Sessioning").is_err());
    }

    #[test]
    fn test_term_rejects_bad_var() {
        assert!(serde_yaml::from_str::<Term>("\"?1abc\"").is_err());
    }

    #[test]
    fn test_record_macro() {
        let r = record! { "a" => 1, "b" => "two", "c" => true };
        assert_eq!(r["a"], Value::from(1));
        assert_eq!(r["b"], Value::from("two"));
        assert_eq!(r["c"], Value::Bool(true));
    }
}
