//! Declarative frame filters

use crate::frame::Frame;
use crate::types::{Term, Var};
use serde::Deserialize;
use serde_json::Value;

/// One side of a comparison
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// A field path into an object bound to `var`; numeric segments index arrays
    Field { var: Var, path: Vec<String> },
    /// A literal or a variable
    Term(Term),
}

impl Operand {
    /// A path into the value bound to `var`
    pub fn field<I, S>(var: impl AsRef<str>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Operand::Field {
            var: Var::new(var),
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    fn resolve<'a>(&'a self, frame: &'a Frame) -> Option<&'a Value> {
        match self {
            Operand::Term(term) => frame.resolve(term),
            Operand::Field { var, path } => path
                .iter()
                .try_fold(frame.get(var)?, |value, segment| match value {
                    Value::Object(map) => map.get(segment),
                    Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                    _ => None,
                }),
        }
    }

    fn var(&self) -> Option<&Var> {
        match self {
            Operand::Term(term) => term.as_var(),
            Operand::Field { var, .. } => Some(var),
        }
    }
}

impl From<Term> for Operand {
    fn from(term: Term) -> Self {
        Operand::Term(term)
    }
}

/// A condition a frame must satisfy to survive a filter step.
///
/// Comparisons involving an operand the frame cannot resolve are false, for
/// both `Eq` and `Ne`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Eq(Operand, Operand),
    Ne(Operand, Operand),
    Any(Vec<Predicate>),
    All(Vec<Predicate>),
    Not(Box<Predicate>),
    /// The variable has a value
    Bound(Var),
}

impl Predicate {
    pub fn eq(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Predicate::Eq(left.into(), right.into())
    }

    pub fn ne(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Predicate::Ne(left.into(), right.into())
    }

    pub fn negate(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    pub fn bound(var: impl AsRef<str>) -> Self {
        Predicate::Bound(Var::new(var))
    }

    /// Evaluate against one frame
    pub fn holds(&self, frame: &Frame) -> bool {
        match self {
            Predicate::Eq(left, right) => match (left.resolve(frame), right.resolve(frame)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            Predicate::Ne(left, right) => match (left.resolve(frame), right.resolve(frame)) {
                (Some(a), Some(b)) => a != b,
                _ => false,
            },
            Predicate::Any(preds) => preds.iter().any(|p| p.holds(frame)),
            Predicate::All(preds) => preds.iter().all(|p| p.holds(frame)),
            Predicate::Not(inner) => !inner.holds(frame),
            Predicate::Bound(var) => frame.is_bound(var),
        }
    }

    /// Variables the predicate compares, which must be bound before it runs.
    /// Variables only tested with `Bound` are not included.
    pub fn compared_variables(&self) -> Vec<&Var> {
        let mut vars = Vec::new();
        self.collect_compared(&mut vars);
        vars
    }

    fn collect_compared<'a>(&'a self, out: &mut Vec<&'a Var>) {
        match self {
            Predicate::Eq(left, right) | Predicate::Ne(left, right) => {
                out.extend(left.var());
                out.extend(right.var());
            }
            Predicate::Any(preds) | Predicate::All(preds) => {
                preds.iter().for_each(|p| p.collect_compared(out));
            }
            Predicate::Not(inner) => inner.collect_compared(out),
            Predicate::Bound(_) => {}
        }
    }
}
