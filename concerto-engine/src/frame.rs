//! Frames and frame sets
//!
//! A frame is one consistent set of variable bindings produced while
//! evaluating a rule. Frames also remember which invocations the rule's when
//! clauses matched, which is what the dispatcher uses to fire a rule at most
//! once per match.

use crate::pattern::Shape;
use crate::types::{InvocationId, Record, Term, Var};
use serde_json::Value;
use std::collections::BTreeMap;

/// One consistent variable-binding candidate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    bindings: BTreeMap<Var, Value>,
    matched: Vec<InvocationId>,
}

impl Frame {
    /// An empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// The value bound to `var`
    pub fn get(&self, var: &Var) -> Option<&Value> {
        self.bindings.get(var)
    }

    /// The value bound to the variable named `name`
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.bindings.get(&Var::new(name))
    }

    /// Check if `var` has a value
    pub fn is_bound(&self, var: &Var) -> bool {
        self.bindings.contains_key(var)
    }

    /// Unify `var` with `value`.
    ///
    /// Binds an unbound variable; for a bound one, succeeds only if the
    /// existing value is equal. Returns false on contradiction, in which case
    /// the frame must be dropped.
    pub fn unify(&mut self, var: &Var, value: &Value) -> bool {
        match self.bindings.get(var) {
            Some(existing) => existing == value,
            None => {
                self.bindings.insert(var.clone(), value.clone());
                true
            }
        }
    }

    /// Builder form of [`Frame::unify`]: `None` on contradiction
    pub fn with(mut self, var: &Var, value: &Value) -> Option<Self> {
        self.unify(var, value).then_some(self)
    }

    /// Resolve a term against this frame: literals as-is, variables by lookup
    pub fn resolve<'a>(&'a self, term: &'a Term) -> Option<&'a Value> {
        match term {
            Term::Lit(value) => Some(value),
            Term::Var(var) => self.bindings.get(var),
        }
    }

    /// Substitute bindings into `shape`, producing a concrete record.
    ///
    /// Fails with the first variable the frame has no value for.
    pub fn instantiate(&self, shape: &Shape) -> Result<Record, Var> {
        shape
            .iter()
            .map(|(field, term)| match self.resolve(term) {
                Some(value) => Ok((field.clone(), value.clone())),
                None => Err(term.as_var().cloned().unwrap_or_else(|| Var::new(field))),
            })
            .collect()
    }

    /// Iterate over all bindings in variable order
    pub fn bindings(&self) -> impl Iterator<Item = (&Var, &Value)> {
        self.bindings.iter()
    }

    /// Number of bound variables
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Invocations matched by the when clauses, in clause order
    pub fn matched(&self) -> &[InvocationId] {
        &self.matched
    }

    /// Check if the when clauses matched `id`
    pub fn involves(&self, id: InvocationId) -> bool {
        self.matched.contains(&id)
    }

    pub(crate) fn push_match(&mut self, id: InvocationId) {
        self.matched.push(id);
    }
}

/// An ordered sequence of frames
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSet {
    frames: Vec<Frame>,
}

impl FrameSet {
    /// The empty frame set: nothing matched
    pub fn empty() -> Self {
        Self::default()
    }

    /// A frame set holding one empty frame, the start of every join
    pub fn unit() -> Self {
        Self {
            frames: vec![Frame::new()],
        }
    }

    /// Append a frame
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Keep only frames satisfying `predicate`
    pub fn filter(self, mut predicate: impl FnMut(&Frame) -> bool) -> Self {
        self.frames.into_iter().filter(|f| predicate(f)).collect()
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if no frame survived
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterate over the frames in order
    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    /// The frames as a slice
    pub fn as_slice(&self) -> &[Frame] {
        &self.frames
    }
}

impl FromIterator<Frame> for FrameSet {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FrameSet {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl From<Vec<Frame>> for FrameSet {
    fn from(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{lit, var};

    #[test]
    fn test_unify_binds_then_checks() {
        let user = Var::new("user");
        let mut frame = Frame::new();

        assert!(frame.unify(&user, &Value::from("u1")));
        assert!(frame.unify(&user, &Value::from("u1")));
        assert!(!frame.unify(&user, &Value::from("u2")));
        assert_eq!(frame.get(&user), Some(&Value::from("u1")));
    }

    #[test]
    fn test_with_drops_on_contradiction() {
        let x = Var::new("x");
        let frame = Frame::new().with(&x, &Value::from(1)).unwrap();
        assert!(frame.clone().with(&x, &Value::from(2)).is_none());
        assert!(frame.with(&x, &Value::from(1)).is_some());
    }

    #[test]
    fn test_resolve() {
        let frame = Frame::new().with(&Var::new("a"), &Value::from(5)).unwrap();
        assert_eq!(frame.resolve(&var("a")), Some(&Value::from(5)));
        assert_eq!(frame.resolve(&lit("k")), Some(&Value::from("k")));
        assert_eq!(frame.resolve(&var("missing")), None);
    }

    #[test]
    fn test_instantiate() {
        let frame = Frame::new().with(&Var::new("user"), &Value::from("u1")).unwrap();
        let mut shape = Shape::new();
        shape.insert("user".to_string(), var("user"));
        shape.insert("kind".to_string(), lit("friend"));

        let record = frame.instantiate(&shape).unwrap();
        assert_eq!(record["user"], Value::from("u1"));
        assert_eq!(record["kind"], Value::from("friend"));

        shape.insert("other".to_string(), var("other"));
        assert_eq!(frame.instantiate(&shape), Err(Var::new("other")));
    }

    #[test]
    fn test_unit_and_empty() {
        assert_eq!(FrameSet::unit().len(), 1);
        assert!(FrameSet::empty().is_empty());
    }

    #[test]
    fn test_filter_keeps_order() {
        let n = Var::new("n");
        let set: FrameSet = (0..5)
            .map(|i| Frame::new().with(&n, &Value::from(i)).unwrap())
            .collect();
        let odd = set.filter(|f| f.get(&n).and_then(Value::as_i64).unwrap_or(0) % 2 == 1);
        let values: Vec<_> = odd.iter().map(|f| f.get(&n).cloned().unwrap()).collect();
        assert_eq!(values, vec![Value::from(1), Value::from(3)]);
    }
}
