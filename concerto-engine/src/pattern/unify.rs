//! Unification of action patterns against logged invocations

use super::{Pattern, Shape};
use crate::frame::{Frame, FrameSet};
use crate::log::{Invocation, InvocationLog, Output};
use crate::types::{Record, Term, ERROR_FIELD};
use serde_json::Value;
use std::sync::Arc;

fn unify_term(frame: &mut Frame, term: &Term, value: &Value) -> bool {
    match term {
        Term::Lit(expected) => expected == value,
        Term::Var(var) => frame.unify(var, value),
    }
}

/// Unify every field of `shape` with the same-named field of `record`.
/// A field the record lacks is a mismatch; fields the shape omits are ignored.
fn unify_shape(frame: &mut Frame, shape: &Shape, record: &Record) -> bool {
    shape.iter().all(|(field, term)| {
        record
            .get(field)
            .is_some_and(|value| unify_term(frame, term, value))
    })
}

fn unify_output(frame: &mut Frame, shape: &Shape, output: &Output) -> bool {
    match (shape.get(ERROR_FIELD), output) {
        (Some(term), Output::Error(message)) => {
            shape.len() == 1 && unify_term(frame, term, &Value::String(message.clone()))
        }
        (None, Output::Success(fields)) => unify_shape(frame, shape, fields),
        _ => false,
    }
}

/// Unify one clause with one invocation under `frame`.
///
/// Returns the refined frame, with the invocation recorded in its match
/// list, or `None` if the invocation does not satisfy the clause.
pub fn match_invocation(pattern: &Pattern, invocation: &Invocation, frame: &Frame) -> Option<Frame> {
    if !invocation.is(&pattern.target.concept, &pattern.target.name) {
        return None;
    }

    let mut refined = frame.clone();

    if let Some(shape) = &pattern.input {
        if !unify_shape(&mut refined, shape, &invocation.input) {
            return None;
        }
    }

    if let Some(shape) = &pattern.output {
        let output = invocation.output.as_ref()?;
        if !unify_output(&mut refined, shape, output) {
            return None;
        }
    }

    refined.push_match(invocation.id);
    Some(refined)
}

/// Evaluate a when conjunction against the log.
///
/// Starts from one empty frame and, clause by clause, extends every frame
/// with every invocation the clause unifies with. The first clause that
/// yields nothing makes the whole result empty.
pub fn join(clauses: &[Pattern], log: &InvocationLog) -> FrameSet {
    let mut frames = FrameSet::unit();

    for clause in clauses {
        let candidates: Vec<Arc<Invocation>> = log
            .scan(&clause.target.concept, &clause.target.name)
            .collect();

        let next: FrameSet = frames
            .iter()
            .flat_map(|frame| {
                candidates
                    .iter()
                    .filter_map(move |invocation| match_invocation(clause, invocation, frame))
            })
            .collect();

        if next.is_empty() {
            return next;
        }
        frames = next;
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::types::{lit, var, InvocationId, Var};
    use chrono::Utc;
    use proptest::prelude::*;

    fn invocation(concept: &str, action: &str, input: Record, output: Option<Output>) -> Invocation {
        Invocation {
            id: InvocationId(1),
            concept: concept.to_string(),
            action: action.to_string(),
            input,
            output,
            cause: None,
            root: InvocationId(1),
            depth: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_rejects_other_action() {
        let pattern = Pattern::on("Friends", "removeFriend");
        let inv = invocation("Friends", "sendFriendRequest", Record::new(), None);
        assert!(match_invocation(&pattern, &inv, &Frame::new()).is_none());
    }

    #[test]
    fn test_input_binds_on_pending() {
        let pattern = Pattern::on("Requesting", "request")
            .input("path", lit("/Post/create"))
            .input("content", var("content"));
        let inv = invocation(
            "Requesting",
            "request",
            record! { "path" => "/Post/create", "content" => "hi", "timestamp" => 3 },
            None,
        );

        let frame = match_invocation(&pattern, &inv, &Frame::new()).unwrap();
        assert_eq!(frame.get_named("content"), Some(&Value::from("hi")));
        assert_eq!(frame.matched(), &[InvocationId(1)]);
    }

    #[test]
    fn test_literal_mismatch() {
        let pattern = Pattern::on("Requesting", "request").input("path", lit("/Post/delete"));
        let inv = invocation("Requesting", "request", record! { "path" => "/Post/create" }, None);
        assert!(match_invocation(&pattern, &inv, &Frame::new()).is_none());
    }

    #[test]
    fn test_missing_input_field_does_not_match() {
        let pattern = Pattern::on("Ranking", "addComparison").input("songB", var("songB"));
        let inv = invocation("Ranking", "addComparison", record! { "songA" => "s1" }, None);
        assert!(match_invocation(&pattern, &inv, &Frame::new()).is_none());
    }

    #[test]
    fn test_partial_projection_ignores_unmentioned_fields() {
        let pattern = Pattern::on("Post", "create").output("post", var("post"));
        for extra in ["a", "b", "c"] {
            let inv = invocation(
                "Post",
                "create",
                Record::new(),
                Some(Output::success(record! { "post" => "p1", "noise" => extra })),
            );
            let frame = match_invocation(&pattern, &inv, &Frame::new()).unwrap();
            assert_eq!(frame.get_named("post"), Some(&Value::from("p1")));
            assert_eq!(frame.len(), 1);
        }
    }

    #[test]
    fn test_output_requires_completion() {
        let pattern = Pattern::on("Post", "create").succeeded();
        let pending = invocation("Post", "create", Record::new(), None);
        assert!(match_invocation(&pattern, &pending, &Frame::new()).is_none());

        let done = invocation("Post", "create", Record::new(), Some(Output::empty()));
        assert!(match_invocation(&pattern, &done, &Frame::new()).is_some());
    }

    #[test]
    fn test_success_and_error_patterns_are_disjoint() {
        let on_success = Pattern::on("Post", "create").output("post", var("post"));
        let on_error = Pattern::on("Post", "create").failed(var("error"));
        let on_empty = Pattern::on("Post", "create").succeeded();

        let ok = invocation(
            "Post",
            "create",
            Record::new(),
            Some(Output::success(record! { "post" => "p1" })),
        );
        let failed = invocation("Post", "create", Record::new(), Some(Output::error("too long")));

        assert!(match_invocation(&on_success, &ok, &Frame::new()).is_some());
        assert!(match_invocation(&on_error, &ok, &Frame::new()).is_none());
        assert!(match_invocation(&on_empty, &ok, &Frame::new()).is_some());

        assert!(match_invocation(&on_success, &failed, &Frame::new()).is_none());
        assert!(match_invocation(&on_empty, &failed, &Frame::new()).is_none());
        let frame = match_invocation(&on_error, &failed, &Frame::new()).unwrap();
        assert_eq!(frame.get_named("error"), Some(&Value::from("too long")));
    }

    #[test]
    fn test_bound_variable_must_agree() {
        let user = Var::new("user");
        let frame = Frame::new().with(&user, &Value::from("u1")).unwrap();
        let pattern = Pattern::on("Sessioning", "create").input("user", var("user"));

        let same = invocation("Sessioning", "create", record! { "user" => "u1" }, None);
        let other = invocation("Sessioning", "create", record! { "user" => "u2" }, None);

        assert!(match_invocation(&pattern, &same, &frame).is_some());
        assert!(match_invocation(&pattern, &other, &frame).is_none());
    }

    #[test]
    fn test_join_over_log() {
        let log = InvocationLog::new();
        let r1 = log.append("Requesting", "request", record! { "path" => "/a" });
        log.complete(r1, Output::success(record! { "request" => "req-1" }))
            .unwrap();
        let r2 = log.append("Requesting", "request", record! { "path" => "/a" });
        log.complete(r2, Output::success(record! { "request" => "req-2" }))
            .unwrap();
        let act = log.append("Post", "delete", record! { "request" => "req-2" });
        log.complete(act, Output::error("not yours")).unwrap();

        let clauses = vec![
            Pattern::on("Requesting", "request")
                .input("path", lit("/a"))
                .output("request", var("request")),
            Pattern::on("Post", "delete")
                .input("request", var("request"))
                .failed(var("error")),
        ];

        let frames = join(&clauses, &log);
        assert_eq!(frames.len(), 1);
        let frame = &frames.as_slice()[0];
        assert_eq!(frame.get_named("request"), Some(&Value::from("req-2")));
        assert_eq!(frame.get_named("error"), Some(&Value::from("not yours")));
        assert_eq!(frame.matched(), &[r2, act]);
    }

    #[test]
    fn test_join_empty_when_a_clause_fails() {
        let log = InvocationLog::new();
        log.append("Requesting", "request", record! { "path" => "/a" });
        let clauses = vec![
            Pattern::on("Requesting", "request"),
            Pattern::on("Friends", "removeFriend"),
        ];
        assert!(join(&clauses, &log).is_empty());
    }

    proptest! {
        /// Two clauses sharing a variable never produce a frame when the
        /// sampled values disagree, and always produce one when they agree.
        #[test]
        fn prop_shared_variable_must_agree(a in "[a-z]{1,6}", b in "[a-z]{1,6}") {
            let log = InvocationLog::new();
            log.append("Left", "act", record! { "key" => a.clone() });
            log.append("Right", "act", record! { "key" => b.clone() });

            let clauses = vec![
                Pattern::on("Left", "act").input("key", var("k")),
                Pattern::on("Right", "act").input("key", var("k")),
            ];
            let frames = join(&clauses, &log);

            if a == b {
                prop_assert_eq!(frames.len(), 1);
            } else {
                prop_assert!(frames.is_empty());
            }
        }

        /// A clause naming a subset of fields matches whatever the other
        /// fields hold.
        #[test]
        fn prop_unmentioned_fields_are_ignored(noise in any::<i64>(), extra in "[a-z]{0,8}") {
            let pattern = Pattern::on("Reaction", "add").input("post", lit("p1"));
            let inv = invocation(
                "Reaction",
                "add",
                record! { "post" => "p1", "noise" => noise, "extra" => extra },
                None,
            );
            prop_assert!(match_invocation(&pattern, &inv, &Frame::new()).is_some());
        }
    }
}
