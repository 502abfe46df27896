//! Concepts: the independent modules rules synchronize
//!
//! A concept exposes named actions, which are logged and may change state,
//! and named queries, which are read-only and never logged. The engine only
//! ever talks to concepts through the [`Concept`] trait.
//!
//! Implementations provided here:
//! - [`FnConcept`]: a concept assembled from async closures
//! - [`Requesting`]: the built-in concept correlating external callers with
//!   their eventual response

mod func;
mod registry;
mod requesting;

pub use func::FnConcept;
pub use registry::{ConceptCatalog, ConceptRegistry};
pub use requesting::{Requesting, REQUESTING, REQUEST_FIELD};

use crate::log::Output;
use crate::types::Record;
use async_trait::async_trait;

/// An external collaborator exposing actions and queries.
///
/// Business failures are returned as [`Output::Error`], never as panics.
/// `perform` is only ever called with an action listed by `actions`, and
/// `query` with a query listed by `queries`.
#[async_trait]
pub trait Concept: Send + Sync {
    /// The concept's registered name
    fn name(&self) -> &str;

    /// Declared action names
    fn actions(&self) -> Vec<String>;

    /// Declared query names
    fn queries(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run an action
    async fn perform(&self, action: &str, input: Record) -> Output;

    /// Run a read-only query; each returned record is one row
    async fn query(&self, query: &str, _input: Record) -> Result<Vec<Record>, String> {
        Err(format!("{} has no query {query}", self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    struct Clock;

    #[async_trait]
    impl Concept for Clock {
        fn name(&self) -> &str {
            "Clock"
        }

        fn actions(&self) -> Vec<String> {
            vec!["tick".to_string()]
        }

        async fn perform(&self, _action: &str, _input: Record) -> Output {
            Output::empty()
        }
    }

    #[tokio::test]
    async fn test_default_query_is_rejected() {
        let clock = Clock;
        assert!(clock.queries().is_empty());
        let err = clock
            .query("_now", record! { "zone" => "utc" })
            .await
            .unwrap_err();
        assert_eq!(err, "Clock has no query _now");
    }
}
