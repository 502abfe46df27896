//! A concept assembled from async closures

use super::Concept;
use crate::log::Output;
use crate::types::Record;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::BTreeMap;
use std::future::Future;

type ActionFn = Box<dyn Fn(Record) -> BoxFuture<'static, Output> + Send + Sync>;
type QueryFn = Box<dyn Fn(Record) -> BoxFuture<'static, Result<Vec<Record>, String>> + Send + Sync>;

/// A concept whose actions and queries are closures.
///
/// State, if any, lives in whatever the closures capture.
///
/// ```
/// use concerto_engine::concept::{Concept, FnConcept};
/// use concerto_engine::Output;
///
/// let echo = FnConcept::new("Echo")
///     .action("say", |input| async move { Output::success(input) });
/// assert_eq!(echo.actions(), vec!["say".to_string()]);
/// ```
pub struct FnConcept {
    name: String,
    actions: BTreeMap<String, ActionFn>,
    queries: BTreeMap<String, QueryFn>,
}

impl FnConcept {
    /// Create a concept with no actions or queries
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: BTreeMap::new(),
            queries: BTreeMap::new(),
        }
    }

    /// Add an action
    pub fn action<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Record) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Output> + Send + 'static,
    {
        self.actions
            .insert(name.into(), Box::new(move |input| f(input).boxed()));
        self
    }

    /// Add a query
    pub fn query<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Record) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Record>, String>> + Send + 'static,
    {
        self.queries
            .insert(name.into(), Box::new(move |input| f(input).boxed()));
        self
    }
}

#[async_trait]
impl Concept for FnConcept {
    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    fn queries(&self) -> Vec<String> {
        self.queries.keys().cloned().collect()
    }

    async fn perform(&self, action: &str, input: Record) -> Output {
        match self.actions.get(action) {
            Some(f) => f(input).await,
            None => Output::error(format!("{} has no action {action}", self.name)),
        }
    }

    async fn query(&self, query: &str, input: Record) -> Result<Vec<Record>, String> {
        match self.queries.get(query) {
            Some(f) => f(input).await,
            None => Err(format!("{} has no query {query}", self.name)),
        }
    }
}
