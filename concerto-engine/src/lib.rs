//! Concerto - a synchronization engine for independent concepts
//!
//! Concepts are self-contained modules (friend graphs, rankings, sessions,
//! ...) that never call each other. This crate composes them through
//! declarative rules that watch a log of action invocations and, when a
//! pattern matches, invoke further actions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Engine                             │
//! │                                                              │
//! │   request ──▶ ┌────────────────┐  events  ┌───────────────┐  │
//! │               │ InvocationLog  │ ───────▶ │  dispatcher   │  │
//! │               │ (concept,      │          │  rule index   │  │
//! │               │  action) index │ ◀─ scan ─│  join / where │  │
//! │               └────────────────┘          └──────┬────────┘  │
//! │                       ▲                          │ then      │
//! │                       │ append / complete        ▼           │
//! │               ┌───────┴──────────────────────────────────┐   │
//! │               │              ConceptRegistry             │   │
//! │               │  Requesting │ Sessioning │ Friends │ ... │   │
//! │               └──────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! ## Invocations
//!
//! Every action call is an **invocation**: appended to the log when it is
//! made, completed exactly once with either a success record or an error
//! message. Queries are read-only and never logged.
//!
//! ## Rules
//!
//! A **rule** has three parts:
//! - `when`: action patterns joined against the log, binding variables
//! - `where`: steps that expand, aggregate or filter the candidate frames
//! - `then`: action templates invoked once per surviving frame
//!
//! A rule fires at most once per distinct set of matched invocations.
//!
//! ## Correlation
//!
//! Rules for one request/response chain should thread the `request`
//! variable through every clause. The engine does not enforce this; it is
//! what keeps two concurrent requests with identical fields apart.
//!
//! # Example
//!
//! ```rust
//! use concerto_engine::rule::RuleFile;
//!
//! let file = RuleFile::from_yaml_str(r#"
//! concepts:
//!   - name: Friends
//!     actions: [removeFriend]
//! rules:
//!   - name: RemoveFriend
//!     when:
//!       - action: Requesting/request
//!         input: { path: /Friends/removeFriend, friend: "?friend" }
//!         output: { request: "?request" }
//!     then:
//!       - action: Friends/removeFriend
//!         input: { friend: "?friend", request: "?request" }
//! "#).unwrap();
//!
//! let validation = file.validate(true).unwrap();
//! assert_eq!(validation.graph.rules_for("Requesting", "request"), &[0]);
//! ```

// Modules
pub mod concept;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod log;
pub mod pattern;
pub mod rule;
pub mod types;
pub mod where_step;

// Used by the record! macro
pub use serde_json;

// Re-exports for convenience
pub use concept::{Concept, ConceptCatalog, ConceptRegistry, FnConcept, Requesting};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineBuilder, StatsSnapshot};
pub use error::{BuildError, EngineError, RequestError, RuleError};
pub use frame::{Frame, FrameSet};
pub use log::{ChainHold, Invocation, InvocationLog, LogEvent, Output};
pub use pattern::Pattern;
pub use rule::{ActionTemplate, Rule, RuleFile};
pub use types::{ActionRef, InvocationId, Record, Term, Var};
pub use where_step::{CollectStep, FrameTransform, Predicate, QueryStep, WhereStep};
