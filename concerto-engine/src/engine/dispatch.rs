//! Rule evaluation and then-action dispatch
//!
//! Every log event is evaluated on its own task against the rules indexed on
//! the event's (concept, action). Matching frames are claimed in the fired
//! set before the where phase, so a provenance fires a rule at most once no
//! matter how many events or tasks observe it. Each surviving frame then runs
//! its actions, in declaration order, on a task of its own.
//!
//! Queued events and running frames hold their causal chain, so the log's
//! retention window never drops records a chain can still join against.
//! Claims on evicted invocations are forgotten along with them.

use super::activity::{Activity, InFlight};
use super::stats::EngineStats;
use crate::concept::{ConceptRegistry, Requesting};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::frame::{Frame, FrameSet};
use crate::log::{ChainHold, Invocation, InvocationLog, LogEvent, LogObserver, Output};
use crate::pattern::join;
use crate::rule::{Rule, RuleGraph};
use crate::types::{ActionRef, InvocationId, Record, Var};
use crate::where_step;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

pub(crate) type Queued = (LogEvent, ChainHold, InFlight);

/// Provenances each rule has already fired for
#[derive(Default)]
pub(crate) struct Firings {
    claimed: Mutex<HashSet<(usize, Vec<InvocationId>)>>,
}

impl Firings {
    /// Returns false if rule `index` already fired for `provenance`
    fn claim(&self, index: usize, provenance: &[InvocationId]) -> bool {
        self.claimed.lock().insert((index, provenance.to_vec()))
    }

    fn release(&self, index: usize, provenance: &[InvocationId]) {
        self.claimed.lock().remove(&(index, provenance.to_vec()));
    }

    /// Drop every claim that involves an evicted invocation
    fn forget(&self, evicted: &[InvocationId]) {
        let gone: HashSet<InvocationId> = evicted.iter().copied().collect();
        self.claimed
            .lock()
            .retain(|(_, provenance)| !provenance.iter().any(|id| gone.contains(id)));
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().len()
    }
}

/// Feeds log events into the dispatcher queue
pub(crate) struct EventSink {
    pub tx: mpsc::UnboundedSender<Queued>,
    pub activity: Arc<Activity>,
    pub stats: Arc<EngineStats>,
    pub firings: Arc<Firings>,
}

impl LogObserver for EventSink {
    fn notify(&self, event: LogEvent, hold: ChainHold) {
        match event {
            LogEvent::Appended(_) => self.stats.record_appended(),
            LogEvent::Completed(_) => self.stats.record_completed(),
        }
        // A closed queue means the engine is gone; hold and token drop with the error
        let _ = self.tx.send((event, hold, self.activity.begin()));
    }

    fn evicted(&self, ids: &[InvocationId]) {
        self.firings.forget(ids);
    }
}

/// Shared engine state
pub(crate) struct Core {
    pub config: EngineConfig,
    pub log: InvocationLog,
    pub concepts: ConceptRegistry,
    pub requesting: Arc<Requesting>,
    pub rules: Vec<Rule>,
    pub graph: RuleGraph,
    pub stats: Arc<EngineStats>,
    pub activity: Arc<Activity>,
    pub firings: Arc<Firings>,
}

impl Core {
    /// Claim the right to fire rule `index` for this frame's provenance
    fn claim(&self, index: usize, frame: &Frame) -> bool {
        let provenance = frame.matched();
        if !self.firings.claim(index, provenance) {
            self.stats.record_duplicate();
            return false;
        }
        // Evicted after the join read it: the claim would never be forgotten
        if provenance.iter().any(|id| self.log.get(*id).is_none()) {
            self.firings.release(index, provenance);
            return false;
        }
        true
    }

    /// Evaluate every rule triggered by `event`
    pub async fn evaluate(self: &Arc<Self>, event: LogEvent) {
        // Already evicted by the retention window
        let Some(trigger) = self.log.get(event.id()) else {
            return;
        };

        for &index in self.graph.rules_for(&trigger.concept, &trigger.action) {
            let rule = &self.rules[index];
            self.stats.record_evaluation();

            let claimed: FrameSet = join(&rule.when, &self.log)
                .into_iter()
                .filter(|frame| frame.involves(trigger.id) && self.claim(index, frame))
                .collect();
            if claimed.is_empty() {
                continue;
            }
            debug!(
                rule = %rule.name,
                trigger = %trigger.id,
                frames = claimed.len(),
                "rule matched"
            );

            let frames = where_step::run(&rule.name, &rule.where_steps, claimed, &self.concepts).await;
            for frame in frames {
                self.fire(index, &trigger, frame);
            }
        }
    }

    fn fire(self: &Arc<Self>, index: usize, trigger: &Invocation, frame: Frame) {
        let rule = &self.rules[index];

        let actions: Vec<(ActionRef, Record)> = match rule
            .then
            .iter()
            .map(|template| -> Result<_, Var> {
                Ok((template.target.clone(), frame.instantiate(&template.input)?))
            })
            .collect::<Result<_, Var>>()
        {
            Ok(actions) => actions,
            Err(var) => {
                self.stats.record_unbound();
                let err = EngineError::UnboundVariable {
                    rule: rule.name.clone(),
                    var,
                };
                error!(%err, "dropping frame");
                return;
            }
        };

        let depth = frame
            .matched()
            .iter()
            .filter_map(|id| self.log.get(*id))
            .map(|inv| inv.depth)
            .max()
            .unwrap_or(0)
            + 1;
        if depth > self.config.max_chain_depth {
            self.stats.record_depth_exceeded();
            let err = EngineError::ChainDepthExceeded {
                rule: rule.name.clone(),
                depth,
                limit: self.config.max_chain_depth,
            };
            error!(%err, trigger = %trigger.id, "not dispatching");
            return;
        }

        self.stats.record_fired();
        if actions.is_empty() {
            return;
        }

        let in_flight = self.activity.begin();
        let hold = self.log.hold(trigger.id);
        let core = Arc::clone(self);
        let rule_name = rule.name.clone();
        let cause = trigger.id;
        tokio::spawn(async move {
            for (target, input) in actions {
                core.dispatch(&rule_name, target, input, cause, depth).await;
            }
            drop(hold);
            drop(in_flight);
        });
    }

    async fn dispatch(
        &self,
        rule: &str,
        target: ActionRef,
        input: Record,
        cause: InvocationId,
        depth: usize,
    ) {
        let id = self
            .log
            .append_caused(&target.concept, &target.name, input.clone(), Some(cause), depth);
        self.stats.record_dispatched();
        debug!(rule, action = %target, invocation = %id, depth, "dispatching");

        let output = match self.concepts.perform(&target, input).await {
            Ok(output) => output,
            Err(err) => {
                error!(rule, action = %target, %err, "cannot perform action");
                Output::error(err.to_string())
            }
        };

        if let Err(err) = self.finish(id, output) {
            error!(rule, action = %target, %err, "action returned an invalid output");
        }
    }

    /// Complete `id` with `output`. An invalid output is counted as a
    /// violation and the invocation completes with it as its error instead.
    pub fn finish(&self, id: InvocationId, output: Output) -> Result<(), EngineError> {
        let Err(err) = self.log.complete(id, output) else {
            return Ok(());
        };
        self.stats.record_violation();
        if let Err(fallback) = self.log.complete(id, Output::error(err.to_string())) {
            error!(invocation = %id, err = %fallback, "cannot complete invocation");
        }
        Err(err)
    }
}

/// Receive log events and evaluate each on its own task
pub(crate) async fn pump(core: Arc<Core>, mut rx: mpsc::UnboundedReceiver<Queued>) {
    while let Some((event, hold, in_flight)) = rx.recv().await {
        let core = Arc::clone(&core);
        tokio::spawn(async move {
            core.evaluate(event).await;
            drop(hold);
            drop(in_flight);
        });
    }
}
