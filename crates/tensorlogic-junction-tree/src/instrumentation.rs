//! Timing and statistics hooks for inference.
//!
//! Inference entry points accept a `&mut dyn InferenceLog` so callers can
//! collect phase timings without the engine holding any state. Events are
//! also emitted through `tracing`, so a subscriber sees them as structured
//! fields.
//!
//! # Examples
//!
//! ```no_run
//! use tensorlogic_junction_tree::{FactorGraph, JunctionTree, TracingInferenceLog, timers};
//!
//! # let graph = FactorGraph::new();
//! let mut log = TracingInferenceLog::new();
//! let marginals = JunctionTree::new().compute_marginals_with_log(&graph, &mut log);
//! if let Some(t) = log.timer(timers::MESSAGE_PASSING) {
//!     tracing::info!(invocations = t.invocations, total = ?t.total, "message passing");
//! }
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Timer names used by the inference engine.
pub mod timers {
    pub const BUILD_CLIQUE_TREE: &str = "inference/build_clique_tree";
    pub const MESSAGE_PASSING: &str = "inference/message_passing";
    pub const BUILD_MARGINALS: &str = "inference/build_marginals";
    pub const BUILD_MAX_MARGINALS: &str = "inference/build_max_marginals";
}

/// Sink for inference timings and statistics.
pub trait InferenceLog {
    /// Start (or restart) the timer `name`.
    fn start_timer(&mut self, name: &str);

    /// Stop the timer `name`, adding the elapsed time to its total.
    fn stop_timer(&mut self, name: &str);

    /// Record a named numeric statistic.
    fn log_statistic(&mut self, name: &str, value: f64);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInferenceLog;

impl InferenceLog for NullInferenceLog {
    fn start_timer(&mut self, _name: &str) {}

    fn stop_timer(&mut self, _name: &str) {}

    fn log_statistic(&mut self, _name: &str, _value: f64) {}
}

/// Accumulated time for one timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimerSummary {
    /// Number of completed start/stop pairs
    pub invocations: usize,
    /// Total elapsed time
    pub total: Duration,
}

/// Accumulates timers and statistics and reports them as `tracing` events.
#[derive(Debug, Clone, Default)]
pub struct TracingInferenceLog {
    running: BTreeMap<String, Instant>,
    timers: BTreeMap<String, TimerSummary>,
    statistics: BTreeMap<String, f64>,
}

impl TracingInferenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of a timer that has been stopped at least once.
    pub fn timer(&self, name: &str) -> Option<&TimerSummary> {
        self.timers.get(name)
    }

    pub fn timers(&self) -> &BTreeMap<String, TimerSummary> {
        &self.timers
    }

    /// Most recent value of a statistic.
    pub fn statistic(&self, name: &str) -> Option<f64> {
        self.statistics.get(name).copied()
    }

    /// Emit one `info` event per timer.
    pub fn report(&self) {
        for (name, summary) in &self.timers {
            tracing::info!(
                timer = %name,
                invocations = summary.invocations,
                total_us = summary.total.as_micros() as u64,
                "inference timer"
            );
        }
    }
}

impl InferenceLog for TracingInferenceLog {
    fn start_timer(&mut self, name: &str) {
        tracing::trace!(timer = name, "start timer");
        self.running.insert(name.to_string(), Instant::now());
    }

    fn stop_timer(&mut self, name: &str) {
        let Some(started) = self.running.remove(name) else {
            tracing::warn!(timer = name, "stop_timer called for a timer that is not running");
            return;
        };
        let elapsed = started.elapsed();
        let summary = self.timers.entry(name.to_string()).or_default();
        summary.invocations += 1;
        summary.total += elapsed;
        tracing::debug!(
            timer = name,
            elapsed_us = elapsed.as_micros() as u64,
            "stop timer"
        );
    }

    fn log_statistic(&mut self, name: &str, value: f64) {
        tracing::debug!(statistic = name, value, "inference statistic");
        self.statistics.insert(name.to_string(), value);
    }
}
