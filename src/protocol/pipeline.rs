//! Per-connection handler chain.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::debug;

use super::context::{DispatchContext, Stage};
use super::handler::Handler;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::Metrics;

type Stages = Vec<Stage>;

/// Ordered list of stages for one connection.
///
/// Mutations are serialized by one guard and publish a new stage list atomically.
/// Dispatch never takes the guard: it loads the current list and walks that snapshot,
/// so a concurrent insert or remove only affects dispatches that start afterwards.
pub struct Pipeline {
    stages: ArcSwap<Stages>,
    guard: Mutex<()>,
    metrics: Option<Arc<Metrics>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stages: ArcSwap::from_pointee(Vec::new()),
            guard: Mutex::new(()),
            metrics: None,
        }
    }

    /// Report dispatch counters into `metrics`
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.stages.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.load().is_empty()
    }

    /// The stage list dispatch currently sees
    pub fn snapshot(&self) -> Arc<Stages> {
        self.stages.load_full()
    }

    fn mutate<R>(&self, change: impl FnOnce(&mut Stages) -> R) -> Result<R> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_PIPELINE_LOCK.to_string()))?;
        let mut next: Stages = self.stages.load().iter().cloned().collect();
        let outcome = change(&mut next);
        self.stages.store(Arc::new(next));
        Ok(outcome)
    }

    /// Insert a stage at the head of the chain
    pub fn add_first(&self, stage: Arc<dyn Handler>) -> Result<()> {
        let name = stage.name().to_string();
        let len = self.mutate(|stages| {
            stages.insert(0, Stage::new(stage));
            stages.len()
        })?;
        debug!(stage = %name, stages = len, "Stage added first");
        Ok(())
    }

    /// Append a stage at the tail of the chain
    pub fn add_last(&self, stage: Arc<dyn Handler>) -> Result<()> {
        let name = stage.name().to_string();
        let len = self.mutate(|stages| {
            stages.push(Stage::new(stage));
            stages.len()
        })?;
        debug!(stage = %name, stages = len, "Stage added last");
        Ok(())
    }

    /// Remove `stage` by identity; returns whether it was present
    pub fn remove(&self, stage: &Arc<dyn Handler>) -> Result<bool> {
        let target = Arc::as_ptr(stage) as *const ();
        let removed = self.mutate(|stages| {
            let before = stages.len();
            stages.retain(|s| Arc::as_ptr(s.handler()) as *const () != target);
            before != stages.len()
        })?;
        if removed {
            debug!(stage = stage.name(), "Stage removed");
        }
        Ok(removed)
    }

    fn context<'p>(&'p self, stages: &'p Stages) -> DispatchContext<'p> {
        DispatchContext::new(stages, self.metrics.as_deref())
    }

    /// Dispatch an inbound payload from the head of the chain
    pub fn fire_inbound<T: Any>(&self, payload: &mut T) -> Result<()> {
        let stages = self.stages.load_full();
        self.context(&stages).fire_inbound(payload)
    }

    /// Dispatch an outbound payload from the head of the chain
    pub fn fire_outbound<T: Any>(&self, payload: &mut T) -> Result<()> {
        let stages = self.stages.load_full();
        self.context(&stages).fire_outbound(payload)
    }

    pub fn fire_inbound_any(&self, payload: &mut dyn Any) -> Result<()> {
        let stages = self.stages.load_full();
        self.context(&stages).forward_inbound(payload)
    }

    pub fn fire_outbound_any(&self, payload: &mut dyn Any) -> Result<()> {
        let stages = self.stages.load_full();
        self.context(&stages).forward_outbound(payload)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages = self.stages.load();
        f.debug_struct("Pipeline")
            .field(
                "stages",
                &stages.iter().map(|stage| stage.handler().name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
