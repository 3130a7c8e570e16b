//! Dispatch context: the rest of the chain after the current stage.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::handler::{Direction, Handler, Interest};
use crate::error::Result;
use crate::utils::metrics::Metrics;

/// A handler together with the interests it declared when it joined a chain
#[derive(Clone)]
pub struct Stage {
    handler: Arc<dyn Handler>,
    inbound: Interest,
    outbound: Interest,
}

impl Stage {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            inbound: handler.inbound(),
            outbound: handler.outbound(),
            handler,
        }
    }

    #[inline]
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    #[inline]
    pub fn interest(&self, direction: Direction) -> Interest {
        match direction {
            Direction::Inbound => self.inbound,
            Direction::Outbound => self.outbound,
        }
    }
}

impl From<Arc<dyn Handler>> for Stage {
    fn from(handler: Arc<dyn Handler>) -> Self {
        Self::new(handler)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.handler.name())
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .finish()
    }
}

/// Immutable view of the stages that follow the one being invoked.
///
/// Created fresh for every dispatch over a pipeline snapshot, so concurrent chain
/// mutations never change where an in-flight payload goes next. Reaching the end of
/// the view drops the payload silently.
#[derive(Clone, Copy)]
pub struct DispatchContext<'p> {
    stages: &'p [Stage],
    metrics: Option<&'p Metrics>,
}

impl<'p> DispatchContext<'p> {
    pub fn new(stages: &'p [Stage], metrics: Option<&'p Metrics>) -> Self {
        Self { stages, metrics }
    }

    /// A context with no stages; everything fired into it is dropped
    pub fn empty() -> DispatchContext<'static> {
        DispatchContext {
            stages: &[],
            metrics: None,
        }
    }

    /// Number of stages left
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }

    pub fn metrics(&self) -> Option<&'p Metrics> {
        self.metrics
    }

    /// Send a decoded payload to the next interested stage
    #[inline]
    pub fn fire_inbound<T: Any>(&self, payload: &mut T) -> Result<()> {
        self.walk(payload, TypeId::of::<T>(), Direction::Inbound)
    }

    #[inline]
    pub fn fire_outbound<T: Any>(&self, payload: &mut T) -> Result<()> {
        self.walk(payload, TypeId::of::<T>(), Direction::Outbound)
    }

    /// Continue an inbound payload whose concrete type is only known at runtime
    pub fn forward_inbound(&self, payload: &mut dyn Any) -> Result<()> {
        let type_id = (*payload).type_id();
        self.walk(payload, type_id, Direction::Inbound)
    }

    pub fn forward_outbound(&self, payload: &mut dyn Any) -> Result<()> {
        let type_id = (*payload).type_id();
        self.walk(payload, type_id, Direction::Outbound)
    }

    fn walk(&self, payload: &mut dyn Any, type_id: TypeId, direction: Direction) -> Result<()> {
        for (index, stage) in self.stages.iter().enumerate() {
            if !stage.interest(direction).matches(type_id) {
                continue;
            }

            if let Some(metrics) = self.metrics {
                metrics.payload_dispatched();
            }
            let next = DispatchContext {
                stages: &self.stages[index + 1..],
                metrics: self.metrics,
            };
            return match direction {
                Direction::Inbound => stage.handler.on_inbound(payload, &next),
                Direction::Outbound => stage.handler.on_outbound(payload, &next),
            };
        }

        trace!(?direction, ?type_id, "Payload reached end of chain unhandled");
        if let Some(metrics) = self.metrics {
            metrics.payload_dropped();
        }
        Ok(())
    }
}

impl fmt::Debug for DispatchContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|stage| stage.handler.name()))
            .finish()
    }
}
