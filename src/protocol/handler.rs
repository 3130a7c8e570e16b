//! Handler capabilities and the typed-handler adapter.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

use super::context::DispatchContext;
use crate::error::Result;

/// Which payloads a stage wants to see in one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Skipped automatically
    Ignore,
    /// Invoked only for this exact concrete type
    Payload(TypeId),
    /// Invoked for every payload; the stage decides to consume or forward
    Any,
}

impl Interest {
    #[inline]
    pub fn of<T: Any>() -> Self {
        Interest::Payload(TypeId::of::<T>())
    }

    #[inline]
    pub fn matches(self, payload: TypeId) -> bool {
        match self {
            Interest::Ignore => false,
            Interest::Payload(declared) => declared == payload,
            Interest::Any => true,
        }
    }
}

/// Dispatch direction through a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// A stage of a [`Pipeline`](super::Pipeline).
///
/// A stage is only invoked for payloads its [`Interest`] matches. Once invoked it owns
/// the payload: it either acts on it or hands it to `ctx` to continue down the chain.
/// The default implementations forward. Interests are read once, when the stage is
/// added to a chain.
pub trait Handler: Send + Sync + 'static {
    /// Name used in log events
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn inbound(&self) -> Interest {
        Interest::Ignore
    }

    fn outbound(&self) -> Interest {
        Interest::Ignore
    }

    fn on_inbound(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<()> {
        ctx.forward_inbound(payload)
    }

    fn on_outbound(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<()> {
        ctx.forward_outbound(payload)
    }
}

/// Acts on exactly one payload type.
///
/// Implemented for any `Fn(&mut T, &DispatchContext) -> Result<()>`.
pub trait TypedHandler<T: 'static>: Send + Sync + 'static {
    fn handle(&self, payload: &mut T, ctx: &DispatchContext<'_>) -> Result<()>;
}

impl<T, F> TypedHandler<T> for F
where
    T: 'static,
    F: Fn(&mut T, &DispatchContext<'_>) -> Result<()> + Send + Sync + 'static,
{
    #[inline]
    fn handle(&self, payload: &mut T, ctx: &DispatchContext<'_>) -> Result<()> {
        self(payload, ctx)
    }
}

/// Inbound stage for one payload type from a closure
pub fn inbound<T, F>(handler: F) -> Typed<F, T>
where
    T: 'static,
    F: Fn(&mut T, &DispatchContext<'_>) -> Result<()> + Send + Sync + 'static,
{
    Typed::inbound(handler)
}

/// Outbound stage for one payload type from a closure
pub fn outbound<T, F>(handler: F) -> Typed<F, T>
where
    T: 'static,
    F: Fn(&mut T, &DispatchContext<'_>) -> Result<()> + Send + Sync + 'static,
{
    Typed::outbound(handler)
}

/// Chain stage wrapping a [`TypedHandler`] for one direction
pub struct Typed<H, T> {
    handler: H,
    direction: Direction,
    _payload: PhantomData<fn(T)>,
}

impl<H, T> Typed<H, T>
where
    H: TypedHandler<T>,
    T: 'static,
{
    pub fn inbound(handler: H) -> Self {
        Self::new(handler, Direction::Inbound)
    }

    pub fn outbound(handler: H) -> Self {
        Self::new(handler, Direction::Outbound)
    }

    pub fn new(handler: H, direction: Direction) -> Self {
        Self {
            handler,
            direction,
            _payload: PhantomData,
        }
    }

    fn interest(&self, direction: Direction) -> Interest {
        if self.direction == direction {
            Interest::of::<T>()
        } else {
            Interest::Ignore
        }
    }
}

impl<H, T> Handler for Typed<H, T>
where
    H: TypedHandler<T>,
    T: 'static,
{
    fn name(&self) -> &str {
        std::any::type_name::<H>()
    }

    fn inbound(&self) -> Interest {
        self.interest(Direction::Inbound)
    }

    fn outbound(&self) -> Interest {
        self.interest(Direction::Outbound)
    }

    fn on_inbound(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<()> {
        match payload.downcast_mut::<T>() {
            Some(typed) => self.handler.handle(typed, ctx),
            None => ctx.forward_inbound(payload),
        }
    }

    fn on_outbound(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<()> {
        match payload.downcast_mut::<T>() {
            Some(typed) => self.handler.handle(typed, ctx),
            None => ctx.forward_outbound(payload),
        }
    }
}

impl<H, T> fmt::Debug for Typed<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typed")
            .field("payload", &std::any::type_name::<T>())
            .field("direction", &self.direction)
            .finish()
    }
}
