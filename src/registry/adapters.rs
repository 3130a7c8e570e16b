//! Adapters the rebuild synthesizes from registered components.
//!
//! ## Consumers
//! - [`ParseThenHandle`]: parse, then hand the payload to the handler for its type
//! - [`ParseThenForward`]: parse, then forward the payload down the rest of the chain
//! - [`StackAdapter`]: parse a frame-borrowing payload and handle it in the same call
//!
//! ## Composers
//! - [`ErasedComposer`]: a concrete composer behind a payload-erased interface
//! - [`TemplateInstance`]: a composer template bound to one capability candidate

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::component::{
    BorrowedHandler, BorrowedParser, BorrowedPayload, Composer, ComposerTemplate, Consumer, Parser,
};
use crate::core::{BinaryCursor, BinarySink};
use crate::error::{ProtocolError, Result};
use crate::protocol::{DispatchContext, TypedHandler};

fn payload_mismatch(expected: &str) -> ProtocolError {
    ProtocolError::Unsupported(format!("payload is not a {expected}"))
}

/// Parser with its payload type erased
pub trait ParseAny: Send + Sync {
    fn payload_name(&self) -> &'static str;

    fn parse_any(&self, cursor: &mut BinaryCursor<'_>) -> Result<Box<dyn Any>>;

    /// Parse and fire the payload down the rest of the chain
    fn parse_forward(&self, cursor: &mut BinaryCursor<'_>, ctx: &DispatchContext<'_>) -> Result<()>;
}

pub(crate) struct ErasedParser<T> {
    parser: Arc<dyn Parser<Payload = T>>,
}

impl<T: 'static> ErasedParser<T> {
    pub(crate) fn new(parser: Arc<dyn Parser<Payload = T>>) -> Self {
        Self { parser }
    }
}

impl<T: 'static> ParseAny for ErasedParser<T> {
    fn payload_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn parse_any(&self, cursor: &mut BinaryCursor<'_>) -> Result<Box<dyn Any>> {
        let payload = self.parser.parse(cursor)?;
        Ok(Box::new(payload))
    }

    fn parse_forward(&self, cursor: &mut BinaryCursor<'_>, ctx: &DispatchContext<'_>) -> Result<()> {
        let mut payload = self.parser.parse(cursor)?;
        ctx.fire_inbound(&mut payload)
    }
}

/// Consumer for a parser that has no handler registered for its payload
pub struct ParseThenForward {
    parser: Arc<dyn ParseAny>,
}

impl ParseThenForward {
    pub(crate) fn new(parser: Arc<dyn ParseAny>) -> Self {
        Self { parser }
    }
}

impl Consumer for ParseThenForward {
    fn consume(&self, cursor: &mut BinaryCursor<'_>, ctx: &DispatchContext<'_>) -> Result<()> {
        self.parser.parse_forward(cursor, ctx)
    }
}

impl fmt::Debug for ParseThenForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseThenForward")
            .field("payload", &self.parser.payload_name())
            .finish()
    }
}

/// Consumer pairing a parser with the handler for its payload
pub struct ParseThenHandle<T> {
    parser: Arc<dyn Parser<Payload = T>>,
    handler: Arc<dyn TypedHandler<T>>,
}

impl<T: 'static> ParseThenHandle<T> {
    pub(crate) fn new(
        parser: Arc<dyn Parser<Payload = T>>,
        handler: Arc<dyn TypedHandler<T>>,
    ) -> Self {
        Self { parser, handler }
    }
}

impl<T: 'static> Consumer for ParseThenHandle<T> {
    fn consume(&self, cursor: &mut BinaryCursor<'_>, ctx: &DispatchContext<'_>) -> Result<()> {
        let mut payload = self.parser.parse(cursor)?;
        self.handler.handle(&mut payload, ctx)
    }
}

impl<T> fmt::Debug for ParseThenHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseThenHandle")
            .field("payload", &type_name::<T>())
            .finish()
    }
}

/// Consumer for a stack-confined payload family.
///
/// The payload borrows from the frame, so it is handed to the handler within the
/// same call and dropped before `consume` returns.
pub struct StackAdapter<F: BorrowedPayload> {
    parser: Arc<dyn BorrowedParser<Family = F>>,
    handler: Arc<dyn BorrowedHandler<Family = F>>,
}

impl<F: BorrowedPayload> StackAdapter<F> {
    pub(crate) fn new(
        parser: Arc<dyn BorrowedParser<Family = F>>,
        handler: Arc<dyn BorrowedHandler<Family = F>>,
    ) -> Self {
        Self { parser, handler }
    }
}

impl<F: BorrowedPayload> Consumer for StackAdapter<F> {
    fn consume(&self, cursor: &mut BinaryCursor<'_>, ctx: &DispatchContext<'_>) -> Result<()> {
        let payload = self.parser.parse(cursor)?;
        self.handler.handle(payload, ctx)
    }
}

impl<F: BorrowedPayload> fmt::Debug for StackAdapter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackAdapter")
            .field("family", &type_name::<F>())
            .finish()
    }
}

/// Handler with its payload type erased
pub trait HandleAny: Send + Sync {
    fn payload_name(&self) -> &'static str;

    /// `Ok(false)` when `payload` is not the handler's type
    fn handle_any(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<bool>;
}

pub(crate) struct ErasedHandler<T> {
    handler: Arc<dyn TypedHandler<T>>,
}

impl<T: 'static> ErasedHandler<T> {
    pub(crate) fn new(handler: Arc<dyn TypedHandler<T>>) -> Self {
        Self { handler }
    }
}

impl<T: 'static> HandleAny for ErasedHandler<T> {
    fn payload_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn handle_any(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<bool> {
        match payload.downcast_mut::<T>() {
            Some(typed) => self.handler.handle(typed, ctx).map(|_| true),
            None => Ok(false),
        }
    }
}

/// Composer with its payload type erased
pub trait ComposeAny: Send + Sync {
    fn payload_name(&self) -> &'static str;

    /// Write `payload`; `Unsupported` when it is not the composer's type
    fn compose_any(&self, payload: &dyn Any, sink: &mut BinarySink<'_>) -> Result<()>;
}

/// A concrete [`Composer`] behind [`ComposeAny`]
pub struct ErasedComposer<T> {
    composer: Arc<dyn Composer<Payload = T>>,
}

impl<T: 'static> ErasedComposer<T> {
    pub(crate) fn new(composer: Arc<dyn Composer<Payload = T>>) -> Self {
        Self { composer }
    }
}

impl<T: 'static> ComposeAny for ErasedComposer<T> {
    fn payload_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn compose_any(&self, payload: &dyn Any, sink: &mut BinarySink<'_>) -> Result<()> {
        let payload = payload
            .downcast_ref::<T>()
            .ok_or_else(|| payload_mismatch(type_name::<T>()))?;
        self.composer.compose(payload, sink)
    }
}

impl<T> fmt::Debug for ErasedComposer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedComposer")
            .field("payload", &type_name::<T>())
            .finish()
    }
}

/// A [`ComposerTemplate`] instantiated for inner type `X`
pub struct TemplateInstance<T: ComposerTemplate, X: 'static> {
    template: Arc<T>,
    capability: Arc<T::Capability<X>>,
    _inner: PhantomData<fn() -> X>,
}

impl<T: ComposerTemplate, X: 'static> TemplateInstance<T, X> {
    pub(crate) fn new(template: Arc<T>, capability: Arc<T::Capability<X>>) -> Self {
        Self {
            template,
            capability,
            _inner: PhantomData,
        }
    }
}

impl<T: ComposerTemplate, X: 'static> ComposeAny for TemplateInstance<T, X> {
    fn payload_name(&self) -> &'static str {
        type_name::<T::Payload<X>>()
    }

    fn compose_any(&self, payload: &dyn Any, sink: &mut BinarySink<'_>) -> Result<()> {
        let payload = payload
            .downcast_ref::<T::Payload<X>>()
            .ok_or_else(|| payload_mismatch(type_name::<T::Payload<X>>()))?;
        self.template.compose::<X>(&self.capability, payload, sink)
    }
}

impl<T: ComposerTemplate, X: 'static> fmt::Debug for TemplateInstance<T, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateInstance")
            .field("template", &type_name::<T>())
            .field("inner", &type_name::<X>())
            .finish()
    }
}
