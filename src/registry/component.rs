//! Component capabilities a registration can provide.

use std::fmt;
use std::marker::PhantomData;

use crate::core::{BinaryCursor, BinarySink};
use crate::error::Result;
use crate::protocol::DispatchContext;

/// Decodes a frame body into an owned payload
pub trait Parser: Send + Sync + 'static {
    type Payload: 'static;

    fn parse(&self, cursor: &mut BinaryCursor<'_>) -> Result<Self::Payload>;
}

/// Decodes and acts in one step; the registry keys consumers by wire id.
///
/// Implemented for any `Fn(&mut BinaryCursor, &DispatchContext) -> Result<()>`.
pub trait Consumer: Send + Sync + 'static {
    fn consume(&self, cursor: &mut BinaryCursor<'_>, ctx: &DispatchContext<'_>) -> Result<()>;
}

impl<F> Consumer for F
where
    F: Fn(&mut BinaryCursor<'_>, &DispatchContext<'_>) -> Result<()> + Send + Sync + 'static,
{
    #[inline]
    fn consume(&self, cursor: &mut BinaryCursor<'_>, ctx: &DispatchContext<'_>) -> Result<()> {
        self(cursor, ctx)
    }
}

/// Writes a payload body; the id is written by whoever frames it
pub trait Composer: Send + Sync + 'static {
    type Payload: 'static;

    fn compose(&self, payload: &Self::Payload, sink: &mut BinarySink<'_>) -> Result<()>;
}

/// Family of payload types that borrow from the frame they were parsed from.
///
/// Such payloads cannot outlive the decode call, so they are never boxed or forwarded
/// down the chain. The registry pairs a [`BorrowedParser`] and a [`BorrowedHandler`]
/// of the same family into one consumer instead.
///
/// ```rust
/// use packet_engine::core::BinaryCursor;
/// use packet_engine::registry::BorrowedPayload;
///
/// pub struct BlobView<'a> {
///     pub tag: u8,
///     pub body: BinaryCursor<'a>,
/// }
///
/// pub struct Blob;
///
/// impl BorrowedPayload for Blob {
///     type Payload<'a> = BlobView<'a>;
/// }
/// ```
pub trait BorrowedPayload: 'static {
    type Payload<'a>;
}

/// Parser producing a frame-borrowing payload
pub trait BorrowedParser: Send + Sync + 'static {
    type Family: BorrowedPayload;

    fn parse<'a>(
        &self,
        cursor: &mut BinaryCursor<'a>,
    ) -> Result<<Self::Family as BorrowedPayload>::Payload<'a>>;
}

/// Handler consuming a frame-borrowing payload
pub trait BorrowedHandler: Send + Sync + 'static {
    type Family: BorrowedPayload;

    fn handle<'a>(
        &self,
        payload: <Self::Family as BorrowedPayload>::Payload<'a>,
        ctx: &DispatchContext<'_>,
    ) -> Result<()>;
}

/// A composer generic over an inner value type.
///
/// A template is only usable once a capability for some `X` is registered with
/// [`Registration::capability`](super::Registration::capability). Every such
/// candidate yields one concrete composer for `Payload<X>`.
///
/// ```rust
/// use packet_engine::core::BinarySink;
/// use packet_engine::error::Result;
/// use packet_engine::registry::{Composer, ComposerTemplate};
///
/// /// Count-prefixed list of any element that has a composer
/// struct ListOf;
///
/// impl ComposerTemplate for ListOf {
///     type Capability<X: 'static> = dyn Composer<Payload = X>;
///     type Payload<X: 'static> = Vec<X>;
///
///     fn compose<X: 'static>(
///         &self,
///         element: &Self::Capability<X>,
///         payload: &Vec<X>,
///         sink: &mut BinarySink<'_>,
///     ) -> Result<()> {
///         sink.write_varint_u32(payload.len() as u32)?;
///         payload.iter().try_for_each(|item| element.compose(item, sink))
///     }
/// }
/// ```
pub trait ComposerTemplate: Send + Sync + 'static {
    /// What a candidate must provide for inner type `X`
    type Capability<X: 'static>: ?Sized + Send + Sync + 'static;

    /// Payload written once instantiated for `X`
    type Payload<X: 'static>: 'static;

    fn compose<X: 'static>(
        &self,
        capability: &Self::Capability<X>,
        payload: &Self::Payload<X>,
        sink: &mut BinarySink<'_>,
    ) -> Result<()>;
}

/// [`Parser`] over a closure
pub struct ParseFn<F, T> {
    parse: F,
    _payload: PhantomData<fn() -> T>,
}

/// Parser from a closure; the payload type comes from the closure's return type
pub fn parse_fn<T, F>(parse: F) -> ParseFn<F, T>
where
    T: 'static,
    F: Fn(&mut BinaryCursor<'_>) -> Result<T> + Send + Sync + 'static,
{
    ParseFn {
        parse,
        _payload: PhantomData,
    }
}

impl<F, T> Parser for ParseFn<F, T>
where
    T: 'static,
    F: Fn(&mut BinaryCursor<'_>) -> Result<T> + Send + Sync + 'static,
{
    type Payload = T;

    #[inline]
    fn parse(&self, cursor: &mut BinaryCursor<'_>) -> Result<T> {
        (self.parse)(cursor)
    }
}

impl<F, T> fmt::Debug for ParseFn<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseFn<{}>", std::any::type_name::<T>())
    }
}

/// [`Composer`] over a closure
pub struct ComposeFn<F, T> {
    compose: F,
    _payload: PhantomData<fn(T)>,
}

pub fn compose_fn<T, F>(compose: F) -> ComposeFn<F, T>
where
    T: 'static,
    F: Fn(&T, &mut BinarySink<'_>) -> Result<()> + Send + Sync + 'static,
{
    ComposeFn {
        compose,
        _payload: PhantomData,
    }
}

impl<F, T> Composer for ComposeFn<F, T>
where
    T: 'static,
    F: Fn(&T, &mut BinarySink<'_>) -> Result<()> + Send + Sync + 'static,
{
    type Payload = T;

    #[inline]
    fn compose(&self, payload: &T, sink: &mut BinarySink<'_>) -> Result<()> {
        (self.compose)(payload, sink)
    }
}

impl<F, T> fmt::Debug for ComposeFn<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComposeFn<{}>", std::any::type_name::<T>())
    }
}
