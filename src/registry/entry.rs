//! Registration entries and the type glue that materializes them.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use super::adapters::{
    ComposeAny, ErasedComposer, ErasedHandler, ErasedParser, HandleAny, ParseAny,
    ParseThenHandle, StackAdapter, TemplateInstance,
};
use super::component::{
    BorrowedHandler, BorrowedParser, BorrowedPayload, Composer, ComposerTemplate, Consumer, Parser,
};
use crate::core::PacketId;
use crate::protocol::TypedHandler;

/// Type-erased component as stored in a registration.
///
/// Holds the capability handle itself, e.g. an `Arc<dyn Parser<Payload = T>>`; see [`erase`].
pub type AnyComponent = Arc<dyn Any + Send + Sync>;

/// Capability a registration claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Parser,
    Handler,
    Consumer,
    Composer,
    /// Candidate serving a composer template for one inner type
    Capability,
}

impl ComponentKind {
    const fn bit(self) -> u8 {
        match self {
            ComponentKind::Parser => 1,
            ComponentKind::Handler => 1 << 1,
            ComponentKind::Consumer => 1 << 2,
            ComponentKind::Composer => 1 << 3,
            ComponentKind::Capability => 1 << 4,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Parser => "parser",
            ComponentKind::Handler => "handler",
            ComponentKind::Consumer => "consumer",
            ComponentKind::Composer => "composer",
            ComponentKind::Capability => "capability",
        };
        f.write_str(name)
    }
}

/// Set of component kinds, used to filter `combine` and `remove`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentKinds(u8);

impl ComponentKinds {
    pub const NONE: Self = Self(0);
    pub const PARSERS: Self = Self(ComponentKind::Parser.bit());
    pub const HANDLERS: Self = Self(ComponentKind::Handler.bit());
    pub const CONSUMERS: Self = Self(ComponentKind::Consumer.bit());
    pub const COMPOSERS: Self = Self(ComponentKind::Composer.bit());
    pub const CAPABILITIES: Self = Self(ComponentKind::Capability.bit());
    pub const ALL: Self = Self(0b1_1111);

    #[inline]
    pub const fn contains(self, kind: ComponentKind) -> bool {
        self.0 & kind.bit() != 0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<ComponentKind> for ComponentKinds {
    fn from(kind: ComponentKind) -> Self {
        Self(kind.bit())
    }
}

impl BitOr for ComponentKinds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for ComponentKinds {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

pub(crate) type ParserGlue = fn(&AnyComponent) -> Option<Arc<dyn ParseAny>>;
pub(crate) type HandlerGlue = fn(&AnyComponent) -> Option<Arc<dyn HandleAny>>;
pub(crate) type ComposerGlue = fn(&AnyComponent) -> Option<Arc<dyn ComposeAny>>;
pub(crate) type PairGlue = fn(&AnyComponent, &AnyComponent) -> Option<Arc<dyn Consumer>>;
pub(crate) type CheckGlue = fn(&AnyComponent) -> bool;
pub(crate) type InstanceGlue = fn(&AnyComponent, &AnyComponent) -> Option<Arc<dyn ComposeAny>>;

#[derive(Clone, Copy)]
pub(crate) enum Shape {
    Owned {
        parser: ParserGlue,
        handler: HandlerGlue,
        composer: ComposerGlue,
        parse_then_handle: PairGlue,
    },
    Confined {
        parser_ok: CheckGlue,
        handler_ok: CheckGlue,
        adapter: PairGlue,
    },
}

/// Runtime description of a payload type, carrying what the registry needs to
/// materialize components for it.
///
/// Two payload types are equal when they describe the same Rust type.
#[derive(Clone, Copy)]
pub struct PayloadType {
    id: TypeId,
    name: &'static str,
    pub(crate) shape: Shape,
}

impl PayloadType {
    /// An owned payload type, which can be boxed and forwarded down a chain
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            shape: Shape::Owned {
                parser: parser_glue::<T>,
                handler: handler_glue::<T>,
                composer: composer_glue::<T>,
                parse_then_handle: parse_then_handle_glue::<T>,
            },
        }
    }

    /// A stack-confined payload family
    pub fn borrowed<F: BorrowedPayload>() -> Self {
        Self {
            id: TypeId::of::<F>(),
            name: type_name::<F>(),
            shape: Shape::Confined {
                parser_ok: borrowed_parser_ok::<F>,
                handler_ok: borrowed_handler_ok::<F>,
                adapter: stack_adapter_glue::<F>,
            },
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn is_confined(&self) -> bool {
        matches!(self.shape, Shape::Confined { .. })
    }
}

impl PartialEq for PayloadType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PayloadType {}

impl fmt::Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadType")
            .field("name", &self.name)
            .field("confined", &self.is_confined())
            .finish()
    }
}

/// Composer template type a template registration or capability candidate belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Marker {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
}

impl Marker {
    fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Key that [`PacketRegistry::remove`](super::PacketRegistry::remove) matches entries by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey<K> {
    /// Parsers and consumers
    Id(ComponentKind, K),
    /// Handlers and concrete composers
    Payload(ComponentKind, TypeId),
    Template(TypeId),
    /// Candidate for a template marker and the payload it instantiates
    Capability(TypeId, TypeId),
}

/// One declarative registration
#[derive(Clone)]
pub struct Registration<K> {
    kind: ComponentKind,
    id: Option<K>,
    order: i32,
    payload: Option<PayloadType>,
    pub(crate) marker: Option<Marker>,
    pub(crate) instantiate: Option<InstanceGlue>,
    pub(crate) component: AnyComponent,
}

impl<K: PacketId> Registration<K> {
    pub fn parser<P: Parser>(id: K, order: i32, parser: P) -> Self {
        Self::declare(
            ComponentKind::Parser,
            Some(id),
            order,
            Some(PayloadType::of::<P::Payload>()),
            erase::parser(parser),
        )
    }

    pub fn handler<T, H>(order: i32, handler: H) -> Self
    where
        T: 'static,
        H: TypedHandler<T>,
    {
        Self::declare(
            ComponentKind::Handler,
            None,
            order,
            Some(PayloadType::of::<T>()),
            erase::handler::<T, H>(handler),
        )
    }

    /// Handler from a closure, with the payload type taken from its signature
    pub fn handler_fn<T, F>(order: i32, handler: F) -> Self
    where
        T: 'static,
        F: Fn(&mut T, &crate::protocol::DispatchContext<'_>) -> crate::error::Result<()>
            + Send
            + Sync
            + 'static,
    {
        Self::handler::<T, F>(order, handler)
    }

    pub fn consumer<C: Consumer>(id: K, order: i32, consumer: C) -> Self {
        Self::declare(
            ComponentKind::Consumer,
            Some(id),
            order,
            None,
            erase::consumer(consumer),
        )
    }

    pub fn composer<C: Composer>(id: K, order: i32, composer: C) -> Self {
        Self::declare(
            ComponentKind::Composer,
            Some(id),
            order,
            Some(PayloadType::of::<C::Payload>()),
            erase::composer(composer),
        )
    }

    pub fn borrowed_parser<P: BorrowedParser>(id: K, order: i32, parser: P) -> Self {
        let parser: Arc<dyn BorrowedParser<Family = P::Family>> = Arc::new(parser);
        Self::declare(
            ComponentKind::Parser,
            Some(id),
            order,
            Some(PayloadType::borrowed::<P::Family>()),
            Arc::new(parser),
        )
    }

    pub fn borrowed_handler<H: BorrowedHandler>(order: i32, handler: H) -> Self {
        let handler: Arc<dyn BorrowedHandler<Family = H::Family>> = Arc::new(handler);
        Self::declare(
            ComponentKind::Handler,
            None,
            order,
            Some(PayloadType::borrowed::<H::Family>()),
            Arc::new(handler),
        )
    }

    /// Composer template, usable once candidates are registered for it
    pub fn template<T: ComposerTemplate>(id: K, order: i32, template: T) -> Self {
        let mut entry = Self::declare(
            ComponentKind::Composer,
            Some(id),
            order,
            None,
            Arc::new(Arc::new(template)),
        );
        entry.marker = Some(Marker::of::<T>());
        entry
    }

    /// Candidate serving template `T` for inner type `X`.
    ///
    /// The instantiated composer writes `T::Payload<X>` and takes its id and order from
    /// the template registration.
    pub fn capability<T, X>(order: i32, capability: Arc<T::Capability<X>>) -> Self
    where
        T: ComposerTemplate,
        X: 'static,
    {
        let mut entry = Self::declare(
            ComponentKind::Capability,
            None,
            order,
            Some(PayloadType::of::<T::Payload<X>>()),
            Arc::new(capability),
        );
        entry.marker = Some(Marker::of::<T>());
        entry.instantiate = Some(instance_glue::<T, X>);
        entry
    }

    /// Untyped registration for table-driven lists.
    ///
    /// `component` must hold the capability handle [`erase`] produces for `kind`. That
    /// claim is only checked when tables are rebuilt; a mismatch is rejected there.
    pub fn declare(
        kind: ComponentKind,
        id: Option<K>,
        order: i32,
        payload: Option<PayloadType>,
        component: AnyComponent,
    ) -> Self {
        Self {
            kind,
            id,
            order,
            payload,
            marker: None,
            instantiate: None,
            component,
        }
    }

    #[inline]
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    #[inline]
    pub fn id(&self) -> Option<&K> {
        self.id.as_ref()
    }

    #[inline]
    pub fn order(&self) -> i32 {
        self.order
    }

    #[inline]
    pub fn payload(&self) -> Option<PayloadType> {
        self.payload
    }

    #[inline]
    pub fn is_template(&self) -> bool {
        self.kind == ComponentKind::Composer && self.marker.is_some()
    }

    /// Key used to match this entry on removal; `None` when it lacks the id or payload
    /// type its kind is keyed by.
    pub fn key(&self) -> Option<EntryKey<K>> {
        match (self.kind, &self.marker) {
            (ComponentKind::Parser | ComponentKind::Consumer, _) => {
                self.id.clone().map(|id| EntryKey::Id(self.kind, id))
            }
            (ComponentKind::Composer, Some(marker)) => Some(EntryKey::Template(marker.id)),
            (ComponentKind::Capability, Some(marker)) => self
                .payload
                .map(|payload| EntryKey::Capability(marker.id, payload.type_id())),
            (ComponentKind::Capability, None) => None,
            (ComponentKind::Handler, _) | (ComponentKind::Composer, None) => self
                .payload
                .map(|payload| EntryKey::Payload(self.kind, payload.type_id())),
        }
    }

    /// Short description for log events and rejections
    pub(crate) fn describe(&self) -> String {
        let mut text = self.kind.to_string();
        if let Some(id) = &self.id {
            text.push_str(&format!(" id={id:?}"));
        }
        if let Some(payload) = &self.payload {
            text.push_str(" payload=");
            text.push_str(payload.name());
        }
        if let Some(marker) = &self.marker {
            text.push_str(" template=");
            text.push_str(marker.name);
        }
        text.push_str(&format!(" order={}", self.order));
        text
    }
}

impl<K: fmt::Debug> fmt::Debug for Registration<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("order", &self.order)
            .field("payload", &self.payload.map(|p| p.name()))
            .field("template", &self.marker.map(|m| m.name))
            .finish()
    }
}

/// Capability handles in the form [`Registration::declare`] expects
pub mod erase {
    use std::sync::Arc;

    use super::AnyComponent;
    use crate::protocol::TypedHandler;
    use crate::registry::component::{Composer, Consumer, Parser};

    pub fn parser<P: Parser>(parser: P) -> AnyComponent {
        let parser: Arc<dyn Parser<Payload = P::Payload>> = Arc::new(parser);
        Arc::new(parser)
    }

    pub fn handler<T: 'static, H: TypedHandler<T>>(handler: H) -> AnyComponent {
        let handler: Arc<dyn TypedHandler<T>> = Arc::new(handler);
        Arc::new(handler)
    }

    pub fn consumer<C: Consumer>(consumer: C) -> AnyComponent {
        let consumer: Arc<dyn Consumer> = Arc::new(consumer);
        Arc::new(consumer)
    }

    pub fn composer<C: Composer>(composer: C) -> AnyComponent {
        let composer: Arc<dyn Composer<Payload = C::Payload>> = Arc::new(composer);
        Arc::new(composer)
    }
}

pub(crate) fn resolve_consumer(component: &AnyComponent) -> Option<Arc<dyn Consumer>> {
    component.downcast_ref::<Arc<dyn Consumer>>().cloned()
}

fn parser_glue<T: 'static>(component: &AnyComponent) -> Option<Arc<dyn ParseAny>> {
    let parser = component
        .downcast_ref::<Arc<dyn Parser<Payload = T>>>()?
        .clone();
    Some(Arc::new(ErasedParser::new(parser)))
}

fn handler_glue<T: 'static>(component: &AnyComponent) -> Option<Arc<dyn HandleAny>> {
    let handler = component.downcast_ref::<Arc<dyn TypedHandler<T>>>()?.clone();
    Some(Arc::new(ErasedHandler::new(handler)))
}

fn composer_glue<T: 'static>(component: &AnyComponent) -> Option<Arc<dyn ComposeAny>> {
    let composer = component
        .downcast_ref::<Arc<dyn Composer<Payload = T>>>()?
        .clone();
    Some(Arc::new(ErasedComposer::new(composer)))
}

fn parse_then_handle_glue<T: 'static>(
    parser: &AnyComponent,
    handler: &AnyComponent,
) -> Option<Arc<dyn Consumer>> {
    let parser = parser.downcast_ref::<Arc<dyn Parser<Payload = T>>>()?.clone();
    let handler = handler.downcast_ref::<Arc<dyn TypedHandler<T>>>()?.clone();
    Some(Arc::new(ParseThenHandle::new(parser, handler)))
}

fn borrowed_parser_ok<F: BorrowedPayload>(component: &AnyComponent) -> bool {
    component.is::<Arc<dyn BorrowedParser<Family = F>>>()
}

fn borrowed_handler_ok<F: BorrowedPayload>(component: &AnyComponent) -> bool {
    component.is::<Arc<dyn BorrowedHandler<Family = F>>>()
}

fn stack_adapter_glue<F: BorrowedPayload>(
    parser: &AnyComponent,
    handler: &AnyComponent,
) -> Option<Arc<dyn Consumer>> {
    let parser = parser
        .downcast_ref::<Arc<dyn BorrowedParser<Family = F>>>()?
        .clone();
    let handler = handler
        .downcast_ref::<Arc<dyn BorrowedHandler<Family = F>>>()?
        .clone();
    Some(Arc::new(StackAdapter::new(parser, handler)))
}

fn instance_glue<T, X>(
    template: &AnyComponent,
    capability: &AnyComponent,
) -> Option<Arc<dyn ComposeAny>>
where
    T: ComposerTemplate,
    X: 'static,
{
    let template = template.downcast_ref::<Arc<T>>()?.clone();
    let capability = capability
        .downcast_ref::<Arc<T::Capability<X>>>()?
        .clone();
    Some(Arc::new(TemplateInstance::<T, X>::new(template, capability)))
}
