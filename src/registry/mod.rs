//! # Packet Registry
//!
//! Maps wire ids to decode behavior and payload types to encode behavior, built from
//! declarative [`Registration`]s.
//!
//! ## Component Kinds
//! - **Parser**: bytes to an owned payload, keyed by id
//! - **Handler**: acts on a decoded payload, keyed by payload type
//! - **Consumer**: decodes and acts in one step, keyed by id
//! - **Composer**: payload to bytes, keyed by payload type, with the outbound id
//! - **Capability**: a candidate that makes a [`ComposerTemplate`] concrete for one type
//!
//! Stack-confined payloads (see [`BorrowedPayload`]) are registered through
//! [`Registration::borrowed_parser`] and [`Registration::borrowed_handler`]; the rebuild
//! pairs them into one consumer.
//!
//! ## Precedence
//! Among entries contending for the same key the highest order wins; equal orders keep
//! the one registered first.
//!
//! ## Concurrency
//! Registration changes are serialized and each batch rebuilds every table from scratch.
//! The new tables are published with one atomic swap, so queries see either the old or
//! the new set, never a mix.
//!
//! ## Example
//! ```rust
//! use packet_engine::core::{BinaryCursor, BinarySink, GrowableBuffer};
//! use packet_engine::registry::{compose_fn, parse_fn, PacketRegistry, Registration};
//!
//! let registry = PacketRegistry::<u8>::new([
//!     Registration::parser(1, 0, parse_fn(|cursor: &mut BinaryCursor<'_>| cursor.read_u16())),
//!     Registration::composer(1, 0, compose_fn(|value: &u16, sink: &mut BinarySink<'_>| {
//!         sink.write_u16(*value)
//!     })),
//! ]);
//!
//! let mut buffer = GrowableBuffer::new();
//! let mut sink = BinarySink::new(&mut buffer)?;
//! assert_eq!(registry.compose(&0x0102u16, &mut sink)?, Some(1));
//! sink.release(false)?;
//! drop(sink);
//!
//! let bytes = buffer.freeze();
//! let mut cursor = BinaryCursor::from_bytes(&bytes);
//! let value: u16 = registry.parser(&1)?.parse(&mut cursor)?;
//! assert_eq!(value, 0x0102);
//! # Ok::<(), packet_engine::error::ProtocolError>(())
//! ```

pub mod adapters;
pub mod component;
pub mod entry;
pub mod stage;
mod tables;

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use tracing::debug;

pub use adapters::{ComposeAny, HandleAny, ParseAny};
pub use component::{
    compose_fn, parse_fn, BorrowedHandler, BorrowedParser, BorrowedPayload, ComposeFn, Composer,
    ComposerTemplate, Consumer, ParseFn, Parser,
};
pub use entry::{
    erase, AnyComponent, ComponentKind, ComponentKinds, EntryKey, PayloadType, Registration,
};
pub use stage::{RegistryDecoder, RegistryEncoder, RegistryHandlerStage};
pub use tables::Rejection;

use self::tables::Tables;
use crate::core::{BinaryCursor, BinarySink, PacketId};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::DispatchContext;
use crate::utils::metrics::{Metrics, Timer};

/// A parser resolved by id
#[derive(Clone)]
pub struct ResolvedParser {
    parser: Arc<dyn ParseAny>,
}

impl ResolvedParser {
    pub fn payload_name(&self) -> &'static str {
        self.parser.payload_name()
    }

    pub fn parse_any(&self, cursor: &mut BinaryCursor<'_>) -> Result<Box<dyn Any>> {
        self.parser.parse_any(cursor)
    }

    /// Parse and take the payload as `T`; `Unsupported` if the parser produces another type
    pub fn parse<T: Any>(&self, cursor: &mut BinaryCursor<'_>) -> Result<T> {
        let payload = self.parser.parse_any(cursor)?;
        payload.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
            ProtocolError::Unsupported(format!(
                "parser produces {}, not {}",
                self.parser.payload_name(),
                type_name::<T>()
            ))
        })
    }
}

impl fmt::Debug for ResolvedParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedParser")
            .field("payload", &self.payload_name())
            .finish()
    }
}

/// A composer resolved by payload type, with its outbound id
#[derive(Clone)]
pub struct ResolvedComposer<K> {
    pub id: K,
    composer: Arc<dyn ComposeAny>,
}

impl<K> ResolvedComposer<K> {
    pub fn payload_name(&self) -> &'static str {
        self.composer.payload_name()
    }

    /// Write the body of `payload`
    pub fn compose(&self, payload: &dyn Any, sink: &mut BinarySink<'_>) -> Result<()> {
        self.composer.compose_any(payload, sink)
    }
}

impl<K: fmt::Debug> fmt::Debug for ResolvedComposer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedComposer")
            .field("id", &self.id)
            .field("payload", &self.payload_name())
            .finish()
    }
}

/// Registry of protocol components keyed by wire id `K`
pub struct PacketRegistry<K> {
    entries: Mutex<Vec<Registration<K>>>,
    tables: ArcSwap<Tables<K>>,
    metrics: Option<Arc<Metrics>>,
}

impl<K: PacketId> PacketRegistry<K> {
    pub fn new(registrations: impl IntoIterator<Item = Registration<K>>) -> Self {
        Self::build(registrations.into_iter().collect(), None)
    }

    /// Report rebuild and compose counters into `metrics`
    pub fn with_metrics(
        registrations: impl IntoIterator<Item = Registration<K>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::build(registrations.into_iter().collect(), Some(metrics))
    }

    fn build(entries: Vec<Registration<K>>, metrics: Option<Arc<Metrics>>) -> Self {
        let tables = Self::rebuild(&entries, metrics.as_deref());
        Self {
            entries: Mutex::new(entries),
            tables: ArcSwap::from_pointee(tables),
            metrics,
        }
    }

    fn rebuild(entries: &[Registration<K>], metrics: Option<&Metrics>) -> Tables<K> {
        let _timer = Timer::start("registry_rebuild");
        let tables = Tables::build(entries);
        if let Some(metrics) = metrics {
            metrics.registry_rebuilt(tables.rejections.len() as u64);
        }
        debug!(
            entries = entries.len(),
            consumers = tables.consumers.len(),
            handlers = tables.handlers.len(),
            parsers = tables.parsers.len(),
            composers = tables.composers.len(),
            rejected = tables.rejections.len(),
            "Registry tables rebuilt"
        );
        tables
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Registration<K>>>> {
        self.entries
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_LOCK.to_string()))
    }

    /// Apply one batch of changes to the entries, then rebuild and publish
    fn update<R>(&self, change: impl FnOnce(&mut Vec<Registration<K>>) -> R) -> Result<R> {
        let mut entries = self.lock()?;
        let outcome = change(&mut entries);
        let tables = Self::rebuild(&entries, self.metrics.as_deref());
        self.tables.store(Arc::new(tables));
        Ok(outcome)
    }

    /// Add a batch of registrations
    pub fn register(&self, registrations: impl IntoIterator<Item = Registration<K>>) -> Result<()> {
        let batch: Vec<_> = registrations.into_iter().collect();
        self.update(|entries| entries.extend(batch))
    }

    /// Absorb `other`'s entries of the given kinds
    pub fn combine(&self, other: &PacketRegistry<K>, kinds: ComponentKinds) -> Result<usize> {
        if std::ptr::eq(self, other) {
            return Ok(0);
        }
        let batch: Vec<_> = other
            .entries()?
            .into_iter()
            .filter(|entry| kinds.contains(entry.kind()))
            .collect();
        let added = batch.len();
        self.update(|entries| entries.extend(batch))?;
        Ok(added)
    }

    /// Drop entries whose key matches one of `other`'s entries of the given kinds
    pub fn remove(&self, other: &PacketRegistry<K>, kinds: ComponentKinds) -> Result<usize> {
        let keys: Vec<EntryKey<K>> = other
            .entries()?
            .iter()
            .filter(|entry| kinds.contains(entry.kind()))
            .filter_map(Registration::key)
            .collect();
        self.retain(|entry| match entry.key() {
            Some(key) => !keys.contains(&key),
            None => true,
        })
    }

    /// Keep only the entries matching `keep`; returns how many were dropped
    pub fn retain(&self, mut keep: impl FnMut(&Registration<K>) -> bool) -> Result<usize> {
        self.update(|entries| {
            let before = entries.len();
            entries.retain(|entry| keep(entry));
            before - entries.len()
        })
    }

    /// Copy of the current registrations
    pub fn entries(&self) -> Result<Vec<Registration<K>>> {
        Ok(self.lock()?.clone())
    }

    /// Number of registrations, including rejected ones
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registrations skipped by the last rebuild
    pub fn rejections(&self) -> Vec<Rejection> {
        self.tables.load().rejections.clone()
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_deref()
    }

    /// Resolve the parser for `id`
    pub fn parser(&self, id: &K) -> Result<ResolvedParser> {
        self.tables
            .load()
            .parsers
            .get(id)
            .map(|parser| ResolvedParser {
                parser: Arc::clone(parser),
            })
            .ok_or_else(|| ProtocolError::Unsupported(format!("no parser for id {id:?}")))
    }

    pub fn has_consumer(&self, id: &K) -> bool {
        self.tables.load().consumers.contains_key(id)
    }

    /// Decode and act on the frame body for `id`; `Ok(false)` when no consumer resolves
    pub fn consume(
        &self,
        id: &K,
        cursor: &mut BinaryCursor<'_>,
        ctx: &DispatchContext<'_>,
    ) -> Result<bool> {
        let consumer = self.tables.load().consumers.get(id).cloned();
        match consumer {
            Some(consumer) => consumer.consume(cursor, ctx).map(|_| true),
            None => Ok(false),
        }
    }

    /// Hand a decoded payload to the handler for its type; `Ok(false)` when none resolves
    pub fn handle<T: Any>(&self, payload: &mut T, ctx: &DispatchContext<'_>) -> Result<bool> {
        self.handle_any(payload, ctx)
    }

    pub fn handle_any(&self, payload: &mut dyn Any, ctx: &DispatchContext<'_>) -> Result<bool> {
        let payload_type = (*payload).type_id();
        let handler = self.tables.load().handlers.get(&payload_type).cloned();
        match handler {
            Some(handler) => handler.handle_any(payload, ctx),
            None => Ok(false),
        }
    }

    /// Resolve the composer for `T`
    pub fn composer<T: Any>(&self) -> Result<ResolvedComposer<K>> {
        self.composer_for(TypeId::of::<T>()).ok_or_else(|| {
            ProtocolError::Unsupported(format!("no composer for {}", type_name::<T>()))
        })
    }

    pub fn outbound_id<T: Any>(&self) -> Option<K> {
        self.composer_for(TypeId::of::<T>()).map(|resolved| resolved.id)
    }

    /// Resolve the composer for a payload type known only at runtime
    pub fn composer_for(&self, payload: TypeId) -> Option<ResolvedComposer<K>> {
        self.tables
            .load()
            .composers
            .get(&payload)
            .map(|entry| ResolvedComposer {
                id: entry.id.clone(),
                composer: Arc::clone(&entry.composer),
            })
    }

    /// Write the body of `payload`; returns its outbound id, or `None` (and writes
    /// nothing) when no composer resolves
    pub fn compose<T: Any>(&self, payload: &T, sink: &mut BinarySink<'_>) -> Result<Option<K>> {
        self.compose_any(payload, sink)
    }

    /// Like [`compose`](Self::compose), with `write_id` called before the body
    pub fn compose_with_id<T, F>(
        &self,
        payload: &T,
        sink: &mut BinarySink<'_>,
        write_id: F,
    ) -> Result<Option<K>>
    where
        T: Any,
        F: FnOnce(&K, &mut BinarySink<'_>) -> Result<()>,
    {
        self.compose_dyn(payload, sink, Some(write_id))
    }

    pub fn compose_any(&self, payload: &dyn Any, sink: &mut BinarySink<'_>) -> Result<Option<K>> {
        self.compose_dyn(
            payload,
            sink,
            None::<fn(&K, &mut BinarySink<'_>) -> Result<()>>,
        )
    }

    fn compose_dyn<F>(
        &self,
        payload: &dyn Any,
        sink: &mut BinarySink<'_>,
        write_id: Option<F>,
    ) -> Result<Option<K>>
    where
        F: FnOnce(&K, &mut BinarySink<'_>) -> Result<()>,
    {
        let Some(resolved) = self.composer_for((*payload).type_id()) else {
            return Ok(None);
        };
        let start = sink.len();
        if let Some(write_id) = write_id {
            write_id(&resolved.id, sink)?;
        }
        resolved.compose(payload, sink)?;
        if let Some(metrics) = &self.metrics {
            metrics.payload_composed((sink.len() - start) as u64);
        }
        Ok(Some(resolved.id))
    }
}

impl<K: PacketId> Default for PacketRegistry<K> {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl<K: PacketId> fmt::Debug for PacketRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.load();
        f.debug_struct("PacketRegistry")
            .field("entries", &self.len())
            .field("consumers", &tables.consumers.len())
            .field("handlers", &tables.handlers.len())
            .field("parsers", &tables.parsers.len())
            .field("composers", &tables.composers.len())
            .field("rejected", &tables.rejections.len())
            .finish()
    }
}
