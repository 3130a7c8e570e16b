//! Lookup tables derived from registrations.
//!
//! ## Rebuild
//! Entries of each kind are visited by descending order (stable, so ties keep
//! registration order) and inserted only when their key is still free:
//! 1. consumers by id
//! 2. handlers by payload type; handlers for stack-confined families are held aside
//! 3. parsers by id, each also yielding a consumer under the same id
//! 4. composers by payload type, with every template instantiated once per candidate;
//!    candidates are validated once up front, so a malformed or orphaned one is rejected
//!    a single time
//!
//! A registration whose component does not match its claimed kind is rejected and the
//! rest of the table is still built.

use std::any::TypeId;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::adapters::{ComposeAny, HandleAny, ParseAny, ParseThenForward};
use super::component::Consumer;
use super::entry::{resolve_consumer, AnyComponent, ComponentKind, Registration, Shape};
use crate::core::PacketId;
use crate::error::{constants, ProtocolError};

/// A registration skipped during a rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: ComponentKind,
    /// Which entry, as `kind id=.. payload=.. order=..`
    pub entry: String,
    pub reason: String,
}

impl Rejection {
    fn new<K: PacketId>(registration: &Registration<K>, reason: impl Into<String>) -> Self {
        Self {
            kind: registration.kind(),
            entry: registration.describe(),
            reason: reason.into(),
        }
    }

    pub fn to_error(&self) -> ProtocolError {
        ProtocolError::RegistrationConflict(self.to_string())
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entry, self.reason)
    }
}

/// A composer together with the id written before its body
pub(crate) struct OutboundEntry<K> {
    pub(crate) id: K,
    pub(crate) composer: Arc<dyn ComposeAny>,
}

pub(crate) struct Tables<K> {
    pub(crate) consumers: HashMap<K, Arc<dyn Consumer>>,
    pub(crate) handlers: HashMap<TypeId, Arc<dyn HandleAny>>,
    pub(crate) parsers: HashMap<K, Arc<dyn ParseAny>>,
    pub(crate) composers: HashMap<TypeId, OutboundEntry<K>>,
    pub(crate) rejections: Vec<Rejection>,
}

impl<K: PacketId> Tables<K> {
    pub(crate) fn empty() -> Self {
        Self {
            consumers: HashMap::new(),
            handlers: HashMap::new(),
            parsers: HashMap::new(),
            composers: HashMap::new(),
            rejections: Vec::new(),
        }
    }

    #[instrument(level = "debug", skip_all, fields(entries = entries.len()))]
    pub(crate) fn build(entries: &[Registration<K>]) -> Self {
        let mut sorted: Vec<&Registration<K>> = entries.iter().collect();
        sorted.sort_by_key(|entry| Reverse(entry.order()));

        let mut builder = Builder {
            tables: Self::empty(),
            handler_components: HashMap::new(),
            confined_handlers: HashMap::new(),
            parser_ids: HashSet::new(),
        };

        let of = |kind: ComponentKind| sorted.iter().copied().filter(move |e| e.kind() == kind);

        for entry in of(ComponentKind::Consumer) {
            builder.add_consumer(entry);
        }
        for entry in of(ComponentKind::Handler) {
            builder.add_handler(entry);
        }
        for entry in of(ComponentKind::Parser) {
            builder.add_parser(entry);
        }
        let templates: HashSet<TypeId> = of(ComponentKind::Composer)
            .filter_map(|entry| entry.marker)
            .map(|marker| marker.id)
            .collect();
        let candidates: Vec<&Registration<K>> = of(ComponentKind::Capability)
            .filter(|candidate| builder.admit_candidate(candidate, &templates))
            .collect();
        for entry in of(ComponentKind::Composer) {
            builder.add_composer(entry, &candidates);
        }

        builder.tables
    }
}

struct Builder<'r, K> {
    tables: Tables<K>,
    /// Winning ordinary handler per payload type, kept for parse-then-handle pairing
    handler_components: HashMap<TypeId, &'r AnyComponent>,
    confined_handlers: HashMap<TypeId, &'r AnyComponent>,
    /// Ids already won by a parser of either shape
    parser_ids: HashSet<K>,
}

impl<'r, K: PacketId> Builder<'r, K> {
    fn reject(&mut self, entry: &Registration<K>, reason: impl Into<String>) {
        let rejection = Rejection::new(entry, reason);
        warn!(entry = %rejection.entry, reason = %rejection.reason, "Registration skipped");
        self.tables.rejections.push(rejection);
    }

    /// Capability candidates are checked once, before any template is instantiated
    fn admit_candidate(
        &mut self,
        candidate: &Registration<K>,
        templates: &HashSet<TypeId>,
    ) -> bool {
        let (Some(marker), Some(_), Some(_)) =
            (candidate.marker, candidate.instantiate, candidate.payload())
        else {
            self.reject(candidate, "capability needs a template and a payload to serve");
            return false;
        };
        if !templates.contains(&marker.id) {
            self.reject(candidate, "no template registered for capability");
            return false;
        }
        true
    }

    fn add_consumer(&mut self, entry: &'r Registration<K>) {
        let Some(id) = entry.id() else {
            return self.reject(entry, constants::ERR_MISSING_ID);
        };
        match resolve_consumer(&entry.component) {
            Some(consumer) => {
                self.tables.consumers.entry(id.clone()).or_insert(consumer);
            }
            None => self.reject(entry, "component is not a consumer"),
        }
    }

    fn add_handler(&mut self, entry: &'r Registration<K>) {
        let Some(payload) = entry.payload() else {
            return self.reject(entry, constants::ERR_MISSING_PAYLOAD);
        };
        match payload.shape {
            Shape::Confined { handler_ok, .. } => {
                if handler_ok(&entry.component) {
                    self.confined_handlers
                        .entry(payload.type_id())
                        .or_insert(&entry.component);
                } else {
                    self.reject(entry, "component is not a borrowed handler for its family");
                }
            }
            Shape::Owned { handler, .. } => match handler(&entry.component) {
                Some(resolved) => {
                    if !self.tables.handlers.contains_key(&payload.type_id()) {
                        self.tables.handlers.insert(payload.type_id(), resolved);
                        self.handler_components
                            .insert(payload.type_id(), &entry.component);
                    }
                }
                None => self.reject(entry, "component is not a handler for its payload"),
            },
        }
    }

    fn add_parser(&mut self, entry: &'r Registration<K>) {
        let (Some(id), Some(payload)) = (entry.id(), entry.payload()) else {
            return self.reject(entry, "parser needs an id and a payload type");
        };
        if self.parser_ids.contains(id) {
            debug!(entry = %entry.describe(), "Parser outranked for its id");
            return;
        }

        match payload.shape {
            Shape::Confined {
                parser_ok, adapter, ..
            } => {
                if !parser_ok(&entry.component) {
                    return self.reject(entry, "component is not a borrowed parser for its family");
                }
                let Some(handler) = self.confined_handlers.get(&payload.type_id()).copied() else {
                    return self.reject(entry, "no handler registered for stack-confined payload");
                };
                match adapter(&entry.component, handler) {
                    Some(consumer) => {
                        self.parser_ids.insert(id.clone());
                        self.tables.consumers.entry(id.clone()).or_insert(consumer);
                    }
                    None => self.reject(entry, "stack adapter could not be built"),
                }
            }
            Shape::Owned {
                parser,
                parse_then_handle,
                ..
            } => {
                let Some(resolved) = parser(&entry.component) else {
                    return self.reject(entry, "component is not a parser for its payload");
                };
                let consumer = match self.handler_components.get(&payload.type_id()) {
                    Some(handler) => parse_then_handle(&entry.component, handler),
                    None => None,
                }
                .unwrap_or_else(|| Arc::new(ParseThenForward::new(Arc::clone(&resolved))));

                self.parser_ids.insert(id.clone());
                self.tables.parsers.insert(id.clone(), resolved);
                self.tables.consumers.entry(id.clone()).or_insert(consumer);
            }
        }
    }

    fn add_composer(&mut self, entry: &'r Registration<K>, candidates: &[&'r Registration<K>]) {
        let Some(id) = entry.id() else {
            return self.reject(entry, constants::ERR_MISSING_ID);
        };

        if let Some(marker) = entry.marker {
            let mut instantiated = 0usize;
            for candidate in candidates.iter().filter(|c| c.marker == Some(marker)) {
                let (Some(payload), Some(instantiate)) = (candidate.payload(), candidate.instantiate)
                else {
                    continue;
                };
                match instantiate(&entry.component, &candidate.component) {
                    Some(composer) => {
                        instantiated += 1;
                        self.insert_composer(payload.type_id(), id, composer);
                    }
                    None => {
                        return self.reject(entry, "component is not the template its marker names");
                    }
                }
            }
            if instantiated == 0 {
                debug!(template = marker.name, "Composer template has no candidate, excluded");
            }
            return;
        }

        let Some(payload) = entry.payload() else {
            return self.reject(entry, constants::ERR_MISSING_PAYLOAD);
        };
        let resolved = match payload.shape {
            Shape::Owned { composer, .. } => composer(&entry.component),
            Shape::Confined { .. } => None,
        };
        match resolved {
            Some(composer) => self.insert_composer(payload.type_id(), id, composer),
            None => self.reject(entry, "component is not a composer for its payload"),
        }
    }

    fn insert_composer(&mut self, payload: TypeId, id: &K, composer: Arc<dyn ComposeAny>) {
        self.tables
            .composers
            .entry(payload)
            .or_insert_with(|| OutboundEntry {
                id: id.clone(),
                composer,
            });
    }
}
