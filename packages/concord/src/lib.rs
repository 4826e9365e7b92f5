#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! # concord
//!
//! Measure named events across many threads, then agree with every other process of a
//! distributed run on one id for each distinct event name.
//!
//! The crate has two halves:
//!
//! * A [`Registry`] that hands out an [`EventHandle`] for every distinct event name and keeps
//!   running statistics (count, min, max, mean, standard deviation) of the values observed for
//!   each event, separately per thread.
//! * A collective unification protocol ([`unify()`]) that merges the event names of every
//!   participating process ("rank") over a binomial tree and gives each rank a
//!   [`GlobalMapping`] from its local event ids to ids shared by all ranks.
//!
//! # Recording observations
//!
//! ```
//! use concord::Registry;
//!
//! let registry = Registry::new();
//!
//! let bytes_sent = registry.register_event("bytes_sent");
//!
//! registry.trigger_event(&bytes_sent, 1500);
//! registry.trigger_event(&bytes_sent, 500);
//!
//! let statistics = registry.current_thread_statistics(&bytes_sent).unwrap();
//! assert_eq!(statistics.count(), 2);
//! assert_eq!(statistics.max(), Some(1500.0));
//! ```
//!
//! Registering the same name again returns the same event, so instrumentation at different
//! call sites can share it without coordination.
//!
//! # Call path context
//!
//! The same event reached through different callers can be told apart. The registry derives a
//! context event for every distinct combination of the innermost enclosing frames (by default
//! two) and records the observation both there and on the base event.
//!
//! ```
//! use concord::Registry;
//!
//! let registry = Registry::new();
//!
//! let main = registry.register_event("main");
//! let solve = registry.register_event("solve");
//! let allocated = registry.register_event("bytes_allocated");
//!
//! let context = registry
//!     .trigger_in_context(&allocated, &[main, solve], 4096)
//!     .unwrap();
//!
//! assert_eq!(context.name(), "main => solve => bytes_allocated");
//! ```
//!
//! # Unifying event ids across ranks
//!
//! Ranks talk through a [`Transport`]. The crate ships [`LocalTransport`], which connects ranks
//! running as threads of one process; other transports (for example over a cluster message
//! passing library) implement the same trait.
//!
//! ```
//! use concord::{LocalTransport, Registry, Transport, unify};
//!
//! let mappings = LocalTransport::run_ranks(3, |transport| {
//!     let registry = Registry::new();
//!     registry.register_event("shared");
//!     registry.register_event(&format!("only_on_{}", transport.rank()));
//!
//!     unify(&registry, transport).unwrap()
//! });
//!
//! // "shared" is local id 0 everywhere and has the same global id everywhere.
//! let shared = mappings[0].global_id(0);
//! assert!(mappings.iter().all(|mapping| mapping.global_id(0) == shared));
//! assert_eq!(mappings[0].global_count(), 4);
//! ```
//!
//! Global ids follow the ascending byte order of the names, so they do not depend on which
//! ranks observed an event, the order in which they registered it or the number of ranks.
//!
//! Independent id spaces are kept apart with a [`NamespaceId`]. Use [`unify_all()`] to unify
//! several registries of different namespaces in one call.
//!
//! # Failure
//!
//! If any rank fails during unification, for example because it receives a malformed table,
//! every rank returns an [`Error`] and none of them produces a mapping.

mod callpath;
mod error;
mod event;
mod identity;
mod local_transport;
mod mapping;
mod merge;
mod namespace;
mod registry;
mod registry_builder;
mod report;
mod sorted_table;
mod statistics;
mod threshold;
mod transport;
mod tree;
mod unify;
mod wire;

pub use callpath::*;
pub use error::*;
pub use event::*;
pub use identity::*;
pub use local_transport::*;
pub use mapping::*;
pub(crate) use merge::*;
pub use namespace::*;
pub use registry::*;
pub use registry_builder::*;
pub use report::*;
pub use sorted_table::*;
pub use statistics::*;
pub use threshold::*;
pub use transport::*;
pub use tree::*;
pub use unify::*;
pub use wire::MessageKind;
