// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # atomspace-hub
//!
//! Hosts several named, in-memory atomspaces in one process and answers
//! pattern-matching queries against them over one WebSocket per space.
//!
//! ## Architecture
//!
//! - **Atom store** (`atom`): deduplicated nodes and links, Atomese reader,
//!   pattern matcher with realized and deferred result shapes
//! - **Registry** (`space`): id → space ownership, insertion-ordered listing
//! - **Ingestion** (`ingest`): settings-driven loading from files and directories
//! - **Normalizer** (`query`): query text in, ordered rendered records out
//! - **Server** (`server`): per-space WebSocket endpoints and read-only metadata
//!
//! ## Library usage
//!
//! ```no_run
//! use atomspace_hub::atom::AtomSpace;
//! use atomspace_hub::atom::sexpr::decode_str;
//! use atomspace_hub::space::SpaceRegistry;
//!
//! let registry = SpaceRegistry::new();
//! let store = AtomSpace::new();
//! decode_str(r#"(InheritanceLink (ConceptNode "cat") (ConceptNode "animal"))"#, "inline", &store).unwrap();
//! registry.create_space("zoo", store).unwrap();
//!
//! let records = registry
//!     .execute("zoo", r#"(GetLink (InheritanceLink (VariableNode "$x") (ConceptNode "animal")))"#, None)
//!     .unwrap();
//! assert_eq!(records, vec![r#"(ConceptNode "cat")"#]);
//! ```

pub mod atom;
pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod server;
pub mod space;
