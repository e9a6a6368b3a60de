//! nativerpc Common Types and Transport
//!
//! This crate provides the schema catalogue, serializer and HTTP transport
//! layer shared by the nativerpc server and client.
//!
//! # Overview
//!
//! nativerpc lets a process expose a typed service over a local HTTP/1.1
//! transport and lets peer processes invoke its methods as if they were
//! ordinary in-process calls. This crate contains the pieces both ends need:
//!
//! - **Schema Layer**: the parsed schema catalogue, the per-type field
//!   layouts derived from it, and the serializer that round-trips instances
//!   between the flat layout and the JSON wire form
//! - **Transport Layer**: HTTP/1.1 request/response framing over raw TCP
//!   with keep-alive and pipelining support
//!
//! # Components
//!
//! - [`schema`] - Schema entries, type registry and serializer
//! - [`transport`] - HTTP framing, frame buffer and synchronous round trips
//! - [`error`] - The [`RpcError`] type shared by all crates
//! - [`config`] - Server and client options objects
//! - [`identity`] - Process identity advertised on connect
//!
//! # Example
//!
//! ```
//! use nativerpc_common::schema::{SchemaEntry, Serializer, TypeRegistry};
//! use serde_json::json;
//! use std::rc::Rc;
//!
//! let entries = vec![
//!     SchemaEntry::field("Msg", "a", "int"),
//!     SchemaEntry::field("Msg", "b", "str"),
//! ];
//! let registry = Rc::new(TypeRegistry::from_entries(entries).unwrap());
//! let serializer = Serializer::new(registry);
//!
//! let mut instance = serializer.create_instance("Msg").unwrap();
//! serializer.from_json("Msg", &json!({"a": 7, "b": "hi"}), &mut instance).unwrap();
//! assert_eq!(serializer.to_json("Msg", &instance).unwrap(), json!({"a": 7, "b": "hi"}));
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod schema;
pub mod transport;

pub use config::{ClientOptions, ServerOptions};
pub use error::{Result, RpcError};
pub use identity::{process_identity, ProcessIdentity};
