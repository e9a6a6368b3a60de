//! nativerpc Server
//!
//! This crate provides the server side of the nativerpc runtime: a
//! single-threaded readiness loop that multiplexes many keep-alive client
//! connections, frames their HTTP requests, and dispatches them to service
//! methods by route.
//!
//! # Overview
//!
//! A server owns the listening socket and a table of peer [`Connection`]s.
//! Each loop iteration reclaims expired closed connections, waits up to
//! 500 ms for socket readiness, accepts new peers, reads one chunk per
//! ready connection, and dispatches every fully framed request in arrival
//! order. Exactly one request is in flight at any time.
//!
//! User services implement [`RpcService`] and are invoked by method index
//! (declaration order). The built-in `Metadata` service (`connectClient`,
//! `getMetadata`, `closeClient`) is registered alongside them and dispatched
//! by direct reference.
//!
//! # Example
//!
//! ```no_run
//! use nativerpc_common::schema::SchemaEntry;
//! use nativerpc_common::{Result, ServerOptions};
//! use nativerpc_server::{RpcService, Server};
//! use serde_json::{json, Value};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! struct Echo;
//!
//! impl RpcService for Echo {
//!     fn invoke(&mut self, _method_index: usize, request: Value) -> Result<Value> {
//!         Ok(request)
//!     }
//! }
//!
//! let entries = vec![SchemaEntry::method("Echo", "echo", "dict", "dict")];
//! let options = ServerOptions::new("Echo", "EchoService", "127.0.0.1", 9301);
//! let mut server = Server::new(options, entries, Rc::new(RefCell::new(Echo))).unwrap();
//! server.listen().unwrap();
//! ```

pub mod connection;
pub mod server;
pub mod service;

pub use connection::{Connection, ConnectionTable, CLOSED_GRACE_MS, MAX_CONNECTIONS};
pub use server::Server;
pub use service::{BuiltinMethod, MethodTable, MethodTarget, RpcService};
