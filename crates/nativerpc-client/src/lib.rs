//! nativerpc Client
//!
//! This crate provides the client side of the nativerpc runtime: one
//! keep-alive connection to a server, an identity handshake on connect, and
//! a typed proxy over the target service's methods.
//!
//! # Overview
//!
//! A client builds the same schema registry as the server, dials the
//! configured host, and issues a synchronous `Metadata.connectClient`
//! handshake advertising its process identity. Calls on the proxy marshal
//! the argument to JSON through the method's request layout, POST it over
//! the connection, and demarshal the reply through the response layout.
//!
//! # Usage
//!
//! ```rust,no_run
//! use nativerpc_client::RpcClient;
//! use nativerpc_common::schema::SchemaEntry;
//! use nativerpc_common::ClientOptions;
//! use serde_json::json;
//!
//! fn main() -> nativerpc_common::Result<()> {
//!     let entries = vec![
//!         SchemaEntry::field("Msg", "a", "int"),
//!         SchemaEntry::method("Calc", "add", "Msg", "Msg"),
//!     ];
//!     let options = ClientOptions::new("Calc", "127.0.0.1", 9301);
//!     let mut client = RpcClient::connect(options, entries)?;
//!
//!     let reply = client.call("add", json!({"a": 7}))?;
//!     println!("{reply}");
//!     client.close()?;
//!     Ok(())
//! }
//! ```

pub mod client;

pub use client::RpcClient;
