//! Runnable calculator service.
//!
//! Start the server:
//!
//! ```bash
//! cargo run -p nativerpc-server --example calc
//! ```
//!
//! Then call it from another shell:
//!
//! ```bash
//! curl -s -X POST http://127.0.0.1:9301/Calc/add \
//!   -H 'Content-Type: application/json' \
//!   -d '{"a":7,"b":"hi","c":false}'
//! ```

use nativerpc_common::schema::SchemaEntry;
use nativerpc_common::{Result, RpcError, ServerOptions};
use nativerpc_server::{RpcService, Server};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Serialize, Deserialize)]
struct Msg {
    a: i32,
    b: String,
    c: bool,
}

struct Calc;

impl Calc {
    fn add(&mut self, msg: Msg) -> Msg {
        Msg {
            a: msg.a + 1,
            b: format!("{}!", msg.b),
            c: !msg.c,
        }
    }
}

impl RpcService for Calc {
    fn invoke(&mut self, method_index: usize, request: Value) -> Result<Value> {
        match method_index {
            0 => {
                let msg: Msg = serde_json::from_value(request)?;
                Ok(serde_json::to_value(self.add(msg))?)
            }
            _ => Err(RpcError::FailedToRoute(format!("Calc#{method_index}"))),
        }
    }
}

fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let entries = vec![
        SchemaEntry::field("Msg", "a", "int"),
        SchemaEntry::field("Msg", "b", "str"),
        SchemaEntry::field("Msg", "c", "bool"),
        SchemaEntry::method("Calc", "add", "Msg", "Msg"),
    ];
    let options = ServerOptions::new("Calc", "CalcService", "127.0.0.1", 9301);
    let mut server = Server::new(options, entries, Rc::new(RefCell::new(Calc)))?;
    server.listen()
}
