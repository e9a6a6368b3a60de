// Integration tests for nativerpc-server
//
// Each test starts a real server on an ephemeral port in a background
// thread, then drives it with the nativerpc client or a raw TCP socket.

use nativerpc_client::RpcClient;
use nativerpc_common::schema::SchemaEntry;
use nativerpc_common::transport::{FrameBuffer, HttpRequest};
use nativerpc_common::{ClientOptions, Result, RpcError, ServerOptions};
use nativerpc_server::{RpcService, Server};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Msg {
    a: i32,
    b: String,
    c: bool,
}

/// Calculator service: add(Msg) -> Msg bumps the int, appends to the
/// string and flips the bool.
struct Calc;

impl RpcService for Calc {
    fn invoke(&mut self, method_index: usize, request: Value) -> Result<Value> {
        match method_index {
            0 => {
                let msg: Msg = serde_json::from_value(request)?;
                let reply = Msg {
                    a: msg.a + 1,
                    b: format!("{}!", msg.b),
                    c: !msg.c,
                };
                Ok(serde_json::to_value(reply)?)
            }
            _ => Err(RpcError::FailedToRoute(format!("Calc#{method_index}"))),
        }
    }
}

fn calc_entries() -> Vec<SchemaEntry> {
    vec![
        SchemaEntry::field("Msg", "a", "int"),
        SchemaEntry::field("Msg", "b", "str"),
        SchemaEntry::field("Msg", "c", "bool"),
        SchemaEntry::method("Calc", "add", "Msg", "Msg"),
    ]
}

/// Starts a calculator server in a background thread and returns its port.
fn start_calc_server() -> u16 {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let options = ServerOptions::new("Calc", "CalcService", "127.0.0.1", 0);
        let mut server =
            Server::new(options, calc_entries(), Rc::new(RefCell::new(Calc))).expect("server");
        server.bind().expect("bind");
        tx.send(server.local_port()).expect("send port");
        server.listen().expect("listen");
    });
    rx.recv().expect("server port")
}

fn connect_client(port: u16, project_id: &str) -> RpcClient {
    let options = ClientOptions::new("Calc", "127.0.0.1", port);
    let identity = nativerpc_common::process_identity().with_project(project_id);
    RpcClient::connect_with_identity(options, calc_entries(), identity).expect("connect")
}

fn raw_post(port: u16, class_name: &str, method_name: &str, body: &str) -> Vec<u8> {
    HttpRequest {
        class_name,
        method_name,
        host: "127.0.0.1",
        port,
        project_id: "raw",
        sender_id: "call",
        server_id: None,
        body: body.as_bytes(),
    }
    .to_bytes()
}

#[test]
fn test_end_to_end_rpc() {
    let port = start_calc_server();
    let mut client = connect_client(port, "alpha");
    assert!(client.connection_id() >= 1);

    let reply = client
        .call("add", json!({"a": 7, "b": "hi", "c": false}))
        .unwrap();
    assert_eq!(reply, json!({"a": 8, "b": "hi!", "c": true}));

    let typed: Msg = client
        .call_as(
            "add",
            &Msg {
                a: 1,
                b: "x".to_string(),
                c: true,
            },
        )
        .unwrap();
    assert_eq!(
        typed,
        Msg {
            a: 2,
            b: "x!".to_string(),
            c: false,
        }
    );

    client.close().unwrap();
}

#[test]
fn test_sequential_calls_reuse_connection() {
    let port = start_calc_server();
    let mut client = connect_client(port, "alpha");
    let first_id = client.connection_id();

    for n in 0..5 {
        let reply = client
            .call("add", json!({"a": n, "b": "m", "c": false}))
            .unwrap();
        assert_eq!(reply["a"], n + 1);
    }
    assert_eq!(client.connection_id(), first_id);
    client.close().unwrap();
}

#[test]
fn test_unknown_method_fails_locally() {
    let port = start_calc_server();
    let mut client = connect_client(port, "alpha");
    let result = client.call("missing", json!({}));
    assert!(matches!(result, Err(RpcError::FailedToRoute(_))));
    client.close().unwrap();
}

#[test]
fn test_unknown_route_returns_504_and_closes() {
    let port = start_calc_server();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .write_all(&raw_post(port, "Calc", "missing", "{}"))
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 504 Remote error:"));
    assert!(response.contains("Content-Type: application/problem+json"));
    assert!(response.contains(r#""error":"Failed to route"#));
}

#[test]
fn test_non_post_method_rejected() {
    let port = start_calc_server();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .write_all(b"GET /Calc/add HTTP/1.1\r\nHost: h\r\nContent-Length: 0\r\n\r\n")
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 504 Remote error:"));
    assert!(response.contains("Only accepting POST"));
}

#[test]
fn test_malformed_body_rejected() {
    let port = start_calc_server();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .write_all(&raw_post(port, "Calc", "add", "{not json"))
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 504 Remote error:"));
}

#[test]
fn test_metadata_lists_peers_in_id_order() {
    let port = start_calc_server();
    let mut alpha = connect_client(port, "alpha");
    let mut beta = connect_client(port, "beta");
    let mut probe = connect_client(port, "nativerpc");

    let metadata = alpha.get_metadata().unwrap();
    let infos = metadata["clientInfos"].as_array().unwrap();
    let projects: Vec<&str> = infos
        .iter()
        .map(|info| info["projectId"].as_str().unwrap())
        .collect();
    // The runtime's own probe is excluded; the rest are ordered by id.
    assert_eq!(projects, vec!["alpha", "beta"]);

    let ids: Vec<i64> = infos
        .iter()
        .map(|info| info["connectionId"].as_i64().unwrap())
        .collect();
    assert_eq!(ids[0], alpha.connection_id());
    assert_eq!(ids[1], beta.connection_id());

    assert_eq!(metadata["clientCounts"][0], 3);
    assert_eq!(metadata["clientCounts"][2], 2);
    assert!(metadata["schemaList"].as_array().unwrap().len() >= calc_entries().len());
    assert_eq!(metadata["port"], port);

    probe.close().unwrap();
    beta.close().unwrap();
    alpha.close().unwrap();
}

#[test]
fn test_connect_records_identity() {
    let port = start_calc_server();
    let mut alpha = connect_client(port, "alpha");

    let metadata = alpha.get_metadata().unwrap();
    let info = &metadata["clientInfos"][0];
    assert_eq!(info["projectId"], "alpha");
    assert_eq!(info["processId"], std::process::id().to_string());
    assert_eq!(info["senderId"], "call");
    assert_eq!(info["callId"], "/Metadata/getMetadata");
    assert!(info["messageCount"].as_u64().unwrap() >= 2);

    alpha.close().unwrap();
}

#[test]
fn test_close_is_observable_then_reclaimed() {
    let port = start_calc_server();
    let mut watcher = connect_client(port, "watcher");
    let mut closing = connect_client(port, "closing");
    let closing_id = closing.connection_id();

    closing.close().unwrap();
    closing.close().unwrap();
    thread::sleep(Duration::from_millis(300));

    let metadata = watcher.get_metadata().unwrap();
    let entry = metadata["clientInfos"]
        .as_array()
        .unwrap()
        .iter()
        .find(|info| info["connectionId"].as_i64() == Some(closing_id))
        .cloned()
        .expect("closed connection still listed inside the grace window");
    assert_eq!(entry["closed"], true);
    assert_eq!(entry["active"], false);

    thread::sleep(Duration::from_millis(5300));
    let metadata = watcher.get_metadata().unwrap();
    let gone = metadata["clientInfos"]
        .as_array()
        .unwrap()
        .iter()
        .all(|info| info["connectionId"].as_i64() != Some(closing_id));
    assert!(gone, "closed connection reclaimed after the grace window");

    watcher.close().unwrap();
}

#[test]
fn test_pipelined_requests_answered_in_order() {
    let port = start_calc_server();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

    let mut bytes = raw_post(port, "Calc", "add", r#"{"a":1,"b":"x","c":false}"#);
    bytes.extend(raw_post(port, "Calc", "add", r#"{"a":2,"b":"y","c":false}"#));
    stream.write_all(&bytes).unwrap();

    let mut frames = FrameBuffer::new();
    let mut replies: Vec<Value> = Vec::new();
    let mut chunk = [0u8; 4096];
    while replies.len() < 2 {
        let received = stream.read(&mut chunk).unwrap();
        assert!(received > 0, "server hung up before both replies arrived");
        frames.extend(&chunk[..received]);
        while let Some(frame) = frames.next_frame().unwrap() {
            assert!(frame.head.starts_with("HTTP/1.1 200 OK"));
            replies.push(serde_json::from_slice(&frame.body).unwrap());
        }
    }

    assert_eq!(replies[0], json!({"a": 2, "b": "x!", "c": true}));
    assert_eq!(replies[1], json!({"a": 3, "b": "y!", "c": true}));
}
