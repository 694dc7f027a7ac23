//! Minimal HTTP/1.1 CouchDB double for integration tests.
//!
//! Serves `GET /{db}/{id}` and `PUT /{db}/{id}` over an in-memory map with
//! CouchDB revision rules: a write must carry the current `_rev` (or none for
//! a new document), otherwise it gets 409.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct CouchServerOptions {
    /// Number of initial PUTs answered with 500 before writes are accepted.
    pub failing_puts: u32,
}

#[derive(Default)]
struct State {
    docs: Mutex<HashMap<String, Value>>,
    failing_puts: AtomicU32,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

/// Handle to a running server. The server runs until the process exits.
pub struct CouchServer {
    /// Base URL, e.g. "http://127.0.0.1:12345/".
    pub url: String,
    state: Arc<State>,
}

impl CouchServer {
    pub fn doc(&self, id: &str) -> Option<Value> {
        self.state.docs.lock().unwrap().get(id).cloned()
    }

    pub fn gets(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.state.puts.load(Ordering::SeqCst)
    }
}

pub fn start() -> CouchServer {
    start_with_options(CouchServerOptions::default())
}

pub fn start_with_options(opts: CouchServerOptions) -> CouchServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(State {
        failing_puts: AtomicU32::new(opts.failing_puts),
        ..State::default()
    });
    let server_state = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&server_state);
            thread::spawn(move || handle(stream, &state));
        }
    });
    CouchServer {
        url: format!("http://127.0.0.1:{}/", port),
        state,
    }
}

/// Returns a base URL on which nothing listens.
pub fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/", port)
}

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = std::str::from_utf8(&buf[..header_end]).ok()?.to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Some(Request { method, path, body })
}

fn respond(stream: &mut TcpStream, status: &str, body: &Value) {
    let body = body.to_string();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

fn revision(generation: u64, doc: &Value) -> String {
    let digest = hex::encode(Sha256::digest(doc.to_string().as_bytes()));
    format!("{}-{}", generation, &digest[..32])
}

fn generation(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(g, _)| g.parse().ok())
        .unwrap_or(0)
}

fn handle(mut stream: TcpStream, state: &State) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    // "/{db}/{id}"
    let id = request.path.rsplit('/').next().unwrap_or("").to_string();

    match request.method.as_str() {
        "GET" => {
            state.gets.fetch_add(1, Ordering::SeqCst);
            let doc = state.docs.lock().unwrap().get(&id).cloned();
            match doc {
                Some(doc) => respond(&mut stream, "200 OK", &doc),
                None => respond(
                    &mut stream,
                    "404 Object Not Found",
                    &json!({"error": "not_found", "reason": "missing"}),
                ),
            }
        }
        "PUT" => {
            state.puts.fetch_add(1, Ordering::SeqCst);
            let failing = state
                .failing_puts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                respond(
                    &mut stream,
                    "500 Internal Server Error",
                    &json!({"error": "unknown_error", "reason": "injected"}),
                );
                return;
            }
            let Ok(mut doc) = serde_json::from_slice::<Value>(&request.body) else {
                respond(
                    &mut stream,
                    "400 Bad Request",
                    &json!({"error": "bad_request", "reason": "invalid json"}),
                );
                return;
            };
            let mut docs = state.docs.lock().unwrap();
            let current = docs
                .get(&id)
                .and_then(|d| d.get("_rev"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let sent = doc.get("_rev").and_then(Value::as_str).map(str::to_string);
            if current != sent {
                respond(
                    &mut stream,
                    "409 Conflict",
                    &json!({"error": "conflict", "reason": "Document update conflict."}),
                );
                return;
            }
            let next = current.as_deref().map(generation).unwrap_or(0) + 1;
            let rev = revision(next, &doc);
            doc["_id"] = json!(id);
            doc["_rev"] = json!(rev);
            docs.insert(id.clone(), doc);
            drop(docs);
            respond(
                &mut stream,
                "201 Created",
                &json!({"ok": true, "id": id, "rev": rev}),
            );
        }
        _ => respond(
            &mut stream,
            "405 Method Not Allowed",
            &json!({"error": "method_not_allowed", "reason": "Only GET and PUT"}),
        ),
    }
}
