//! TCP front end: accepts connections and dispatches framed command arrays
//! to the engine.
//!
//! The server is a thin adapter: parse a command array, call one of the
//! engine's three operations, serialize the reply. One thread per
//! connection; the engine itself is shared behind an `Arc` and does its own
//! locking.

use crate::resp::{self, Parse, Value};
use anyhow::Result;
use engine::Engine;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

pub struct Server {
    listener: TcpListener,
    engine: Arc<Engine>,
}

impl Server {
    /// Binds the listener; the engine must already be open.
    pub fn bind<A: ToSocketAddrs>(addr: A, engine: Arc<Engine>) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener, engine })
    }

    /// Address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop; runs until the listener fails.
    pub fn run(self) -> Result<()> {
        for conn in self.listener.incoming() {
            match conn {
                Ok(stream) => {
                    let engine = Arc::clone(&self.engine);
                    thread::spawn(move || {
                        if let Err(e) = handle_client(engine, stream) {
                            debug!("connection closed: {e:#}");
                        }
                    });
                }
                Err(e) => warn!("accept failed: {}", e),
            }
        }
        Ok(())
    }
}

/// Per-connection loop: buffer bytes, peel off complete frames, reply.
fn handle_client(engine: Arc<Engine>, mut stream: TcpStream) -> Result<()> {
    let peer = stream.peer_addr()?;
    debug!(%peer, "client connected");

    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        loop {
            match resp::parse(&buf) {
                Parse::Complete(command, consumed) => {
                    let reply = execute(&engine, command);
                    stream.write_all(&reply.serialize())?;
                    buf.drain(..consumed);
                }
                Parse::Incomplete => break,
                Parse::Invalid => {
                    let reply = Value::Error("ERR protocol error".into());
                    stream.write_all(&reply.serialize())?;
                    debug!(%peer, "dropping connection after protocol error");
                    return Ok(());
                }
            }
        }
    }

    debug!(%peer, "client disconnected");
    Ok(())
}

/// Maps one command array onto the engine.
fn execute(engine: &Engine, command: Value) -> Value {
    let Value::Array(items) = command else {
        return Value::Error("ERR invalid command format".into());
    };
    if items.is_empty() {
        return Value::Error("ERR empty command".into());
    }

    let mut args: Vec<Vec<u8>> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Bulk(bytes) => args.push(bytes),
            Value::Simple(s) => args.push(s.into_bytes()),
            _ => return Value::Error("ERR command arguments must be strings".into()),
        }
    }

    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match name.as_str() {
        "SET" => {
            if args.len() < 3 {
                return Value::Error("ERR wrong number of arguments for 'SET'".into());
            }
            match engine.set(&args[1], &args[2]) {
                Ok(()) => Value::Simple("OK".into()),
                Err(e) => Value::Error(format!("ERR {}", e)),
            }
        }
        "GET" => {
            if args.len() < 2 {
                return Value::Error("ERR wrong number of arguments for 'GET'".into());
            }
            match engine.get(&args[1]) {
                Some(value) => Value::Bulk(value),
                None => Value::NullBulk,
            }
        }
        "DEL" => {
            if args.len() < 2 {
                return Value::Error("ERR wrong number of arguments for 'DEL'".into());
            }
            match engine.del(&args[1]) {
                Ok(()) => Value::Integer(1),
                Err(_) => Value::Integer(0),
            }
        }
        other => Value::Error(format!("ERR unknown command '{}'", other)),
    }
}
