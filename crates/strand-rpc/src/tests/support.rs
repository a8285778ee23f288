//! Shared fixtures for the RPC behavioural suites.

use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use strand_config::WireFraming;

use crate::codec::{ValueReader, ValueWriter, value_reader, value_writer};
use crate::rpc::{HandlerError, MethodRouter, Response, RpcHandler, RpcPeer};
use crate::transport::ConnectionStream;

/// Upper bound on any single wait in the suites.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Opens a connected pair of TCP streams on the loopback interface.
pub fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");
    let client = TcpStream::connect(addr).expect("connect loopback");
    let (server, _) = listener.accept().expect("accept loopback");
    (client, server)
}

/// Hand-driven end of a connection, used to play a misbehaving peer.
pub struct ScriptedPeer {
    stream: TcpStream,
    reader: Box<dyn ValueReader>,
    writer: Box<dyn ValueWriter>,
}

impl ScriptedPeer {
    pub fn new(stream: TcpStream) -> Self {
        stream
            .set_read_timeout(Some(PATIENCE))
            .expect("set read timeout");
        let reader = value_reader(
            stream.try_clone().expect("clone stream"),
            WireFraming::JsonStream,
        );
        let writer = value_writer(
            stream.try_clone().expect("clone stream"),
            WireFraming::JsonStream,
        );
        Self {
            stream,
            reader,
            writer,
        }
    }

    pub fn read(&mut self) -> Value {
        self.reader
            .next_value()
            .expect("read value")
            .expect("peer sent a value")
    }

    pub fn write(&mut self, value: &Value) {
        self.writer.write_value(value).expect("write value");
    }

    pub fn reply(&mut self, id: &Value, result: Value) {
        self.write(&json!({"jsonrpc": "2.0", "result": result, "id": id}));
    }

    pub fn hang_up(&self) {
        self.stream
            .shutdown(std::net::Shutdown::Both)
            .expect("shut down scripted peer");
    }
}

/// Handler that forwards unsolicited responses and notifications to channels.
pub struct Recorder {
    router: MethodRouter,
    unsolicited: Mutex<Sender<Response>>,
    notifications: Mutex<Sender<(String, Value)>>,
}

/// Receiving ends paired with a [`Recorder`].
pub struct Recordings {
    pub unsolicited: Receiver<Response>,
    pub notifications: Receiver<(String, Value)>,
}

impl Recorder {
    pub fn new(router: MethodRouter) -> (Arc<Self>, Recordings) {
        let (unsolicited_tx, unsolicited) = mpsc::channel();
        let (notification_tx, notifications) = mpsc::channel();
        let recorder = Arc::new(Self {
            router,
            unsolicited: Mutex::new(unsolicited_tx),
            notifications: Mutex::new(notification_tx),
        });
        (
            recorder,
            Recordings {
                unsolicited,
                notifications,
            },
        )
    }
}

impl RpcHandler for Recorder {
    fn handle_request(
        &self,
        peer: &RpcPeer,
        method: &str,
        params: Value,
    ) -> Result<Value, HandlerError> {
        self.router.handle_request(peer, method, params)
    }

    fn handle_notification(
        &self,
        _peer: &RpcPeer,
        method: &str,
        params: Value,
    ) -> Result<(), HandlerError> {
        self.notifications
            .lock()
            .expect("notification sender")
            .send((method.to_owned(), params))
            .map_err(|error| HandlerError::new(error.to_string()))
    }

    fn on_unsolicited_response(&self, _peer: &RpcPeer, response: Response) {
        drop(
            self.unsolicited
                .lock()
                .expect("unsolicited sender")
                .send(response),
        );
    }

    fn on_connect(&self, peer: &RpcPeer) {
        RpcHandler::on_connect(&self.router, peer);
    }
}

/// Router answering the requests used across the suites.
pub fn test_router() -> MethodRouter {
    MethodRouter::new()
        .request("echo", |_, params| Ok(params))
        .request("boom", |_, _| Err(HandlerError::new("bad input")))
        .request("panic", |_, _| panic!("handler exploded"))
        .request("sleep", |_, params| {
            let millis = params.get(0).and_then(Value::as_u64).unwrap_or(0);
            std::thread::sleep(Duration::from_millis(millis));
            Ok(Value::Null)
        })
}

/// Wraps a loopback stream for the runtime.
pub fn stream(tcp: TcpStream) -> ConnectionStream {
    ConnectionStream::from(tcp)
}

/// Polls `condition` until it holds or [`PATIENCE`] elapses.
pub fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
