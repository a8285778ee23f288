//! Accept loop that turns a socket listener into a stream of connections.

use std::convert::Infallible;
use std::io;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::transport::{ConnectionStream, SocketListener};
use crate::worker::WorkerContext;

use super::{CONNECTION_TARGET, Connection, ReadLoop};

const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// [`Connection`] whose values are accepted client streams.
pub type ListenerConnection<D> = Connection<ListenerSource, D>;

/// Polls a non-blocking [`SocketListener`] for clients.
///
/// Shutdown is noticed within one poll interval; the listener is closed
/// before the sequence ends so no further clients can connect.
#[derive(Debug)]
pub struct ListenerSource {
    listener: Option<SocketListener>,
    poll_interval: Duration,
    last_error: Option<io::ErrorKind>,
}

impl ListenerSource {
    /// Wraps `listener`, sleeping `poll_interval` between idle polls.
    #[must_use]
    pub fn new(listener: SocketListener, poll_interval: Duration) -> Self {
        Self {
            listener: Some(listener),
            poll_interval,
            last_error: None,
        }
    }
}

impl ReadLoop for ListenerSource {
    type Value = ConnectionStream;
    type Error = Infallible;

    fn next_value(
        &mut self,
        worker: &WorkerContext,
    ) -> Result<Option<ConnectionStream>, Infallible> {
        loop {
            let Some(listener) = self.listener.as_ref() else {
                return Ok(None);
            };
            if worker.is_shutdown_requested() {
                debug!(
                    target: CONNECTION_TARGET,
                    endpoint = %listener.endpoint(),
                    "closing listener"
                );
                self.listener = None;
                return Ok(None);
            }
            match listener.accept() {
                Ok(Some(stream)) => {
                    self.last_error = None;
                    return Ok(Some(stream));
                }
                Ok(None) => thread::sleep(self.poll_interval),
                Err(error) => {
                    let kind = error.kind();
                    if self.last_error != Some(kind) {
                        warn!(
                            target: CONNECTION_TARGET,
                            endpoint = %listener.endpoint(),
                            error = %error,
                            "socket accept error"
                        );
                    }
                    self.last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;
    use std::sync::{Arc, Mutex, mpsc};
    use std::time::Instant;

    use rstest::rstest;
    use strand_config::SocketEndpoint;

    use super::*;
    use crate::worker::Worker;

    #[rstest]
    fn dispatches_each_accepted_client_and_stops_on_shutdown() {
        let listener = SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0))
            .expect("bind listener");
        let addr = listener.local_addr().expect("listener address");
        let (sender, receiver) = mpsc::channel();
        let sender = Mutex::new(sender);
        let dispatcher = Arc::new(move |_: &WorkerContext, stream: ConnectionStream| {
            let sender = sender.lock().expect("sender lock");
            sender.send(stream.peer_label()).expect("record client");
        });

        let worker = ListenerConnection::new(
            ListenerSource::new(listener, Duration::from_millis(10)),
            dispatcher,
        )
        .spawn(Worker::builder("listener"))
        .expect("spawn listener");

        let _first = TcpStream::connect(addr).expect("connect first client");
        let _second = TcpStream::connect(addr).expect("connect second client");
        for _ in 0..2 {
            let label = receiver
                .recv_timeout(Duration::from_secs(2))
                .expect("client dispatched");
            assert!(label.starts_with("tcp://127.0.0.1"));
        }

        let started = Instant::now();
        worker.shutdown();
        worker.join().expect("join listener");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(
            TcpStream::connect(addr).is_err(),
            "listener socket must be closed after shutdown"
        );
    }
}
