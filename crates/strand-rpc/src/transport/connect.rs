//! Client-side connection establishment.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use strand_config::SocketEndpoint;
use tracing::debug;

use super::{ConnectError, ConnectionStream, TRANSPORT_TARGET};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

/// Connects to `endpoint`, giving up after `timeout`.
///
/// # Errors
///
/// Returns [`ConnectError`] when the address cannot be resolved or the
/// connection attempt fails.
pub fn connect(
    endpoint: &SocketEndpoint,
    timeout: Duration,
) -> Result<ConnectionStream, ConnectError> {
    let stream = match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address = resolve_tcp_address(host, *port).map_err(|source| ConnectError::Resolve {
                endpoint: endpoint.to_string(),
                source,
            })?;
            TcpStream::connect_timeout(&address, timeout)
                .map(ConnectionStream::Tcp)
                .map_err(|source| ConnectError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })?
        }
        SocketEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                connect_unix(path.as_str(), timeout).map_err(|source| ConnectError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })?
            }

            #[cfg(not(unix))]
            {
                let _ = path;
                return Err(ConnectError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                });
            }
        }
    };
    debug!(
        target: TRANSPORT_TARGET,
        endpoint = %endpoint,
        "connected"
    );
    Ok(stream)
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str, timeout: Duration) -> io::Result<ConnectionStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)?;
    let stream: UnixStream = socket.into();
    Ok(ConnectionStream::Unix(stream))
}
