//! UDP read loop feeding the dispatcher.

use std::future::Future;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{info, trace, warn};

use edgescale_dispatch::Dispatcher;

/// Read buffer size. Longer datagrams are truncated by the socket.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Receive datagrams and submit each non-empty one until `stop` resolves.
///
/// A full lane blocks the loop (backpressure); read errors are logged and
/// the loop carries on. Returns the number of datagrams submitted.
pub async fn serve<F>(socket: &UdpSocket, dispatcher: &Dispatcher, stop: F) -> u64
where
    F: Future<Output = ()>,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut submitted = 0u64;
    tokio::pin!(stop);

    if let Ok(addr) = socket.local_addr() {
        info!(%addr, "udp listener started");
    }

    loop {
        tokio::select! {
            _ = &mut stop => {
                info!(submitted, "udp listener stopping");
                break;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((0, _)) => continue,
                Ok((len, peer)) => {
                    let datagram = Bytes::copy_from_slice(&buf[..len]);
                    match dispatcher.submit(datagram).await {
                        Ok(lane) => {
                            submitted += 1;
                            trace!(%peer, len, lane, "datagram queued");
                        }
                        Err(e) => warn!(%peer, error = %e, "datagram dropped"),
                    }
                }
                Err(e) => warn!(error = %e, "udp read failed"),
            },
        }
    }

    submitted
}
