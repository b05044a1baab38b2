/*! Helpers for framed TCP connections.

All nodes talk in the same request/response style: connect, send one frame,
read one frame, close. Every step is bounded by a timeout.
*/

use std::future::Future;
use std::io::Error as IoError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::{self, error::Elapsed};
use tokio_util::codec::Framed;

use crate::codec::*;
use crate::stats::Stats;

/// Default timeout for a single connect, read or write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of simultaneous connections of a listener.
pub const DEFAULT_CONNECTIONS_LIMIT: usize = 512;

/// TCP connection wrapped with `FrameCodec`.
pub type FramedStream = Framed<TcpStream, FrameCodec>;

/// Error that can happen while talking to another node.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Connection can't be established.
    #[error("Failed to connect to {}", addr)]
    ConnectFailed {
        /// Address of the peer.
        addr: SocketAddr,
        /// Connect error.
        #[source]
        error: IoError,
    },
    /// Peer did not respond in time.
    #[error("Timeout error")]
    Timeout(Elapsed),
    /// Peer closed the connection before sending a whole frame.
    #[error("Connection closed by peer")]
    Closed,
    /// Frame can't be read.
    #[error("Read frame error")]
    Read(DecodeError),
    /// Frame can't be written.
    #[error("Write frame error")]
    Write(EncodeError),
}

/// Establish TCP connection with `addr` within `timeout`.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, NetworkError> {
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Err(e) => Err(NetworkError::Timeout(e)),
        Ok(Err(error)) => Err(NetworkError::ConnectFailed { addr, error }),
        Ok(Ok(stream)) => Ok(stream),
    }
}

/// Wrap TCP connection with `FrameCodec`.
pub fn framed(stream: TcpStream, stats: Stats) -> FramedStream {
    Framed::new(stream, FrameCodec::new(stats))
}

/// Read one frame within `timeout`.
pub async fn recv_frame(framed: &mut FramedStream, timeout: Duration) -> Result<Vec<u8>, NetworkError> {
    match time::timeout(timeout, framed.next()).await.map_err(NetworkError::Timeout)? {
        Some(Ok(frame)) => Ok(frame),
        Some(Err(e)) => Err(NetworkError::Read(e)),
        None => Err(NetworkError::Closed),
    }
}

/// Write one frame within `timeout`.
pub async fn send_frame(framed: &mut FramedStream, frame: Vec<u8>, timeout: Duration) -> Result<(), NetworkError> {
    time::timeout(timeout, framed.send(frame))
        .await
        .map_err(NetworkError::Timeout)?
        .map_err(NetworkError::Write)
}

/// Connect to `addr`, send `frame` and wait for exactly one frame back.
pub async fn exchange(addr: SocketAddr, frame: Vec<u8>, timeout: Duration, stats: Stats) -> Result<Vec<u8>, NetworkError> {
    let stream = connect(addr, timeout).await?;
    let mut framed = framed(stream, stats);
    send_frame(&mut framed, frame, timeout).await?;
    recv_frame(&mut framed, timeout).await
}

/** Accept connections from `listener` forever.

Every accepted connection is handled by the future returned from `handler`
in a separate task. When `connections_limit` connections are being handled
new connections are closed immediately.
*/
pub async fn serve<F, Fut>(listener: TcpListener, connections_limit: usize, handler: F) -> Result<(), IoError>
where
    F: Fn(TcpStream, SocketAddr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let limit = Arc::new(Semaphore::new(connections_limit));

    loop {
        let (stream, addr) = listener.accept().await?;

        let permit = match limit.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connections limit {} reached, dropping connection from {}", connections_limit, addr);
                continue;
            },
        };

        let connection = handler(stream, addr);
        tokio::spawn(async move {
            connection.await;
            drop(permit);
        });
    }
}
