use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

use crate::protocol::{Frame, FrameCodec};
use crate::types::Address;
use crate::{Error, Result};

/// What the reader task observed on the socket.
#[derive(Debug, Clone)]
pub(crate) enum TransportEvent {
    Frame(Frame),
    /// No inbound bytes for a full read timeout. The reader keeps going.
    Timeout,
    Error(String),
    Closed,
}

pub(crate) type EventSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// One TCP session with the unit.
pub(crate) struct Transport {
    address: Address,
    writer: Option<FramedWrite<OwnedWriteHalf, FrameCodec>>,
    reader: Option<JoinHandle<()>>,
    alive: Arc<AtomicBool>,
    write_timeout: Duration,
}

impl Transport {
    /// Connect and wait for the unit to start talking.
    ///
    /// The session only counts as established once the first frame has been
    /// received; a completed TCP handshake alone is not enough.
    pub async fn connect(
        address: Address,
        read_timeout: Duration,
        sink: EventSink,
    ) -> Result<Self> {
        debug!(%address, "opening TCP connection");
        let connect = TcpStream::connect(address.socket_addr());
        let stream = match tokio::time::timeout(read_timeout, connect).await {
            Ok(stream) => stream?,
            Err(_) => return Err(Error::Timeout),
        };
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();

        let alive = Arc::new(AtomicBool::new(true));
        let (first_tx, first_rx) = oneshot::channel();
        let reader = tokio::spawn(read_loop(
            FramedRead::new(read_half, FrameCodec),
            read_timeout,
            sink,
            alive.clone(),
            first_tx,
        ));

        let mut transport = Self {
            address,
            writer: Some(FramedWrite::new(write_half, FrameCodec)),
            reader: Some(reader),
            alive,
            write_timeout: read_timeout,
        };

        match tokio::time::timeout(read_timeout, first_rx).await {
            Ok(Ok(())) => {
                info!(%address, "TCP connection open");
                Ok(transport)
            }
            Ok(Err(_)) => {
                transport.destroy();
                Err(Error::Transport(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    "connection closed before first frame",
                )))
            }
            Err(_) => {
                transport.destroy();
                Err(Error::Timeout)
            }
        }
    }

    pub async fn write(&mut self, frame: &Frame) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;
        trace!(frame = %frame, "write");
        match tokio::time::timeout(self.write_timeout, writer.send(frame.clone())).await {
            Ok(result) => result.inspect_err(|_| self.alive.store(false, Ordering::SeqCst)),
            Err(_) => {
                self.alive.store(false, Ordering::SeqCst);
                Err(Error::Timeout)
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.writer.is_some() && self.alive.load(Ordering::SeqCst)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Tear the socket down. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if self.writer.take().is_some() {
            info!(address = %self.address, "TCP connection closed");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn read_loop(
    mut frames: FramedRead<OwnedReadHalf, FrameCodec>,
    read_timeout: Duration,
    sink: EventSink,
    alive: Arc<AtomicBool>,
    first_frame: oneshot::Sender<()>,
) {
    let mut first_frame = Some(first_frame);
    loop {
        match tokio::time::timeout(read_timeout, frames.next()).await {
            Err(_) => {
                debug!("TCP connection timed out waiting for data");
                sink(TransportEvent::Timeout);
            }
            Ok(Some(Ok(frame))) => {
                sink(TransportEvent::Frame(frame));
                if let Some(tx) = first_frame.take() {
                    let _ = tx.send(());
                }
            }
            Ok(Some(Err(e))) => {
                warn!(error = %e, "TCP read failed");
                alive.store(false, Ordering::SeqCst);
                sink(TransportEvent::Error(e.to_string()));
                return;
            }
            Ok(None) => {
                debug!("TCP connection closed by unit");
                alive.store(false, Ordering::SeqCst);
                sink(TransportEvent::Closed);
                return;
            }
        }
    }
}
