use std::net::SocketAddr;
use std::sync::mpsc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::protocol::{self, FrameMessage, FrameReply, ProtocolError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind frame listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// One frame handed to the pipeline, with the channel used to release the
/// sending device for its next frame.
pub struct ReceivedFrame {
    pub device_id: String,
    pub jpeg: Vec<u8>,
    ack: Option<oneshot::Sender<FrameReply>>,
}

impl ReceivedFrame {
    fn new(device_id: String, jpeg: Vec<u8>, ack: oneshot::Sender<FrameReply>) -> Self {
        Self {
            device_id,
            jpeg,
            ack: Some(ack),
        }
    }

    /// Release the sending device. The connection task may already be gone,
    /// in which case there is nothing left to release.
    pub fn acknowledge(&mut self) {
        if let Some(ack) = self.ack.take() {
            let _ = ack.send(FrameReply::Ok);
        }
    }
}

/// Accepts device connections and funnels their frames into one queue.
///
/// Each connection task reads a frame, forwards it, and waits for the
/// pipeline's acknowledgement before reading the next, so every device has at
/// most one frame in flight while connections themselves read concurrently.
/// That discipline also bounds the queue depth to the number of connections.
pub struct FrameHub {
    rx: mpsc::Receiver<ReceivedFrame>,
}

pub(crate) fn queue() -> (mpsc::Sender<ReceivedFrame>, FrameHub) {
    let (tx, rx) = mpsc::channel();
    (tx, FrameHub { rx })
}

impl FrameHub {
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        tracing::info!(%addr, "frame transport listening");

        let (tx, hub) = queue();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "device connected");
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            match serve_connection(stream, tx).await {
                                Ok(()) | Err(ProtocolError::Closed) => {
                                    tracing::debug!(%peer, "device disconnected");
                                }
                                Err(e) => {
                                    tracing::warn!(%peer, error = %e, "device connection failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        });

        Ok(hub)
    }

    /// Blocking receive for the ingestion thread. Returns `None` after
    /// `timeout` with no traffic so the caller can still run periodic work.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ReceivedFrame> {
        self.rx.recv_timeout(timeout).ok()
    }
}

async fn serve_connection<T>(
    io: T,
    tx: mpsc::Sender<ReceivedFrame>,
) -> Result<(), ProtocolError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = protocol::message_stream(io);

    loop {
        let msg: FrameMessage = protocol::recv_message(&mut stream).await?;
        let (ack_tx, ack_rx) = oneshot::channel();

        if tx
            .send(ReceivedFrame::new(msg.device_id, msg.jpeg, ack_tx))
            .is_err()
        {
            // Pipeline gone; stop serving this device.
            return Ok(());
        }

        let reply = match ack_rx.await {
            Ok(reply) => reply,
            Err(_) => return Ok(()),
        };
        protocol::send_message(&mut stream, &reply).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ack_gates_the_next_frame_per_device() {
        let (client_io, server_io) = tokio::io::duplex(1024 * 1024);
        let (tx, rx) = mpsc::channel();
        tokio::spawn(async move {
            let _ = serve_connection(server_io, tx).await;
        });

        let mut client = protocol::message_stream(client_io);
        for jpeg in [vec![1u8], vec![2u8]] {
            protocol::send_message(
                &mut client,
                &FrameMessage {
                    device_id: "porch".to_string(),
                    jpeg,
                },
            )
            .await
            .unwrap();
        }

        let (first_jpeg, second_jpeg) = tokio::task::spawn_blocking(move || {
            let mut first = rx
                .recv_timeout(Duration::from_secs(1))
                .expect("first frame");
            // The second frame must be held back until the first is acknowledged.
            assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
            let first_jpeg = first.jpeg.clone();
            first.acknowledge();
            let second = rx
                .recv_timeout(Duration::from_secs(1))
                .expect("second frame");
            (first_jpeg, second.jpeg.clone())
        })
        .await
        .unwrap();

        assert_eq!(first_jpeg, vec![1]);
        assert_eq!(second_jpeg, vec![2]);
    }
}
