//! TCP wire protocol between edge devices and the hub.
//!
//! Length-delimited frames carrying bincode-encoded messages. A device sends
//! one `FrameMessage` and must read the hub's `FrameReply` before sending the
//! next frame.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[source] bincode::Error),
    #[error("decode error: {0}")]
    Decode(#[source] bincode::Error),
    #[error("connection closed")]
    Closed,
}

/// Device → hub: one compressed video frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMessage {
    pub device_id: String,
    pub jpeg: Vec<u8>,
}

/// Hub → device: receipt acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FrameReply {
    Ok,
}

pub type MessageStream<T> = Framed<T, LengthDelimitedCodec>;

pub fn message_stream<T: AsyncRead + AsyncWrite>(io: T) -> MessageStream<T> {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_BYTES)
        .new_codec();
    Framed::new(io, codec)
}

pub async fn send_message<T, M>(
    stream: &mut MessageStream<T>,
    msg: &M,
) -> Result<(), ProtocolError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    M: Serialize,
{
    let data = bincode::serialize(msg).map_err(ProtocolError::Encode)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

pub async fn recv_message<T, M>(stream: &mut MessageStream<T>) -> Result<M, ProtocolError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    M: DeserializeOwned,
{
    match stream.next().await {
        Some(Ok(bytes)) => bincode::deserialize(&bytes).map_err(ProtocolError::Decode),
        Some(Err(e)) => Err(ProtocolError::Io(e)),
        None => Err(ProtocolError::Closed),
    }
}
