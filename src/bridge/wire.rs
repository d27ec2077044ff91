//! Frame codec for the engine control socket.
//!
//! Every message is one frame: a 4-byte big-endian payload length followed by
//! a UTF-8 JSON object. Requests are tagged by `"op"`, replies by `"kind"`.
//! Byte payloads travel as standard base64 strings.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────┐
//! │ len: u32 BE  │ {"op":"store","document":4,"filter":"…"}    │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```

use crate::bridge::DocumentKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame payload (256 MiB).
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// Client → engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Hello {
        client: String,
    },
    CreateInputStream {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    Load {
        input: u64,
        hidden: bool,
        read_only: bool,
        as_template: bool,
        interactive: bool,
    },
    Refresh {
        document: u64,
    },
    Store {
        document: u64,
        filter: String,
    },
    Close {
        document: u64,
    },
    Terminate,
}

/// Engine → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Welcome {
        engine: String,
    },
    Handle {
        id: u64,
    },
    Document {
        id: u64,
        variant: DocumentKind,
    },
    /// Exported bytes for the current `store`.
    Write {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    Flush,
    CloseOutput,
    Ok,
    Error {
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("connection closed by engine")]
    Closed,

    #[error("frame of {0} bytes exceeds the {max} byte limit", max = MAX_FRAME_LEN)]
    TooLarge(u64),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialise `msg` and write it as one frame.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(msg)?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|n| *n <= MAX_FRAME_LEN)
        .ok_or(WireError::TooLarge(body.len() as u64))?;

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, WireError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(WireError::Closed),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(len as u64));
    }

    let mut body = vec![0u8; len as usize];
    match reader.read_exact(&mut body).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(WireError::Closed),
        Err(e) => return Err(e.into()),
    }
    Ok(serde_json::from_slice(&body)?)
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
