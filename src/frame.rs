//! Length-delimited message frames for the local producer socket and the
//! remote egress connection.
//!
//! Wire layout:
//!
//!   `<2-byte magic><4-byte big-endian body length><bincode body><4-byte CRC-32>`
//!
//! The checksum covers the body only. Framing violations (bad magic, an
//! over-limit length, a checksum mismatch) are not recoverable mid-stream;
//! callers drop the connection.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::Message;

pub const FRAME_MAGIC: [u8; 2] = [0xA5, 0x4C];
const HEADER_LEN: usize = 6;

const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad frame magic {0:02x?}")]
    BadMagic([u8; 2]),

    #[error("frame body of {size} bytes exceeds the {limit} byte limit")]
    Oversize { size: usize, limit: usize },

    #[error("frame checksum mismatch: computed {computed:08x}, received {received:08x}")]
    Checksum { computed: u32, received: u32 },

    #[error("frame body did not decode: {0}")]
    Decode(#[from] bincode::Error),
}

/// Serialize a message into a complete frame.
pub fn encode(msg: &Message) -> Result<Vec<u8>, FrameError> {
    let body = bincode::serialize(msg)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + 4);
    out.extend_from_slice(&FRAME_MAGIC);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(&CRC32.checksum(&body).to_be_bytes());
    Ok(out)
}

/// Write one framed message and flush.
pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode(msg)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. Returns `Ok(None)` on clean EOF at a frame
/// boundary (the peer hung up between frames).
pub async fn read_frame<R>(reader: &mut R, max_body_bytes: usize) -> Result<Option<Message>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let magic = [header[0], header[1]];
    if magic != FRAME_MAGIC {
        return Err(FrameError::BadMagic(magic));
    }

    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    if len > max_body_bytes {
        return Err(FrameError::Oversize {
            size: len,
            limit: max_body_bytes,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    let mut trailer = [0u8; 4];
    reader.read_exact(&mut trailer).await?;

    let computed = CRC32.checksum(&body);
    let received = u32::from_be_bytes(trailer);
    if computed != received {
        return Err(FrameError::Checksum { computed, received });
    }

    Ok(Some(bincode::deserialize(&body)?))
}
