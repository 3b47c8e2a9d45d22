// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::wire::error::FrameError;

/// Length of the frame preamble: an 8-byte big-endian payload length
/// followed by a 1-byte message type tag.
const HEADER_LEN: usize = 9;

/// Refuse to allocate a payload buffer larger than this many bytes.
///
/// A legitimate RPC payload is orders of magnitude smaller; this bound
/// exists so a corrupted or malicious length prefix cannot force an
/// unbounded allocation.
const MAX_PAYLOAD_LEN: u64 = 64 * 1024 * 1024;

/// The wire-level message kind carried by a [`Frame`].
///
/// Every frame carries this tag; there is no legacy bare-length path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// The handshake frame identifying the client across reconnects.
    PassId = 1,
    /// An RPC request or reply payload.
    Rpc = 2,
}

impl MessageType {
    fn from_tag(tag: u8) -> Result<Self, FrameError> {
        match tag {
            1 => Ok(MessageType::PassId),
            2 => Ok(MessageType::Rpc),
            other => Err(FrameError::malformed(format!("unknown message type tag {other}"))),
        }
    }
}

/// A decoded frame: its type tag and raw (still-serialized) payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

/// Reads one frame from `stream`, bounded by `io_timeout`.
///
/// Returns [`FrameError::ShortRead`] if the stream ends before a complete
/// frame arrives, [`FrameError::Timeout`] if no data arrives before the
/// deadline, and [`FrameError::MalformedFrame`] if the length prefix
/// exceeds [`MAX_PAYLOAD_LEN`] or the type tag is unrecognized.
pub async fn read_frame<S>(stream: &mut S, io_timeout: Duration) -> Result<Frame, FrameError>
where S: AsyncRead + Unpin {
    let mut header = [0u8; HEADER_LEN];
    read_exact_timed(stream, &mut header, io_timeout, "frame header").await?;

    let payload_len = u64::from_be_bytes(header[0..8].try_into().expect("8-byte slice"));
    let message_type = MessageType::from_tag(header[8])?;

    if payload_len > MAX_PAYLOAD_LEN {
        return Err(FrameError::malformed(format!(
            "payload length {payload_len} exceeds ceiling {MAX_PAYLOAD_LEN}"
        )));
    }

    let mut payload = vec![0u8; payload_len as usize];
    if !payload.is_empty() {
        read_exact_timed(stream, &mut payload, io_timeout, "frame payload").await?;
    }

    Ok(Frame {
        message_type,
        payload,
    })
}

/// Writes one frame to `stream`, bounded by `io_timeout`.
pub async fn write_frame<S>(
    stream: &mut S,
    message_type: MessageType,
    payload: &[u8],
    io_timeout: Duration,
) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    header[0..8].copy_from_slice(&(payload.len() as u64).to_be_bytes());
    header[8] = message_type as u8;

    write_all_timed(stream, &header, io_timeout, "frame header").await?;
    if !payload.is_empty() {
        write_all_timed(stream, payload, io_timeout, "frame payload").await?;
    }
    Ok(())
}

async fn read_exact_timed<S>(
    stream: &mut S,
    buf: &mut [u8],
    io_timeout: Duration,
    label: &'static str,
) -> Result<(), FrameError>
where
    S: AsyncRead + Unpin,
{
    match timeout(io_timeout, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::ShortRead),
        Ok(Err(e)) => Err(FrameError::Io(e)),
        Err(_) => Err(FrameError::Timeout(label)),
    }
}

async fn write_all_timed<S>(
    stream: &mut S,
    buf: &[u8],
    io_timeout: Duration,
    label: &'static str,
) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    match timeout(io_timeout, stream.write_all(buf)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(FrameError::Io(e)),
        Err(_) => Err(FrameError::Timeout(label)),
    }
}
