// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::io;

use thiserror::Error;

/// Failure modes of the frame codec.
///
/// None of these are reported to a registered handler: a frame-level
/// failure tears down the connection and lets the client reconnect.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended before a full frame could be read.
    #[error("short read: stream closed mid-frame")]
    ShortRead,

    /// No data arrived before the caller-supplied deadline elapsed.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The frame's length prefix, type tag, or payload failed to parse.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// Any other I/O failure on the underlying stream.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        FrameError::MalformedFrame {
            reason: reason.into(),
        }
    }
}
