// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Length-prefixed, typed framing for the RPC wire protocol.

pub mod error;
pub mod frame;
pub mod message;

pub use error::FrameError;
pub use frame::{Frame, MessageType, read_frame, write_frame};
pub use message::{PassId, ReplyEnvelope, RequestEnvelope};
