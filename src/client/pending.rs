// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Client-side bookkeeping for the consecutive-ACK watermark.
//!
//! The client reports the highest *contiguous* run of reply IDs it has
//! seen back to the server as `HighestReplySeen`. A `BTreeSet` gives
//! ordered-smallest-first consumption without pulling in an extra
//! crate for a client-local structure.

use std::collections::BTreeSet;

use crate::registry::RequestId;

#[derive(Debug, Default)]
pub struct AckWatermark {
    completed_received: BTreeSet<RequestId>,
    highest_consecutive: RequestId,
}

impl AckWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `request_id`'s reply has been received and folds in
    /// any run of now-contiguous IDs starting at `highest_consecutive +
    /// 1`.
    pub fn update_highest_consecutive_num(&mut self, request_id: RequestId) {
        self.completed_received.insert(request_id);
        self.set_highest_consecutive();
    }

    fn set_highest_consecutive(&mut self) {
        loop {
            let next = self.highest_consecutive + 1;
            if self.completed_received.remove(&next) {
                self.highest_consecutive = next;
            } else {
                break;
            }
        }
    }

    pub fn highest_consecutive(&self) -> RequestId {
        self.highest_consecutive
    }

    pub fn pending_count(&self) -> usize {
        self.completed_received.len()
    }
}
