// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-client session state: the completed-reply cache and the counters
//! the two trim passes consume, guarded by its own `tokio::sync::Mutex`
//! so that each client identifier's bookkeeping is independent.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tokio::sync::{Mutex, Notify};

use crate::registry::RequestId;
use crate::wire::ReplyEnvelope;

/// The value the server's session map holds for one [`ClientIdentifier`].
///
/// `prior_exited` lives outside the mutex deliberately: a reconnecting
/// client needs to wait on it *without* holding the [`Session`] lock
/// (holding both would deadlock against the very worker that's supposed
/// to notify it), so it is a sibling field rather than part of the
/// guarded state.
#[derive(Debug, Default)]
pub struct SessionHandle {
    pub state: Mutex<Session>,
    pub prior_exited: Notify,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A cached reply, kept until it is trimmed by either the ACK-based or
/// the TTL-based pass.
#[derive(Debug, Clone)]
struct CompletedEntry {
    reply: ReplyEnvelope,
    completed_at: Instant,
}

/// Per-client state: completed-reply cache plus the watermark counters
/// used to trim it.
///
/// Every field is private; callers go through the lock-holding methods
/// below so the ACK-range and LRU-front invariants can't be broken from
/// outside this module.
#[derive(Debug)]
pub struct Session {
    completed_by_id: HashMap<RequestId, CompletedEntry>,
    completed_lru: VecDeque<RequestId>,
    previous_highest_reply_seen: RequestId,
    highest_reply_seen: RequestId,
    /// True while a connection currently owns this session. A second
    /// connection for the same identifier waits on
    /// [`SessionHandle::prior_exited`] before clearing it and taking
    /// over.
    pub(crate) occupied: bool,
    /// Count of dispatch workers currently running against this
    /// session's active connection. A reconnect waits for this to reach
    /// zero before taking over.
    pub(crate) in_flight: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            completed_by_id: HashMap::new(),
            completed_lru: VecDeque::new(),
            previous_highest_reply_seen: 0,
            highest_reply_seen: 0,
            occupied: false,
            in_flight: 0,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a previously completed reply for `request_id`, if any.
    pub fn completed_reply(&self, request_id: RequestId) -> Option<ReplyEnvelope> {
        self.completed_by_id.get(&request_id).map(|e| e.reply.clone())
    }

    /// Advances `highest_reply_seen` to `max(current, incoming)`. Called
    /// unconditionally for every dispatched request, cache hit or miss,
    /// since a retransmit still carries a fresh piggybacked watermark.
    pub fn advance_watermark(&mut self, highest_reply_seen: RequestId) {
        if highest_reply_seen > self.highest_reply_seen {
            self.previous_highest_reply_seen = self.highest_reply_seen;
            self.highest_reply_seen = highest_reply_seen;
        }
    }

    /// Records a newly completed reply in the cache the ACK-based and
    /// TTL-based trim passes sweep.
    pub fn record_completed(&mut self, reply: ReplyEnvelope) {
        let request_id = reply.request_id;
        self.completed_by_id.insert(request_id, CompletedEntry {
            reply,
            completed_at: Instant::now(),
        });
        self.completed_lru.push_back(request_id);
    }

    /// Trims every cached reply with an ID in
    /// `(previous_highest_reply_seen, highest_reply_seen]`: the client
    /// has acknowledged all of them by advancing its watermark that far.
    pub fn trim_acked(&mut self) -> usize {
        let lo = self.previous_highest_reply_seen;
        let hi = self.highest_reply_seen;
        if hi <= lo {
            return 0;
        }
        let mut trimmed = 0;
        for id in (lo + 1)..=hi {
            if self.completed_by_id.remove(&id).is_some() {
                trimmed += 1;
            }
        }
        self.completed_lru.retain(|id| *id <= lo || *id > hi || self.completed_by_id.contains_key(id));
        self.previous_highest_reply_seen = hi;
        trimmed
    }

    /// Trims from the front of the LRU every entry older than `ttl`,
    /// stopping at the first entry that is still live (younger than
    /// `ttl`): the LRU is time-ordered, so the first survivor means
    /// everything after it survives too.
    pub fn trim_expired(&mut self, ttl: std::time::Duration) -> usize {
        let mut trimmed = 0;
        while let Some(&id) = self.completed_lru.front() {
            let Some(entry) = self.completed_by_id.get(&id) else {
                self.completed_lru.pop_front();
                continue;
            };
            if entry.completed_at.elapsed() < ttl {
                break;
            }
            self.completed_by_id.remove(&id);
            self.completed_lru.pop_front();
            trimmed += 1;
        }
        trimmed
    }

    pub fn is_empty(&self) -> bool {
        self.completed_by_id.is_empty()
    }

    pub fn highest_reply_seen(&self) -> RequestId {
        self.highest_reply_seen
    }

    pub fn completed_count(&self) -> usize {
        self.completed_by_id.len()
    }
}
