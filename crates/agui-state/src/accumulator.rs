//! Streamed text messages.
//!
//! [`MessageAccumulator`] owns every [`MessageRecord`] and mirrors each
//! message onto a companion card (`msg_{id}`) in the [`CardStateStore`] it is
//! handed. The store is borrowed per call; the accumulator keeps no
//! reference to it.
//!
//! Content that arrives before its start frame is parked per message ID for
//! a short TTL and replayed, in arrival order, when the start shows up.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use agui_core::cards::{CardRecord, CardStatus, CardType, MAX_PROGRESS};
use agui_core::events::AguiEvent;
use agui_core::ids::{CardId, MessageId};
use agui_core::messages::{DEFAULT_ROLE, EMPTY_MESSAGE_CONTENT, MessageRecord};
use tracing::{debug, warn};

use crate::store::CardStateStore;

/// Progress added to a companion card per content chunk.
pub const PROGRESS_PER_CHUNK: u8 = 20;
/// Companion card progress ceiling while streaming.
pub const STREAMING_PROGRESS_CAP: u8 = 90;

/// Buffering limits for out-of-order content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccumulatorConfig {
    /// How long chunks for an unstarted message are kept.
    pub pending_ttl: Duration,
    /// Maximum number of unstarted message IDs buffered at once.
    pub max_pending_messages: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::from_secs(5),
            max_pending_messages: 64,
        }
    }
}

#[derive(Debug)]
struct PendingChunks {
    first_seen: Instant,
    chunks: Vec<String>,
}

/// Accumulates streamed message content.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    config: AccumulatorConfig,
    messages: HashMap<MessageId, MessageRecord>,
    order: Vec<MessageId>,
    pending: HashMap<MessageId, PendingChunks>,
}

impl MessageAccumulator {
    /// An empty accumulator.
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Every message in first-seen order.
    pub fn messages(&self) -> Vec<MessageRecord> {
        self.order
            .iter()
            .filter_map(|id| self.messages.get(id).cloned())
            .collect()
    }

    /// One message by ID.
    pub fn get(&self, id: &str) -> Option<&MessageRecord> {
        self.messages.get(id)
    }

    /// Number of message IDs with buffered, unstarted content.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // ── Events ──────────────────────────────────────────────────────────

    /// Apply a text message event. Returns the changed message ID, if any.
    pub fn apply(&mut self, store: &mut CardStateStore, event: &AguiEvent) -> Option<MessageId> {
        self.apply_at(store, event, Instant::now())
    }

    /// [`apply`](Self::apply) with an explicit clock reading.
    pub fn apply_at(
        &mut self,
        store: &mut CardStateStore,
        event: &AguiEvent,
        now: Instant,
    ) -> Option<MessageId> {
        self.apply_stamped(store, event, None, now)
    }

    /// Apply an event carrying the frame's own timestamp. A started message
    /// keeps `timestamp` verbatim; without one it gets the receive time.
    pub fn apply_stamped(
        &mut self,
        store: &mut CardStateStore,
        event: &AguiEvent,
        timestamp: Option<f64>,
        now: Instant,
    ) -> Option<MessageId> {
        self.sweep_expired(now);

        match event {
            AguiEvent::TextMessageStart {
                message_id,
                role,
                content,
            } => {
                self.start(store, message_id, role.as_deref(), content.as_deref(), timestamp);
                Some(message_id.clone())
            }
            AguiEvent::TextMessageContent {
                message_id,
                content,
            } => self.content(store, message_id, content, now),
            AguiEvent::TextMessageChunk {
                message_id,
                role,
                content,
            } => {
                if !self.messages.contains_key(message_id) {
                    self.start(store, message_id, role.as_deref(), None, timestamp);
                }
                if let Some(content) = content {
                    let _ = self.content(store, message_id, content, now);
                }
                Some(message_id.clone())
            }
            AguiEvent::TextMessageEnd { message_id } => self.end(store, message_id),
            AguiEvent::MessagesSnapshot { messages } => {
                self.replace_all(messages);
                None
            }
            _ => None,
        }
    }

    /// Drop every message and buffered chunk.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.order.clear();
        self.pending.clear();
    }

    // ── Handlers ────────────────────────────────────────────────────────

    fn start(
        &mut self,
        store: &mut CardStateStore,
        id: &MessageId,
        role: Option<&str>,
        inline: Option<&str>,
        timestamp: Option<f64>,
    ) {
        let role = role.unwrap_or(DEFAULT_ROLE);
        let timestamp = timestamp.unwrap_or_else(agui_core::now_millis_f64);
        let mut record = MessageRecord::started(id.clone(), role, timestamp);
        let mut chunks = 0u8;
        if let Some(text) = inline.filter(|t| !t.is_empty()) {
            record.content.push_str(text);
            chunks = 1;
        }
        if let Some(pending) = self.pending.remove(id) {
            debug!(message_id = %id, chunks = pending.chunks.len(), "replaying buffered content");
            for chunk in pending.chunks {
                record.content.push_str(&chunk);
                chunks = chunks.saturating_add(1);
            }
        }

        let mut card = CardRecord::new(CardId::for_message(id));
        card.title = format!("{role} message");
        card.content.clone_from(&record.content);
        card.status = CardStatus::Executing;
        card.card_type = CardType::Message;
        card.progress = streaming_progress(0, chunks);
        let _ = store.put(card);

        self.insert(record);
    }

    fn content(
        &mut self,
        store: &mut CardStateStore,
        id: &MessageId,
        chunk: &str,
        now: Instant,
    ) -> Option<MessageId> {
        let Some(record) = self.messages.get_mut(id) else {
            self.buffer(id, chunk, now);
            return None;
        };
        if !record.streaming {
            warn!(message_id = %id, "content after message end, ignoring");
            return None;
        }
        record.content.push_str(chunk);
        let text = record.content.clone();
        let _ = store.update(&CardId::for_message(id), |card| {
            card.content = text;
            card.progress = streaming_progress(card.progress, 1);
        });
        Some(id.clone())
    }

    fn end(&mut self, store: &mut CardStateStore, id: &MessageId) -> Option<MessageId> {
        let Some(record) = self.messages.get_mut(id) else {
            warn!(message_id = %id, "end for unknown message, ignoring");
            return None;
        };
        record.streaming = false;
        if record.content.is_empty() {
            EMPTY_MESSAGE_CONTENT.clone_into(&mut record.content);
        }
        let text = record.content.clone();
        let updated = store.update(&CardId::for_message(id), |card| {
            if card.status.can_transition_to(CardStatus::Completed) {
                card.status = CardStatus::Completed;
                card.progress = MAX_PROGRESS;
            }
            card.content = text;
        });
        if updated.is_none() {
            debug!(message_id = %id, "companion card missing at message end");
        }
        Some(id.clone())
    }

    fn replace_all(&mut self, messages: &[MessageRecord]) {
        self.messages.clear();
        self.order.clear();
        for message in messages {
            let mut record = message.clone();
            record.streaming = false;
            self.insert(record);
        }
        debug!(count = self.messages.len(), "applied messages snapshot");
    }

    fn insert(&mut self, record: MessageRecord) {
        let id = record.id.clone();
        if self.messages.insert(id.clone(), record).is_none() {
            self.order.push(id);
        }
    }

    // ── Pending buffer ──────────────────────────────────────────────────

    fn buffer(&mut self, id: &MessageId, chunk: &str, now: Instant) {
        if !self.pending.contains_key(id) && self.pending.len() >= self.config.max_pending_messages
        {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|(_, p)| p.first_seen)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                warn!(message_id = %oldest, "pending message buffer full, dropping oldest");
                let _ = self.pending.remove(&oldest);
            }
        }
        debug!(message_id = %id, "buffering content for unstarted message");
        self.pending
            .entry(id.clone())
            .or_insert_with(|| PendingChunks {
                first_seen: now,
                chunks: Vec::new(),
            })
            .chunks
            .push(chunk.to_owned());
    }

    /// Discard buffered content whose message never started within the TTL.
    pub fn sweep_expired(&mut self, now: Instant) {
        let ttl = self.config.pending_ttl;
        self.pending.retain(|id, pending| {
            let alive = now.saturating_duration_since(pending.first_seen) < ttl;
            if !alive {
                warn!(
                    message_id = %id,
                    chunks = pending.chunks.len(),
                    "discarding content for message that never started"
                );
            }
            alive
        });
    }
}

fn streaming_progress(current: u8, chunks: u8) -> u8 {
    let grown = u32::from(current) + u32::from(chunks) * u32::from(PROGRESS_PER_CHUNK);
    u8::try_from(grown.min(u32::from(STREAMING_PROGRESS_CAP))).unwrap_or(STREAMING_PROGRESS_CAP)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
