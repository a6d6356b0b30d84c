//! The card map.
//!
//! [`CardStateStore`] owns every [`CardRecord`]. Records are held behind
//! `Arc` so readers get cheap point-in-time copies that later mutations
//! never touch; every write replaces the `Arc`.
//!
//! Snapshot and delta payloads are server-authoritative and applied as sent.
//! Lifecycle events (tool calls, steps, run errors) go through the status
//! machine in [`CardStatus`].

use std::collections::HashMap;
use std::sync::Arc;

use agui_core::cards::{CardPatch, CardRecord, CardStatus, CardType, MAX_PROGRESS};
use agui_core::errors::StateError;
use agui_core::events::AguiEvent;
use agui_core::ids::CardId;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Title for step cards whose start event has no name.
pub const UNKNOWN_STEP_TITLE: &str = "Unknown step";
/// Title for tool cards created from a chunk that carries no name.
pub const UNKNOWN_TOOL_TITLE: &str = "Unknown tool";

/// Metadata key holding tool call arguments.
pub const META_ARGUMENTS: &str = "arguments";
/// Metadata key accumulating streamed argument fragments.
pub const META_ARGUMENTS_STREAM: &str = "arguments_stream";
/// Metadata key holding the tool result.
pub const META_RESULT: &str = "result";
/// Metadata key holding a failure description.
pub const META_ERROR: &str = "error";

/// Ordered map of cards keyed by [`CardId`].
#[derive(Debug, Default)]
pub struct CardStateStore {
    cards: HashMap<CardId, Arc<CardRecord>>,
    order: Vec<CardId>,
}

impl CardStateStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Every card in insertion order.
    pub fn get_all(&self) -> Vec<Arc<CardRecord>> {
        self.order
            .iter()
            .filter_map(|id| self.cards.get(id).cloned())
            .collect()
    }

    /// One card by ID.
    pub fn get(&self, id: &str) -> Option<Arc<CardRecord>> {
        self.cards.get(id).cloned()
    }

    /// Whether a card exists.
    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    /// Number of cards.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    // ── Snapshot / delta ────────────────────────────────────────────────

    /// Replace every card with the contents of a snapshot `cards` object.
    ///
    /// Entries that are not card-shaped are skipped with a warning. Returns
    /// the IDs now in the store.
    pub fn apply_snapshot(&mut self, cards: &Map<String, Value>) -> Vec<CardId> {
        let patches = parse_patches(cards);
        self.cards.clear();
        self.order.clear();
        for (id, patch) in &patches {
            let record = CardRecord::from_patch(id.clone(), patch);
            let _ = self.put(record);
        }
        debug!(count = self.cards.len(), "applied card snapshot");
        patches.into_iter().map(|(id, _)| id).collect()
    }

    /// Merge a delta `cards` object: existing cards take the provided fields,
    /// unknown IDs are inserted with defaults. Returns the touched IDs.
    pub fn apply_delta(&mut self, cards: &Map<String, Value>) -> Vec<CardId> {
        let patches = parse_patches(cards);
        for (id, patch) in &patches {
            let record = match self.cards.get(id) {
                Some(existing) => existing.merged(patch),
                None => CardRecord::from_patch(id.clone(), patch),
            };
            let _ = self.put(record);
        }
        debug!(count = patches.len(), "applied card delta");
        patches.into_iter().map(|(id, _)| id).collect()
    }

    // ── Lifecycle events ────────────────────────────────────────────────

    /// Apply a tool call, step or run event. Returns the IDs of changed cards;
    /// other event kinds change nothing.
    pub fn upsert_from_event(&mut self, event: &AguiEvent) -> Vec<CardId> {
        match event {
            AguiEvent::ToolCallStart {
                call_id,
                tool_name,
                arguments,
            } => {
                let id = CardId::for_tool_call(call_id);
                self.start_tool_card(id.clone(), tool_name, arguments.clone());
                vec![id]
            }
            AguiEvent::ToolCallArgs { call_id, delta } => {
                let id = CardId::for_tool_call(call_id);
                self.append_arguments(&id, delta).into_iter().collect()
            }
            AguiEvent::ToolCallChunk {
                call_id,
                tool_name,
                delta,
            } => {
                let id = CardId::for_tool_call(call_id);
                if !self.contains(&id) {
                    let name = tool_name.as_deref().unwrap_or(UNKNOWN_TOOL_TITLE);
                    self.start_tool_card(id.clone(), name, Value::Null);
                }
                if let Some(delta) = delta {
                    let _ = self.append_arguments(&id, delta);
                }
                vec![id]
            }
            AguiEvent::ToolCallEnd {
                call_id,
                result,
                success,
                error,
            } => {
                let id = CardId::for_tool_call(call_id);
                let failed = *success == Some(false) || error.is_some();
                self.finish_tool_card(&id, result, failed, error.as_deref())
                    .into_iter()
                    .collect()
            }
            AguiEvent::StepStarted {
                step_id,
                step_name,
                description,
            } => {
                let id = CardId::for_step(step_id);
                let mut card = CardRecord::new(id.clone());
                card.title = step_name
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_STEP_TITLE.to_owned());
                card.content = description.clone().unwrap_or_default();
                card.status = CardStatus::Executing;
                card.card_type = CardType::Step;
                let _ = self.put(card);
                vec![id]
            }
            AguiEvent::StepFinished {
                step_id,
                success,
                result,
            } => {
                let id = CardId::for_step(step_id);
                self.finish_step_card(&id, *success, result.as_ref())
                    .into_iter()
                    .collect()
            }
            AguiEvent::RunError { error, .. } => {
                self.fail_executing(error.as_deref().unwrap_or("run failed"))
            }
            _ => Vec::new(),
        }
    }

    /// Cancel a running card. Only `Executing` cards can be cancelled.
    pub fn cancel(&mut self, id: &str) -> Result<Arc<CardRecord>, StateError> {
        let Some(existing) = self.cards.get(id) else {
            return Err(StateError::CardNotFound(CardId::from(id)));
        };
        if !existing.status.can_transition_to(CardStatus::Cancelled) {
            return Err(StateError::InvalidTransition {
                id: existing.id.clone(),
                from: existing.status,
                to: CardStatus::Cancelled,
            });
        }
        let mut card = CardRecord::clone(existing);
        card.status = CardStatus::Cancelled;
        Ok(self.put(card))
    }

    /// Mark every executing card as failed. Returns the changed IDs.
    pub fn fail_executing(&mut self, reason: &str) -> Vec<CardId> {
        let failed: Vec<CardId> = self
            .order
            .iter()
            .filter(|id| {
                self.cards
                    .get(*id)
                    .is_some_and(|c| c.status == CardStatus::Executing)
            })
            .cloned()
            .collect();
        for id in &failed {
            let _ = self.update(id, |card| {
                card.status = CardStatus::Error;
                let _ = card
                    .metadata
                    .insert(META_ERROR.to_owned(), Value::String(reason.to_owned()));
            });
        }
        if !failed.is_empty() {
            warn!(count = failed.len(), reason, "run error failed executing cards");
        }
        failed
    }

    // ── Raw mutation ────────────────────────────────────────────────────

    /// Insert or overwrite a card. An overwritten card keeps its position.
    pub fn put(&mut self, card: CardRecord) -> Arc<CardRecord> {
        let card = Arc::new(card);
        if self.cards.insert(card.id.clone(), Arc::clone(&card)).is_none() {
            self.order.push(card.id.clone());
        }
        card
    }

    /// Modify an existing card in place. Returns the new record, or `None`
    /// when the card does not exist.
    pub fn update(
        &mut self,
        id: &str,
        f: impl FnOnce(&mut CardRecord),
    ) -> Option<Arc<CardRecord>> {
        let existing = self.cards.get_mut(id)?;
        let mut card = CardRecord::clone(existing);
        f(&mut card);
        *existing = Arc::new(card);
        Some(Arc::clone(existing))
    }

    /// Remove every card.
    pub fn clear(&mut self) {
        self.cards.clear();
        self.order.clear();
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn start_tool_card(&mut self, id: CardId, tool_name: &str, arguments: Value) {
        let mut card = CardRecord::new(id);
        card.title = tool_name.to_owned();
        card.content = format!("Running tool: {tool_name}");
        card.status = CardStatus::Executing;
        card.card_type = CardType::ToolCall;
        let _ = card.metadata.insert(META_ARGUMENTS.to_owned(), arguments);
        let _ = self.put(card);
    }

    fn append_arguments(&mut self, id: &CardId, delta: &str) -> Option<CardId> {
        let updated = self.update(id, |card| {
            let stream = card
                .metadata
                .entry(META_ARGUMENTS_STREAM)
                .or_insert_with(|| Value::String(String::new()));
            match stream {
                Value::String(s) => s.push_str(delta),
                other => *other = Value::String(delta.to_owned()),
            }
        });
        if updated.is_none() {
            warn!(card_id = %id, "tool arguments for unknown tool call, ignoring");
        }
        updated.map(|c| c.id.clone())
    }

    fn finish_tool_card(
        &mut self,
        id: &CardId,
        result: &Value,
        failed: bool,
        error: Option<&str>,
    ) -> Option<CardId> {
        let next = if failed {
            CardStatus::Error
        } else {
            CardStatus::Completed
        };
        if !self.check_completion(id, "tool call end", next) {
            return None;
        }
        let pretty = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
        let updated = self.update(id, |card| {
            card.status = next;
            card.progress = MAX_PROGRESS;
            card.content = match error {
                Some(error) => format!("Tool failed: {error}\nResult: {pretty}"),
                None => format!("Tool finished\nResult: {pretty}"),
            };
            let _ = card
                .metadata
                .insert(META_RESULT.to_owned(), result.clone());
            if let Some(error) = error {
                let _ = card
                    .metadata
                    .insert(META_ERROR.to_owned(), Value::String(error.to_owned()));
            }
        });
        updated.map(|c| c.id.clone())
    }

    fn finish_step_card(
        &mut self,
        id: &CardId,
        success: bool,
        result: Option<&Value>,
    ) -> Option<CardId> {
        let next = if success {
            CardStatus::Completed
        } else {
            CardStatus::Error
        };
        if !self.check_completion(id, "step finished", next) {
            return None;
        }
        let updated = self.update(id, |card| {
            card.status = next;
            card.progress = MAX_PROGRESS;
            if let Some(text) = result.and_then(result_text) {
                if card.content.is_empty() {
                    card.content = text;
                } else {
                    card.content = format!("{}\n\n{text}", card.content);
                }
            }
        });
        updated.map(|c| c.id.clone())
    }

    /// Whether `id` may move to the terminal status `next`, warning when not.
    fn check_completion(&self, id: &CardId, what: &str, next: CardStatus) -> bool {
        match self.cards.get(id) {
            None => {
                warn!(card_id = %id, event = what, "completion for unknown card, ignoring");
                false
            }
            Some(card) if !card.status.can_transition_to(next) => {
                warn!(
                    card_id = %id,
                    event = what,
                    status = %card.status,
                    "completion for card that is not running, ignoring"
                );
                false
            }
            Some(_) => true,
        }
    }
}

fn parse_patches(cards: &Map<String, Value>) -> Vec<(CardId, CardPatch)> {
    let (patches, rejected) = CardPatch::parse_map(cards);
    for (id, reason) in rejected {
        warn!(card_id = %id, %reason, "skipping malformed card entry");
    }
    patches
}

fn result_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
