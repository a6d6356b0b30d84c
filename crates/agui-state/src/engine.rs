//! [`StateEngine`]: one place that applies decoded events to state.
//!
//! The engine owns the card store, the message accumulator, the raw shared
//! state object and the run status. It is driven by a single consumer so
//! events are applied strictly in arrival order.

use std::time::Instant;

use agui_core::events::{AguiEvent, Event};
use agui_core::ids::{CardId, MessageId, RunId};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::accumulator::{AccumulatorConfig, MessageAccumulator};
use crate::store::CardStateStore;

/// Key of the card map inside the shared state.
pub const CARDS_KEY: &str = "cards";

/// Lifecycle of the agent run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// No run seen yet.
    #[default]
    Idle,
    /// A run is in progress.
    Running {
        /// Run ID, when the server sends one.
        run_id: Option<RunId>,
    },
    /// The last run finished.
    Finished {
        /// Run ID, when the server sends one.
        run_id: Option<RunId>,
    },
    /// The last run failed.
    Failed {
        /// Run ID, when the server sends one.
        run_id: Option<RunId>,
        /// Failure description.
        error: String,
    },
}

/// What one applied event changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineUpdate {
    /// Cards created or modified.
    pub cards: Vec<CardId>,
    /// Message created or modified.
    pub message: Option<MessageId>,
    /// The message list was replaced.
    pub messages_replaced: bool,
    /// The shared state object changed.
    pub state_changed: bool,
    /// The run status changed.
    pub run_status_changed: bool,
}

impl EngineUpdate {
    /// Whether anything changed.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
            && self.message.is_none()
            && !self.messages_replaced
            && !self.state_changed
            && !self.run_status_changed
    }
}

/// Card, message, shared-state and run-status reconciliation.
#[derive(Debug, Default)]
pub struct StateEngine {
    store: CardStateStore,
    accumulator: MessageAccumulator,
    shared_state: Map<String, Value>,
    run_status: RunStatus,
}

impl StateEngine {
    /// A fresh engine.
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            accumulator: MessageAccumulator::new(config),
            ..Self::default()
        }
    }

    /// The card store.
    pub fn store(&self) -> &CardStateStore {
        &self.store
    }

    /// Mutable card store, for client actions such as cancel.
    pub fn store_mut(&mut self) -> &mut CardStateStore {
        &mut self.store
    }

    /// The message accumulator.
    pub fn accumulator(&self) -> &MessageAccumulator {
        &self.accumulator
    }

    /// The raw shared state object.
    pub fn shared_state(&self) -> &Map<String, Value> {
        &self.shared_state
    }

    /// Current run status.
    pub fn run_status(&self) -> &RunStatus {
        &self.run_status
    }

    /// Apply one event.
    pub fn apply(&mut self, event: &Event) -> EngineUpdate {
        self.apply_at(event, Instant::now())
    }

    /// [`apply`](Self::apply) with an explicit clock reading.
    pub fn apply_at(&mut self, event: &Event, now: Instant) -> EngineUpdate {
        self.accumulator.sweep_expired(now);
        let mut update = EngineUpdate::default();
        match &event.payload {
            AguiEvent::StateSnapshot { state } => {
                let Some(state) = state.as_object() else {
                    warn!("state snapshot is not an object, ignoring");
                    return update;
                };
                self.shared_state = state.clone();
                update.state_changed = true;
                if let Some(cards) = state.get(CARDS_KEY).and_then(Value::as_object) {
                    update.cards = self.store.apply_snapshot(cards);
                }
            }
            AguiEvent::StateDelta { delta } => {
                let Some(delta) = delta.as_object() else {
                    warn!("state delta is not an object, ignoring");
                    return update;
                };
                merge_shared_state(&mut self.shared_state, delta);
                update.state_changed = true;
                if let Some(cards) = delta.get(CARDS_KEY).and_then(Value::as_object) {
                    update.cards = self.store.apply_delta(cards);
                }
            }
            AguiEvent::ToolCallStart { .. }
            | AguiEvent::ToolCallArgs { .. }
            | AguiEvent::ToolCallChunk { .. }
            | AguiEvent::ToolCallEnd { .. }
            | AguiEvent::StepStarted { .. }
            | AguiEvent::StepFinished { .. } => {
                update.cards = self.store.upsert_from_event(&event.payload);
            }
            AguiEvent::TextMessageStart { .. }
            | AguiEvent::TextMessageContent { .. }
            | AguiEvent::TextMessageChunk { .. }
            | AguiEvent::TextMessageEnd { .. } => {
                update.message = self.accumulator.apply_stamped(
                    &mut self.store,
                    &event.payload,
                    event.timestamp,
                    now,
                );
                if let Some(id) = &update.message {
                    update.cards.push(CardId::for_message(id));
                }
            }
            AguiEvent::MessagesSnapshot { .. } => {
                let _ = self.accumulator.apply_stamped(
                    &mut self.store,
                    &event.payload,
                    event.timestamp,
                    now,
                );
                update.messages_replaced = true;
            }
            AguiEvent::RunStarted { run_id } => {
                self.run_status = RunStatus::Running {
                    run_id: run_id.clone(),
                };
                update.run_status_changed = true;
            }
            AguiEvent::RunFinished { run_id } => {
                self.run_status = RunStatus::Finished {
                    run_id: run_id.clone(),
                };
                update.run_status_changed = true;
            }
            AguiEvent::RunError { run_id, error } => {
                let error = error.clone().unwrap_or_else(|| "run failed".to_owned());
                warn!(run_id = ?run_id, %error, "agent run failed");
                self.run_status = RunStatus::Failed {
                    run_id: run_id.clone(),
                    error,
                };
                update.run_status_changed = true;
                update.cards = self.store.upsert_from_event(&event.payload);
            }
            AguiEvent::Custom { .. } | AguiEvent::Raw { .. } => {
                debug!(kind = %event.kind(), "pass-through event, no state change");
            }
        }
        update
    }
}

/// Shallow key merge, except `cards`, whose entries are merged per card.
fn merge_shared_state(target: &mut Map<String, Value>, delta: &Map<String, Value>) {
    for (key, value) in delta {
        if key == CARDS_KEY {
            if let (Some(Value::Object(existing)), Value::Object(incoming)) =
                (target.get_mut(CARDS_KEY), value)
            {
                for (id, patch) in incoming {
                    match (existing.get_mut(id), patch) {
                        (Some(Value::Object(card)), Value::Object(fields)) => {
                            for (field, v) in fields {
                                let _ = card.insert(field.clone(), v.clone());
                            }
                        }
                        _ => {
                            let _ = existing.insert(id.clone(), patch.clone());
                        }
                    }
                }
                continue;
            }
        }
        let _ = target.insert(key.clone(), value.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use agui_core::cards::{CardStatus, CardType};
    use agui_core::ids::{MessageId, StepId, ToolCallId};
    use serde_json::json;

    fn apply(engine: &mut StateEngine, payload: AguiEvent) -> EngineUpdate {
        engine.apply(&Event::new(payload))
    }

    #[test]
    fn two_card_snapshot_with_defaults() {
        let mut engine = StateEngine::default();
        let update = apply(
            &mut engine,
            AguiEvent::StateSnapshot {
                state: json!({"cards": {
                    "c1": {"title": "T1", "status": "completed", "progress": 100},
                    "c2": {"title": "T2"}
                }}),
            },
        );
        assert_eq!(update.cards.len(), 2);
        assert!(update.state_changed);

        let store = engine.store();
        assert_eq!(store.len(), 2);
        let c2 = store.get("c2").unwrap();
        assert_eq!(c2.status, CardStatus::Pending);
        assert_eq!(c2.progress, 0);
        assert_eq!(c2.card_type, CardType::Unknown);
    }

    #[test]
    fn delta_merges_into_snapshot() {
        let mut engine = StateEngine::default();
        let _ = apply(
            &mut engine,
            AguiEvent::StateSnapshot {
                state: json!({"cards": {"c2": {"title": "T2"}}, "phase": "init"}),
            },
        );
        let _ = apply(
            &mut engine,
            AguiEvent::StateDelta {
                delta: json!({"cards": {"c2": {"status": "executing", "progress": 40}}, "phase": "run"}),
            },
        );

        let c2 = engine.store().get("c2").unwrap();
        assert_eq!(c2.title, "T2");
        assert_eq!(c2.status, CardStatus::Executing);
        assert_eq!(c2.progress, 40);

        let state = engine.shared_state();
        assert_eq!(state["phase"], "run");
        assert_eq!(state["cards"]["c2"]["title"], "T2");
        assert_eq!(state["cards"]["c2"]["progress"], 40);
    }

    #[test]
    fn snapshot_without_cards_keeps_cards() {
        let mut engine = StateEngine::default();
        let _ = apply(
            &mut engine,
            AguiEvent::ToolCallStart {
                call_id: ToolCallId::from("t1"),
                tool_name: "search".into(),
                arguments: json!({}),
            },
        );
        let _ = apply(
            &mut engine,
            AguiEvent::StateSnapshot {
                state: json!({"phase": "x"}),
            },
        );
        assert_eq!(engine.store().len(), 1);
        assert_eq!(engine.shared_state()["phase"], "x");
    }

    #[test]
    fn non_object_state_is_ignored() {
        let mut engine = StateEngine::default();
        let update = apply(&mut engine, AguiEvent::StateSnapshot { state: json!([1]) });
        assert!(update.is_empty());
    }

    #[test]
    fn tool_call_start_end() {
        let mut engine = StateEngine::default();
        let _ = apply(
            &mut engine,
            AguiEvent::ToolCallStart {
                call_id: ToolCallId::from("t1"),
                tool_name: "search".into(),
                arguments: json!({"q": 1}),
            },
        );
        let update = apply(
            &mut engine,
            AguiEvent::ToolCallEnd {
                call_id: ToolCallId::from("t1"),
                result: json!({"ok": true}),
                success: None,
                error: None,
            },
        );
        assert_eq!(update.cards, vec![CardId::from("t1")]);
        let card = engine.store().get("t1").unwrap();
        assert_eq!(card.status, CardStatus::Completed);
        assert_eq!(card.progress, 100);
        assert_eq!(card.metadata["result"], json!({"ok": true}));
    }

    #[test]
    fn message_events_report_companion_card() {
        let mut engine = StateEngine::default();
        let update = apply(
            &mut engine,
            AguiEvent::TextMessageStart {
                message_id: MessageId::from("m1"),
                role: None,
                content: None,
            },
        );
        assert_eq!(update.message, Some(MessageId::from("m1")));
        assert_eq!(update.cards, vec![CardId::from("msg_m1")]);
        assert_eq!(engine.accumulator().messages().len(), 1);
    }

    #[test]
    fn run_lifecycle() {
        let mut engine = StateEngine::default();
        assert_eq!(engine.run_status(), &RunStatus::Idle);

        let _ = apply(
            &mut engine,
            AguiEvent::RunStarted {
                run_id: Some(RunId::from("r1")),
            },
        );
        assert_eq!(
            engine.run_status(),
            &RunStatus::Running {
                run_id: Some(RunId::from("r1"))
            }
        );

        let _ = apply(
            &mut engine,
            AguiEvent::StepStarted {
                step_id: StepId::from("s1"),
                step_name: Some("plan".into()),
                description: None,
            },
        );
        let update = apply(
            &mut engine,
            AguiEvent::RunError {
                run_id: Some(RunId::from("r1")),
                error: Some("overloaded".into()),
            },
        );
        assert!(update.run_status_changed);
        assert_eq!(update.cards, vec![CardId::from("step_s1")]);
        assert_eq!(engine.store().get("step_s1").unwrap().status, CardStatus::Error);
        assert_eq!(
            serde_json::to_value(engine.run_status()).unwrap(),
            json!({"status": "failed", "run_id": "r1", "error": "overloaded"})
        );
    }

    #[test]
    fn custom_and_raw_change_nothing() {
        let mut engine = StateEngine::default();
        let update = apply(
            &mut engine,
            AguiEvent::Custom {
                name: None,
                data: json!({"x": 1}),
            },
        );
        assert!(update.is_empty());
        let update = apply(&mut engine, AguiEvent::Raw { payload: json!(1) });
        assert!(update.is_empty());
    }

    #[test]
    fn any_event_sweeps_expired_message_buffers() {
        let mut engine = StateEngine::default();
        let t0 = Instant::now();
        let early = Event::new(AguiEvent::TextMessageContent {
            message_id: MessageId::from("m1"),
            content: "early".into(),
        });
        let _ = engine.apply_at(&early, t0);
        assert_eq!(engine.accumulator().pending_len(), 1);

        let run = Event::new(AguiEvent::RunStarted { run_id: None });
        let _ = engine.apply_at(&run, t0 + std::time::Duration::from_secs(10));
        assert_eq!(engine.accumulator().pending_len(), 0);
    }

    #[test]
    fn message_start_keeps_frame_timestamp() {
        let mut engine = StateEngine::default();
        let event = Event::new(AguiEvent::TextMessageStart {
            message_id: MessageId::from("m1"),
            role: None,
            content: None,
        })
        .with_timestamp(1_700_000_000.5);
        let _ = engine.apply(&event);
        let ts = engine.accumulator().get("m1").unwrap().timestamp;
        assert!((ts - 1_700_000_000.5).abs() < 1e-6);
    }
}
