//! Dialogue Engine
//!
//! The authoritative NPC conversation state machine: given an NPC definition
//! and a player's state, `greet` produces the opening dialogue node and
//! `choose` applies a selected option's side effects and produces the next
//! node. An empty option set signals the end of the conversation.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::definition::{
    is_terminal_option, DialogueOption, Reward, FAREWELL_TEXT, QUEST_COMPLETE_TEXT,
};
use super::registry::NpcRegistry;
use crate::store::{PlayerStateStore, QuestProgress};

/// One screen of NPC text plus selectable options. Transient, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DialogueNode {
    pub text: String,
    pub options: Vec<DialogueOption>,
}

impl DialogueNode {
    fn terminal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: Vec::new(),
        }
    }

    /// True when the conversation is over and the caller should close the
    /// dialogue overlay.
    pub fn is_terminal(&self) -> bool {
        self.options.is_empty()
    }
}

/// Quest mutation as actually applied, echoed back to clients.
#[derive(Debug, Clone, Serialize)]
pub struct QuestUpdate {
    pub id: String,
    pub step: u32,
    pub complete: bool,
}

/// Result of `choose`: the next node plus the side effects that were applied.
#[derive(Debug, Clone)]
pub struct ChoiceOutcome {
    pub node: DialogueNode,
    pub reward: Option<Reward>,
    pub quest_update: Option<QuestUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueError {
    NpcNotFound(String),
    InvalidOption { npc_id: String, option_id: String },
}

impl fmt::Display for DialogueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogueError::NpcNotFound(id) => write!(f, "unknown NPC '{}'", id),
            DialogueError::InvalidOption { npc_id, option_id } => {
                write!(f, "NPC '{}' has no option '{}'", npc_id, option_id)
            }
        }
    }
}

impl std::error::Error for DialogueError {}

pub struct DialogueEngine<S: PlayerStateStore> {
    registry: Arc<NpcRegistry>,
    store: Arc<S>,
}

impl<S: PlayerStateStore> DialogueEngine<S> {
    pub fn new(registry: Arc<NpcRegistry>, store: Arc<S>) -> Self {
        Self { registry, store }
    }

    /// Opening dialogue for an NPC. Lazily creates the player's state record.
    /// Fails with `NpcNotFound` before touching any state.
    pub async fn greet(&self, npc_id: &str, player_id: &str) -> Result<DialogueNode, DialogueError> {
        let npc = self
            .registry
            .get(npc_id)
            .await
            .ok_or_else(|| DialogueError::NpcNotFound(npc_id.to_string()))?;

        let state = self.store.get_or_create(player_id);

        if let Some(quest_id) = &npc.quest_id {
            if let Some(progress) = state.quests.get(quest_id) {
                if progress.complete {
                    return Ok(DialogueNode::terminal(QUEST_COMPLETE_TEXT));
                }
                return Ok(DialogueNode {
                    text: npc.reminder_for_step(progress.step).to_string(),
                    options: npc.options.clone(),
                });
            }
        }

        Ok(DialogueNode {
            text: npc.greeting.clone(),
            options: npc.options.clone(),
        })
    }

    /// Apply a chosen option's side effects and return the next node.
    pub async fn choose(
        &self,
        npc_id: &str,
        option_id: &str,
        player_id: &str,
    ) -> Result<ChoiceOutcome, DialogueError> {
        let npc = self
            .registry
            .get(npc_id)
            .await
            .ok_or_else(|| DialogueError::NpcNotFound(npc_id.to_string()))?;

        // Terminal sentinels end the conversation with no side effects
        if is_terminal_option(option_id) {
            return Ok(ChoiceOutcome {
                node: DialogueNode::terminal(FAREWELL_TEXT),
                reward: None,
                quest_update: None,
            });
        }

        let response = npc
            .response(option_id)
            .ok_or_else(|| DialogueError::InvalidOption {
                npc_id: npc_id.to_string(),
                option_id: option_id.to_string(),
            })?
            .clone();

        // All side effects for one choice land in a single mutate call
        let mut quest_update = None;
        let mut counter_value = None;
        self.store.mutate(player_id, &mut |state| {
            if let Some(reward) = &response.reward {
                state.gold += reward.gold;
                state.bank.extend(reward.items.iter().cloned());
                for (skill, amount) in &reward.xp {
                    *state.xp.entry(skill.clone()).or_insert(0) += amount;
                }
            }

            if let Some(effect) = &response.quest {
                let progress = state
                    .quests
                    .entry(effect.id.clone())
                    .or_insert_with(QuestProgress::default);
                progress.advance(effect.step_delta);
                if effect.complete {
                    progress.complete = true;
                }
                quest_update = Some(QuestUpdate {
                    id: effect.id.clone(),
                    step: progress.step,
                    complete: progress.complete,
                });
            }

            if let Some(counter) = &response.counter {
                let value = state.counters.entry(counter.clone()).or_insert(0);
                *value += 1;
                counter_value = Some(*value);
            }
        });

        let text = match counter_value {
            Some(value) => response.text.replace("{count}", &value.to_string()),
            None => response.text.clone(),
        };

        Ok(ChoiceOutcome {
            node: DialogueNode {
                text,
                options: response.next_options.clone(),
            },
            reward: response.reward.clone(),
            quest_update,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    const TEST_CONTENT: &str = r#"{
        "tutorial_guide": {
            "name": "Sage Elara",
            "greeting": "Welcome to ElderScape! I'll teach you the basics. Ready to begin?",
            "reminder": "Keep at it, adventurer.",
            "step_reminders": {
                "1": "Mine 5 copper ore at the smithing area rocks.",
                "2": "Smelt bronze bars at the furnace, then smith a bronze dagger."
            },
            "quest_id": "tutorial_basics",
            "options": [
                {"id": "tut_begin", "label": "Yes, let's begin."},
                {"id": "tut_finish", "label": "I'm done with everything."},
                {"id": "close", "label": "Not now."}
            ],
            "responses": {
                "tut_begin": {
                    "text": "Great! First, mine 5 copper ore at the rocks near the smithing area.",
                    "quest": {"id": "tutorial_basics", "step_delta": 1},
                    "next_options": [{"id": "close", "label": "Got it"}]
                },
                "tut_finish": {
                    "text": "You've learned all I can teach. Take this for your trouble.",
                    "quest": {"id": "tutorial_basics", "complete": true},
                    "reward": {"gold": 25, "items": ["bronze_dagger"], "xp": {"mining": 50}}
                }
            }
        },
        "villager_finn": {
            "name": "Villager Finn",
            "greeting": "Greetings! What can I help you with?",
            "options": [
                {"id": "idle_chat", "label": "Let's just chat"},
                {"id": "close", "label": "Close"}
            ],
            "responses": {
                "idle_chat": {
                    "text": "We've chatted {count} times now.",
                    "counter": "idleChat",
                    "next_options": [
                        {"id": "idle_chat", "label": "Chat again"},
                        {"id": "close", "label": "Close"}
                    ]
                }
            }
        }
    }"#;

    struct Fixture {
        engine: DialogueEngine<MemoryStore>,
        store: Arc<MemoryStore>,
        _temp_dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("npcs.json"), TEST_CONTENT).unwrap();

        let registry = Arc::new(NpcRegistry::new(temp_dir.path()));
        registry.load_all().await.unwrap();

        let store = Arc::new(MemoryStore::new());
        Fixture {
            engine: DialogueEngine::new(registry, store.clone()),
            store,
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_fresh_greet_returns_greeting_and_options() {
        let fx = fixture().await;
        let node = fx.engine.greet("tutorial_guide", "p1").await.unwrap();

        assert!(node.text.contains("Welcome"));
        assert!(node.options.iter().any(|o| o.id == "tut_begin"));
        assert!(!node.is_terminal());
    }

    #[tokio::test]
    async fn test_unknown_npc_creates_no_state() {
        let fx = fixture().await;
        let err = fx.engine.greet("nobody", "p1").await.unwrap_err();
        assert_eq!(err, DialogueError::NpcNotFound("nobody".to_string()));
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn test_choose_advances_quest_and_reports_next_step() {
        let fx = fixture().await;
        let outcome = fx
            .engine
            .choose("tutorial_guide", "tut_begin", "p1")
            .await
            .unwrap();

        assert!(outcome.node.text.contains("mine 5 copper ore"));
        let update = outcome.quest_update.unwrap();
        assert_eq!(update.id, "tutorial_basics");
        assert_eq!(update.step, 1);
        assert!(!update.complete);

        let state = fx.store.get_or_create("p1");
        assert_eq!(state.quests["tutorial_basics"].step, 1);
    }

    #[tokio::test]
    async fn test_greet_with_active_quest_returns_step_reminder() {
        let fx = fixture().await;
        fx.engine
            .choose("tutorial_guide", "tut_begin", "p1")
            .await
            .unwrap();

        let node = fx.engine.greet("tutorial_guide", "p1").await.unwrap();
        assert_eq!(node.text, "Mine 5 copper ore at the smithing area rocks.");
        // Standard options still offered while the quest is incomplete
        assert!(node.options.iter().any(|o| o.id == "tut_begin"));
    }

    #[tokio::test]
    async fn test_greet_after_completion_is_terminal() {
        let fx = fixture().await;
        fx.engine
            .choose("tutorial_guide", "tut_finish", "p1")
            .await
            .unwrap();

        let node = fx.engine.greet("tutorial_guide", "p1").await.unwrap();
        assert!(node.text.contains("already completed"));
        assert!(node.is_terminal());
    }

    #[tokio::test]
    async fn test_step_delta_is_noop_after_completion() {
        let fx = fixture().await;
        fx.engine
            .choose("tutorial_guide", "tut_finish", "p1")
            .await
            .unwrap();
        let step_at_completion = fx.store.get_or_create("p1").quests["tutorial_basics"].step;

        fx.engine
            .choose("tutorial_guide", "tut_begin", "p1")
            .await
            .unwrap();

        let state = fx.store.get_or_create("p1");
        assert_eq!(state.quests["tutorial_basics"].step, step_at_completion);
        assert!(state.quests["tutorial_basics"].complete);
    }

    #[tokio::test]
    async fn test_rewards_are_additive() {
        let fx = fixture().await;
        fx.engine
            .choose("tutorial_guide", "tut_finish", "p1")
            .await
            .unwrap();
        fx.engine
            .choose("tutorial_guide", "tut_finish", "p1")
            .await
            .unwrap();

        let state = fx.store.get_or_create("p1");
        assert_eq!(state.gold, 50);
        assert_eq!(state.bank, vec!["bronze_dagger".to_string(); 2]);
        assert_eq!(state.xp["mining"], 100);
    }

    #[tokio::test]
    async fn test_counter_interpolation() {
        let fx = fixture().await;
        let first = fx
            .engine
            .choose("villager_finn", "idle_chat", "p1")
            .await
            .unwrap();
        assert_eq!(first.node.text, "We've chatted 1 times now.");

        let second = fx
            .engine
            .choose("villager_finn", "idle_chat", "p1")
            .await
            .unwrap();
        assert_eq!(second.node.text, "We've chatted 2 times now.");
        assert_eq!(fx.store.get_or_create("p1").counters["idleChat"], 2);
    }

    #[tokio::test]
    async fn test_invalid_option_is_rejected() {
        let fx = fixture().await;
        let err = fx
            .engine
            .choose("villager_finn", "open_sesame", "p1")
            .await
            .unwrap_err();
        assert!(matches!(err, DialogueError::InvalidOption { .. }));
    }

    #[tokio::test]
    async fn test_close_sentinel_ends_conversation() {
        let fx = fixture().await;
        let outcome = fx.engine.choose("villager_finn", "close", "p1").await.unwrap();
        assert!(outcome.node.is_terminal());
        assert!(outcome.reward.is_none());
        assert!(outcome.quest_update.is_none());
    }
}
