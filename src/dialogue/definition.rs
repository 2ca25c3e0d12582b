//! NPC Definition Structures
//!
//! These structures are deserialized from JSON content files. A content file
//! maps NPC id -> raw NPC definition; see `data/npcs.json`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Option ids that always end the conversation instead of resolving to a
/// response entry.
pub const TERMINAL_OPTIONS: &[&str] = &["close", "continue"];

/// Text returned when a terminal option is chosen.
pub const FAREWELL_TEXT: &str = "Safe travels!";

/// Text returned by `greet` once the NPC's quest is complete.
pub const QUEST_COMPLETE_TEXT: &str =
    "You've already completed my quest. Thank you again!";

pub fn is_terminal_option(option_id: &str) -> bool {
    TERMINAL_OPTIONS.contains(&option_id)
}

/// A content file: NPC id -> raw definition
pub type RawNpcFile = HashMap<String, RawNpc>;

/// Raw NPC data as it appears in JSON
#[derive(Debug, Clone, Deserialize)]
pub struct RawNpc {
    /// Display name (e.g. "Sage Elara")
    pub name: String,
    pub greeting: String,
    /// Shown instead of the greeting while the linked quest is incomplete
    #[serde(default)]
    pub reminder: Option<String>,
    /// Per-step reminder overrides, keyed by step number
    #[serde(default)]
    pub step_reminders: HashMap<u32, String>,
    /// Quest this NPC tracks, if any
    #[serde(default)]
    pub quest_id: Option<String>,
    /// Options shown at greeting, in order
    #[serde(default)]
    pub options: Vec<RawOption>,
    /// Option id -> response
    #[serde(default)]
    pub responses: HashMap<String, RawResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOption {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResponse {
    pub text: String,
    #[serde(default)]
    pub reward: Option<RawReward>,
    #[serde(default)]
    pub quest: Option<RawQuestEffect>,
    /// Counter to increment; its new value replaces `{count}` in the text
    #[serde(default)]
    pub counter: Option<String>,
    /// Follow-up options; empty means the conversation ends
    #[serde(default)]
    pub next_options: Vec<RawOption>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReward {
    #[serde(default)]
    pub gold: i64,
    #[serde(default)]
    pub items: Vec<String>,
    /// Skill name -> experience amount
    #[serde(default)]
    pub xp: HashMap<String, i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestEffect {
    pub id: String,
    #[serde(default = "default_step_delta")]
    pub step_delta: i32,
    #[serde(default)]
    pub complete: bool,
}

fn default_step_delta() -> i32 {
    1
}

// ============================================================================
// Resolved NPC Structures (after validation)
// ============================================================================

/// One selectable dialogue option
#[derive(Debug, Clone, Serialize)]
pub struct DialogueOption {
    pub id: String,
    pub label: String,
}

impl DialogueOption {
    fn from_raw(raw: &RawOption) -> Self {
        Self {
            id: raw.id.clone(),
            label: raw.label.clone(),
        }
    }
}

/// Reward granted by an option. Always additive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reward {
    pub gold: i64,
    pub items: Vec<String>,
    pub xp: HashMap<String, i64>,
}

impl Reward {
    fn from_raw(raw: &RawReward) -> Self {
        Self {
            gold: raw.gold,
            items: raw.items.clone(),
            xp: raw.xp.clone(),
        }
    }
}

/// Quest mutation attached to an option
#[derive(Debug, Clone, Serialize)]
pub struct QuestEffect {
    pub id: String,
    pub step_delta: i32,
    pub complete: bool,
}

impl QuestEffect {
    fn from_raw(raw: &RawQuestEffect) -> Self {
        Self {
            id: raw.id.clone(),
            step_delta: raw.step_delta,
            complete: raw.complete,
        }
    }
}

/// A resolved response to a chosen option
#[derive(Debug, Clone)]
pub struct Response {
    pub text: String,
    pub reward: Option<Reward>,
    pub quest: Option<QuestEffect>,
    pub counter: Option<String>,
    pub next_options: Vec<DialogueOption>,
}

impl Response {
    fn from_raw(raw: &RawResponse) -> Self {
        Self {
            text: raw.text.clone(),
            reward: raw.reward.as_ref().map(Reward::from_raw),
            quest: raw.quest.as_ref().map(QuestEffect::from_raw),
            counter: raw.counter.clone(),
            next_options: raw.next_options.iter().map(DialogueOption::from_raw).collect(),
        }
    }
}

/// A fully validated NPC definition
#[derive(Debug, Clone)]
pub struct Npc {
    pub id: String,
    pub name: String,
    pub greeting: String,
    pub reminder: Option<String>,
    pub step_reminders: HashMap<u32, String>,
    pub quest_id: Option<String>,
    pub options: Vec<DialogueOption>,
    pub responses: HashMap<String, Response>,
}

impl Npc {
    /// Build an NPC from raw JSON data, enforcing the option invariant:
    /// every referenced option id must resolve to a response or be terminal.
    pub fn from_raw(id: &str, raw: &RawNpc) -> Result<Self, String> {
        for opt in &raw.options {
            if !is_terminal_option(&opt.id) && !raw.responses.contains_key(&opt.id) {
                return Err(format!(
                    "NPC '{}' option '{}' has no response entry",
                    id, opt.id
                ));
            }
        }
        for (option_id, response) in &raw.responses {
            for next in &response.next_options {
                if !is_terminal_option(&next.id) && !raw.responses.contains_key(&next.id) {
                    return Err(format!(
                        "NPC '{}' response '{}' links to unknown option '{}'",
                        id, option_id, next.id
                    ));
                }
            }
        }

        Ok(Self {
            id: id.to_string(),
            name: raw.name.clone(),
            greeting: raw.greeting.clone(),
            reminder: raw.reminder.clone(),
            step_reminders: raw.step_reminders.clone(),
            quest_id: raw.quest_id.clone(),
            options: raw.options.iter().map(DialogueOption::from_raw).collect(),
            responses: raw
                .responses
                .iter()
                .map(|(k, v)| (k.clone(), Response::from_raw(v)))
                .collect(),
        })
    }

    /// Reminder text for a quest at the given step, falling back from the
    /// per-step table to the flat reminder to the greeting.
    pub fn reminder_for_step(&self, step: u32) -> &str {
        self.step_reminders
            .get(&step)
            .or(self.reminder.as_ref())
            .unwrap_or(&self.greeting)
    }

    pub fn response(&self, option_id: &str) -> Option<&Response> {
        self.responses.get(option_id)
    }
}
