//! NPC Dialogue Module
//!
//! JSON-defined dialogue trees with per-player quest progress. One
//! authoritative state machine serves every caller; clients that cache
//! content for offline play treat this as the source of truth.

pub mod definition;
pub mod engine;
pub mod registry;

pub use definition::{DialogueOption, Npc, QuestEffect, Reward};
pub use engine::{ChoiceOutcome, DialogueEngine, DialogueError, DialogueNode, QuestUpdate};
pub use registry::{HotReloadEvent, NpcRegistry};
