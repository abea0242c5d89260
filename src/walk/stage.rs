use serde::{Deserialize, Serialize};
use std::fmt;

use super::keywords::{StageRule, STAGE_RULES, USER_MESSAGE_FLOOR};
use crate::session::{Message, Role};

/// Conversational progress through the garden walk, in order
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Start,
    PlantId,
    Symptoms,
    Environment,
    CareHistory,
    Complete,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Start,
        Stage::PlantId,
        Stage::Symptoms,
        Stage::Environment,
        Stage::CareHistory,
        Stage::Complete,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::PlantId => "plant_id",
            Stage::Symptoms => "symptoms",
            Stage::Environment => "environment",
            Stage::CareHistory => "care_history",
            Stage::Complete => "complete",
        }
    }

    /// Heading shown to the user for this stage
    pub fn label(self) -> &'static str {
        match self {
            Stage::Start => "Welcome to the Garden",
            Stage::PlantId => "What plant do you have?",
            Stage::Symptoms => "What symptoms do you see?",
            Stage::Environment => "Tell me about its environment",
            Stage::CareHistory => "How have you been caring for it?",
            Stage::Complete => "Diagnosis Ready",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn rule_matches(rule: &StageRule, lower: &str) -> bool {
    rule.keywords.iter().any(|k| lower.contains(k))
        || rule
            .gated
            .iter()
            .any(|g| lower.contains(g.phrase) && lower.chars().count() > g.min_chars)
}

/// Stage suggested by one assistant utterance, if any keyword fires
pub fn stage_for_text(text: &str) -> Option<Stage> {
    let lower = text.to_lowercase();
    STAGE_RULES
        .iter()
        .find(|rule| rule_matches(rule, &lower))
        .map(|rule| rule.stage)
}

/// Infer the walk stage from the committed log plus any in-flight AI text.
///
/// Takes the highest stage any assistant message triggers, then applies the
/// user-message floor. The in-flight text counts as one more assistant
/// message for this call only.
pub fn infer_stage(messages: &[Message], in_flight: Option<&str>) -> Stage {
    let in_flight = in_flight.filter(|t| !t.trim().is_empty());
    if messages.is_empty() && in_flight.is_none() {
        return Stage::Start;
    }

    let assistant_texts = messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.content.as_str())
        .chain(in_flight);

    let mut stage = assistant_texts
        .filter_map(stage_for_text)
        .max()
        .unwrap_or(Stage::Start);

    let user_messages = messages.iter().filter(|m| m.role == Role::User).count();
    for &(count, floor) in USER_MESSAGE_FLOOR {
        if user_messages >= count && stage < floor {
            stage = floor;
        }
    }

    stage
}

/// Externally visible stage; only ever moves forward
#[derive(Debug, Clone, Default)]
pub struct StageTracker {
    current: Stage,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Apply an inferred stage. Returns the new stage if it advanced.
    pub fn observe(&mut self, inferred: Stage) -> Option<Stage> {
        if inferred > self.current {
            self.current = inferred;
            Some(inferred)
        } else {
            None
        }
    }

    /// Jump straight to `Complete`, as on a conversation-complete signal
    pub fn complete(&mut self) -> Option<Stage> {
        self.observe(Stage::Complete)
    }

    pub fn reset(&mut self) {
        self.current = Stage::Start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(text: &str) -> Message {
        Message::new(Role::Assistant, text)
    }

    fn user(text: &str) -> Message {
        Message::new(Role::User, text)
    }

    #[test]
    fn empty_log_is_start() {
        assert_eq!(infer_stage(&[], None), Stage::Start);
        assert_eq!(infer_stage(&[], Some("   ")), Stage::Start);
    }

    #[test]
    fn most_advanced_rule_wins_within_a_message() {
        // "water" would be care history, but "overwater" is a diagnosis
        assert_eq!(
            stage_for_text("You may be overwatering it."),
            Some(Stage::Complete)
        );
        assert_eq!(
            stage_for_text("How often do you water it?"),
            Some(Stage::CareHistory)
        );
        assert_eq!(stage_for_text("Thanks for sharing."), None);
    }

    #[test]
    fn highest_stage_across_messages_not_last() {
        let log = vec![
            assistant("Where does it live, indoors or outside?"),
            user("On my balcony"),
            assistant("Got it. What kind of plant is it?"),
        ];
        assert_eq!(infer_stage(&log, None), Stage::Environment);
    }

    #[test]
    fn caused_by_needs_a_long_message() {
        assert_eq!(stage_for_text("Caused by what?"), None);
        assert_eq!(
            stage_for_text("Those marks are most often caused by a pest living under the leaf."),
            Some(Stage::Complete)
        );
    }

    #[test]
    fn user_message_count_sets_a_floor() {
        let log = vec![
            assistant("Let's take a walk."),
            user("Hi"),
            user("It's a fern"),
            user("Um"),
        ];
        assert_eq!(infer_stage(&log, None), Stage::Environment);
    }

    #[test]
    fn in_flight_text_counts_as_assistant() {
        let log = vec![assistant("Let's take a walk.")];
        assert_eq!(infer_stage(&log, None), Stage::PlantId);
        assert_eq!(
            infer_stage(&log, Some("Is it getting enough sun?")),
            Stage::Environment
        );
    }

    #[test]
    fn tracker_never_moves_back() {
        let mut tracker = StageTracker::new();
        assert_eq!(tracker.observe(Stage::Symptoms), Some(Stage::Symptoms));
        assert_eq!(tracker.observe(Stage::PlantId), None);
        assert_eq!(tracker.current(), Stage::Symptoms);
        assert_eq!(tracker.complete(), Some(Stage::Complete));
        assert_eq!(tracker.complete(), None);
    }

    #[test]
    fn labels_and_names() {
        assert_eq!(Stage::CareHistory.to_string(), "care_history");
        assert_eq!(Stage::Complete.label(), "Diagnosis Ready");
        assert_eq!(Stage::from_index(1), Some(Stage::PlantId));
        assert_eq!(Stage::from_index(6), None);
    }
}
