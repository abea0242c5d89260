//! Keyword tables driving the walk heuristics
//!
//! All matching is done against lowercased text. The tables are plain data
//! so they can be tuned without touching the matching code.

use super::stage::Stage;

/// Phrase that only counts when the message is longer than `min_chars`
#[derive(Debug, Clone, Copy)]
pub struct GatedPhrase {
    pub phrase: &'static str,
    pub min_chars: usize,
}

/// Substrings that put an assistant message at `stage`
#[derive(Debug, Clone, Copy)]
pub struct StageRule {
    pub stage: Stage,
    pub keywords: &'static [&'static str],
    pub gated: &'static [GatedPhrase],
}

/// Ordered from most advanced to least; the first matching rule wins per message
pub const STAGE_RULES: &[StageRule] = &[
    StageRule {
        stage: Stage::Complete,
        keywords: &[
            "happy gardening",
            "it's likely",
            "i suspect",
            "i think it",
            "sounds like",
            "i'd recommend",
            "my recommendation",
            "what to do today",
            "do today",
            "root rot",
            "fungal",
            "bacterial",
            "deficien",
            "overwater",
            "underwater",
        ],
        gated: &[GatedPhrase {
            phrase: "caused by",
            min_chars: 50,
        }],
    },
    StageRule {
        stage: Stage::CareHistory,
        keywords: &["water", "fertiliz", "care", "routine", "how long have you had"],
        gated: &[],
    },
    StageRule {
        stage: Stage::Environment,
        keywords: &["sun", "light", "indoor", "outdoor", "where", "soil", "temperature"],
        gated: &[],
    },
    StageRule {
        stage: Stage::Symptoms,
        keywords: &[
            "symptom", "yellow", "brown", "spot", "wilt", "droop", "color", "leaves", "describe",
            "seeing", "notice",
        ],
        gated: &[],
    },
    StageRule {
        stage: Stage::PlantId,
        keywords: &["take a walk", "kind of plant"],
        gated: &[],
    },
];

/// Committed user messages needed before the stage is at least the paired stage
pub const USER_MESSAGE_FLOOR: &[(usize, Stage)] = &[
    (2, Stage::Symptoms),
    (3, Stage::Environment),
    (4, Stage::CareHistory),
];

/// Short affirmations, matched at the start of the utterance only
pub const AFFIRMATIONS: &[&str] = &["yes", "yeah", "yep", "sure", "okay", "ok", "alright", "yup"];

/// Offers to show or photograph the plant (substring match)
pub const PHOTO_OFFER_PHRASES: &[&str] = &[
    "let me show you",
    "let me take",
    "i'll take",
    "take a picture",
    "take a photo",
    "show you the",
];

/// Bare negations, matched against the whole utterance
pub const NEGATIONS: &[&str] = &["no", "nope", "nah"];

/// Put-it-off phrases (substring match)
pub const DEFERRAL_PHRASES: &[&str] = &["not now", "maybe later", "skip that", "skip this", "let's skip"];

/// Assistant phrasing that asks for a photo
pub const ASSISTANT_PHOTO_TRIGGERS: &[&str] = &[
    "show me a picture",
    "show me a photo",
    "send me a photo",
    "take a picture",
    "like to see",
    "see a photo",
    "see a picture",
    "photo of",
    "picture of",
    "send a photo",
];

/// User phrasing that offers a photo
pub const USER_PHOTO_TRIGGERS: &[&str] = &[
    "show you",
    "take a picture",
    "take a photo",
    "send a picture",
    "send you a photo",
    "upload",
    "let me show",
];

/// User phrasing that turns a photo request down
pub const PHOTO_DECLINES: &[&str] = &[
    "don't want",
    "no photo",
    "no picture",
    "can't take",
    "skip",
    "not right now",
    "maybe later",
    "no thanks",
    "never mind",
    "without a photo",
    "without photo",
];

/// True if lowercased `text` contains any of `phrases`
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase))
}
