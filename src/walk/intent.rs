use super::keywords::{contains_any, AFFIRMATIONS, DEFERRAL_PHRASES, NEGATIONS, PHOTO_OFFER_PHRASES};

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Whole utterance is `word`, optionally followed by a single `.` or `!`
fn is_bare_word(normalized: &str, word: &str) -> bool {
    match normalized.strip_prefix(word) {
        Some(rest) => matches!(rest, "" | "." | "!"),
        None => false,
    }
}

fn starts_with_word(normalized: &str, word: &str) -> bool {
    match normalized.strip_prefix(word) {
        Some(rest) => matches!(rest, "" | "." | "!") || rest.starts_with(' ') || rest.starts_with(','),
        None => false,
    }
}

/// Does the utterance accept an offer ("yeah, sure", "let me take a photo")?
///
/// Short affirmations only count at the very start, so "yesterday" or
/// "I said okay" do not match.
pub fn is_affirmative(text: &str) -> bool {
    let normalized = normalize(text);
    AFFIRMATIONS.iter().any(|word| starts_with_word(&normalized, word))
        || contains_any(&normalized, PHOTO_OFFER_PHRASES)
}

/// Does the utterance decline or put off an offer ("nope.", "maybe later")?
pub fn is_negative(text: &str) -> bool {
    let normalized = normalize(text);
    NEGATIONS.iter().any(|word| is_bare_word(&normalized, word))
        || contains_any(&normalized, DEFERRAL_PHRASES)
}
