//! Garden-walk conversation heuristics
//!
//! Pure functions over transcript text:
//! - stage inference with a monotonic tracker
//! - affirmative / negative intent classifiers
//! - the photo side-flow state machine
//!
//! Keyword tables live in `keywords` as data.

pub mod intent;
pub mod keywords;
pub mod photo;
pub mod stage;

pub use intent::{is_affirmative, is_negative};
pub use photo::{PhotoFlow, PhotoState, PhotoTransition};
pub use stage::{infer_stage, stage_for_text, Stage, StageTracker};
