//! Prompt and placeholder text for the spirit reading.
//!
//! Callers can override the prompt via
//! [`crate::config::RitualConfig::spirit_prompt`]; the placeholders are fixed
//! because a front-end renders them on the same "analysis" line as a real
//! reading.

/// Instruction sent alongside the image to the vision model.
pub const SPIRIT_PROMPT: &str = "You are a Victorian medium communicating with a spirit. \
Analyze this image and describe the 'aura' or 'spirit' you see within the subject \
in a mysterious, spooky, yet poetic tone. Keep it under 50 words.";

/// Shown when no API key is configured; no call is attempted.
pub const SILENT_SPIRITS: &str = "The spirits are silent (Missing API Key).";

/// Shown when the caption call fails for any reason.
pub const WEAK_CONNECTION: &str = "The connection to the ethereal plane is weak.";

/// Shown when the model answers with empty text.
pub const MYSTERIOUS_PRESENCE: &str = "A mysterious presence is felt...";
