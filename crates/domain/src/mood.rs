//! Mood vocabulary.
//!
//! Mood is a short-lived emotional state that may change every turn, unlike
//! the numeric relationship stats which move in bounded steps. The engine
//! stores moods as their display label so the statistics maps stay plain
//! strings.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// One label from the fixed mood vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MoodLabel {
    Happy,
    Sad,
    Angry,
    Excited,
    Confused,
    #[default]
    Neutral,
    Anxious,
    Content,
    Frustrated,
    Hopeful,
    Lonely,
    Jealous,
    Embarrassed,
    Affectionate,
    Playful,
    Curious,
    Grateful,
    Hurt,
}

impl MoodLabel {
    /// Get all mood labels, in the order they are offered to the model
    pub fn all() -> &'static [MoodLabel] {
        &[
            MoodLabel::Happy,
            MoodLabel::Sad,
            MoodLabel::Angry,
            MoodLabel::Excited,
            MoodLabel::Confused,
            MoodLabel::Neutral,
            MoodLabel::Anxious,
            MoodLabel::Content,
            MoodLabel::Frustrated,
            MoodLabel::Hopeful,
            MoodLabel::Lonely,
            MoodLabel::Jealous,
            MoodLabel::Embarrassed,
            MoodLabel::Affectionate,
            MoodLabel::Playful,
            MoodLabel::Curious,
            MoodLabel::Grateful,
            MoodLabel::Hurt,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MoodLabel::Happy => "Happy",
            MoodLabel::Sad => "Sad",
            MoodLabel::Angry => "Angry",
            MoodLabel::Excited => "Excited",
            MoodLabel::Confused => "Confused",
            MoodLabel::Neutral => "Neutral",
            MoodLabel::Anxious => "Anxious",
            MoodLabel::Content => "Content",
            MoodLabel::Frustrated => "Frustrated",
            MoodLabel::Hopeful => "Hopeful",
            MoodLabel::Lonely => "Lonely",
            MoodLabel::Jealous => "Jealous",
            MoodLabel::Embarrassed => "Embarrassed",
            MoodLabel::Affectionate => "Affectionate",
            MoodLabel::Playful => "Playful",
            MoodLabel::Curious => "Curious",
            MoodLabel::Grateful => "Grateful",
            MoodLabel::Hurt => "Hurt",
        }
    }

    /// Comma-separated vocabulary for prompt text.
    pub fn vocabulary() -> String {
        Self::all()
            .iter()
            .map(|m| m.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MoodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for MoodLabel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MoodLabel::all()
            .iter()
            .copied()
            .find(|m| m.display_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::parse(format!("Unknown mood: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("happy".parse::<MoodLabel>(), Ok(MoodLabel::Happy));
        assert_eq!("  NEUTRAL ".parse::<MoodLabel>(), Ok(MoodLabel::Neutral));
        assert!("ecstatic".parse::<MoodLabel>().is_err());
    }

    #[test]
    fn default_is_neutral() {
        assert_eq!(MoodLabel::default().display_name(), "Neutral");
    }

    #[test]
    fn vocabulary_lists_every_label() {
        let vocab = MoodLabel::vocabulary();
        for mood in MoodLabel::all() {
            assert!(vocab.contains(mood.display_name()));
        }
    }
}
