use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::{Complexity, EmotionalTone, UrgencyLevel};

type RuleTable<L> = Vec<(Regex, L)>;

fn table<L: Copy>(rows: &[(&str, L)]) -> RuleTable<L> {
    rows.iter()
        .filter_map(|(pattern, label)| Regex::new(pattern).ok().map(|re| (re, *label)))
        .collect()
}

fn first_match<L: Copy>(rules: &RuleTable<L>, text: &str) -> Option<L> {
    rules
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, label)| *label)
}

static TONE_RULES: LazyLock<RuleTable<EmotionalTone>> = LazyLock::new(|| {
    table(&[
        (
            r"(?i)\b(furious|outraged|unacceptable|ridiculous|disgusting|scam|rip[- ]?off)\b",
            EmotionalTone::Angry,
        ),
        (
            r"(?i)\b(frustrat\w*|annoy\w*|fed up|still waiting|no one (has )?(replied|answered)|how many times|waste of time)\b",
            EmotionalTone::Frustrated,
        ),
        (
            r"(?i)\b(worried|nervous|anxious|afraid|scared|concerned|hope it'?s ok)\b",
            EmotionalTone::Anxious,
        ),
        (
            r"(?i)\b(confused|don'?t understand|not sure (what|how)|what do you mean|unclear)\b",
            EmotionalTone::Confused,
        ),
        (
            r"(?i)(\b(can'?t wait|so excited|excited|amazing|yay)\b|!!)",
            EmotionalTone::Excited,
        ),
        (
            r"(?i)\b(thanks?|thank you|great|perfect|lovely|awesome|appreciate)\b",
            EmotionalTone::Positive,
        ),
    ])
});

static URGENCY_RULES: LazyLock<RuleTable<UrgencyLevel>> = LazyLock::new(|| {
    table(&[
        (
            r"(?i)\b(emergency|right now|immediately|as soon as possible)\b",
            UrgencyLevel::Critical,
        ),
        (
            r"(?i)\b(urgent\w*|asap|today|tonight|tomorrow|this (morning|afternoon|evening)|quickly|hurry)\b",
            UrgencyLevel::High,
        ),
        (
            r"(?i)\b(this week|this weekend|soon|next few days)\b",
            UrgencyLevel::Medium,
        ),
    ])
});

static HANDOFF_RULES: LazyLock<RuleTable<&'static str>> = LazyLock::new(|| {
    table(&[
        (
            r"(?i)\b(human|real person|actual person|live (agent|person)|(speak|talk|chat) (to|with) (someone|somebody|a person|a team member|staff|the owner))\b",
            "explicit_human_request",
        ),
        (
            r"(?i)\b(complain\w*|manager|supervisor)\b",
            "complaint_or_manager",
        ),
    ])
});

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap());
static CONJUNCTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(and|but|or|also|plus|because|however|although)\b").unwrap()
});

pub const FRUSTRATION_TURNS: usize = 3;
pub const MAX_TURNS: usize = 15;

pub fn estimate_tone(text: &str) -> EmotionalTone {
    first_match(&TONE_RULES, text).unwrap_or(EmotionalTone::Neutral)
}

pub fn estimate_urgency(text: &str, today: NaiveDate) -> UrgencyLevel {
    let by_words = first_match(&URGENCY_RULES, text).unwrap_or(UrgencyLevel::Low);

    let near_date = ISO_DATE
        .captures_iter(text)
        .filter_map(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok())
        .any(|d| (0..=2).contains(&(d - today).num_days()));

    if near_date {
        by_words.max(UrgencyLevel::High)
    } else {
        by_words
    }
}

pub fn estimate_complexity(text: &str) -> Complexity {
    let questions = text.matches('?').count();
    let sentences = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();
    let conjunctions = CONJUNCTIONS.find_iter(text).count();

    if questions >= 3 || sentences >= 5 || conjunctions >= 3 {
        Complexity::Complex
    } else if questions == 2 || sentences >= 3 || conjunctions == 2 {
        Complexity::Moderate
    } else {
        Complexity::Simple
    }
}

pub fn handoff_triggers(
    text: &str,
    tone: EmotionalTone,
    conversation_length: usize,
) -> Vec<String> {
    let mut fired: Vec<String> = HANDOFF_RULES
        .iter()
        .filter(|(re, _)| re.is_match(text))
        .map(|(_, name)| name.to_string())
        .collect();

    let heuristic_tone = estimate_tone(text);
    let frustrated = tone.is_negative() || heuristic_tone.is_negative();
    if frustrated && conversation_length > FRUSTRATION_TURNS {
        fired.push("sustained_frustration".to_string());
    }
    if conversation_length > MAX_TURNS {
        fired.push("long_conversation".to_string());
    }
    fired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    #[test]
    fn test_tone_table_order() {
        assert_eq!(estimate_tone("This is unacceptable, I'm fed up"), EmotionalTone::Angry);
        assert_eq!(estimate_tone("I'm so frustrated"), EmotionalTone::Frustrated);
        assert_eq!(estimate_tone("Thank you!"), EmotionalTone::Positive);
        assert_eq!(estimate_tone("What time do you open"), EmotionalTone::Neutral);
    }

    #[test]
    fn test_urgency_words_and_near_dates() {
        assert_eq!(estimate_urgency("I need this ASAP", today()), UrgencyLevel::High);
        assert_eq!(estimate_urgency("emergency!", today()), UrgencyLevel::Critical);
        assert_eq!(estimate_urgency("Is 2025-06-17 free?", today()), UrgencyLevel::High);
        assert_eq!(estimate_urgency("Is 2025-09-01 free?", today()), UrgencyLevel::Low);
    }

    #[test]
    fn test_complexity_thresholds() {
        assert_eq!(estimate_complexity("Hi there"), Complexity::Simple);
        assert_eq!(
            estimate_complexity("Price? Duration? Makeup included?"),
            Complexity::Complex
        );
        assert_eq!(
            estimate_complexity("I want photos and a book and frames but not makeup"),
            Complexity::Complex
        );
        assert_eq!(
            estimate_complexity("One. Two. Three. Four. Five."),
            Complexity::Complex
        );
        assert_eq!(estimate_complexity("Is it indoor? Is it long?"), Complexity::Moderate);
    }

    #[test]
    fn test_handoff_triggers_are_independent() {
        let fired = handoff_triggers("Can I speak to a human?", EmotionalTone::Neutral, 1);
        assert_eq!(fired, vec!["explicit_human_request"]);

        assert!(handoff_triggers("ok", EmotionalTone::Frustrated, 3).is_empty());
        assert_eq!(
            handoff_triggers("ok", EmotionalTone::Frustrated, 4),
            vec!["sustained_frustration"]
        );
        assert_eq!(
            handoff_triggers("I want your manager", EmotionalTone::Neutral, 16),
            vec!["complaint_or_manager", "long_conversation"]
        );
    }
}
