//! Fast-Path Intent Classifiers
//!
//! Pure, stateless pattern matchers that cheaply classify an incoming
//! utterance without a model call. Each matcher runs against the trimmed,
//! lower-cased utterance and skips matching entirely when the utterance is
//! longer than a small word-count cap, since these classes are by definition
//! short interjections. Unmatched input returns `false`; there is no failure
//! mode.

use rand::Rng;
use rand::seq::IndexedRandom;
use regex::Regex;
use std::sync::LazyLock;

const SMALL_TALK_WORD_CAP: usize = 10;
const REPEAT_WORD_CAP: usize = 15;
const CONFIRMATION_WORD_CAP: usize = 12;

static SMALL_TALK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(hello|hi|hii+|hey|heya|howdy|good (morning|afternoon|evening|night)",
        r"|bye|goodbye|see you|take care",
        r"|how are you|how('s| is) it going|what('s| is) up|wassup",
        r"|who are you|what('s| is) your name|nice to meet you",
        r"|thank you|thanks|i('m| am) (bored|tired|happy|sad|fine))\b"
    ))
    .expect("small talk pattern compiles")
});

static REPEAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(repeat|say (that|it) again|come again|pardon",
        r"|(couldn'?t|didn'?t|can'?t|cannot|did not|could not) (hear|catch|understand|follow)",
        r"|what did you say|once (more|again)|one more time)\b"
    ))
    .expect("repeat pattern compiles")
});

// Anchored to the start of the utterance so longer sentences that merely
// contain an affirmative word do not match.
static YES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(yes|yeah|yep|yup|sure|ok|okay|definitely|absolutely|of course",
        r"|please do|go ahead|why not|sounds good|let'?s (do it|go))\b"
    ))
    .expect("yes pattern compiles")
});

static NO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(no|nope|nah|not (now|really|today)|no thanks|no thank you",
        r"|maybe later|i('m| am) (good|fine|ok|okay)|skip (it|that))\b"
    ))
    .expect("no pattern compiles")
});

fn normalized(text: &str) -> String {
    text.trim().to_lowercase()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Greetings, farewells, feelings, "who are you"-style utterances.
pub fn is_small_talk(text: &str) -> bool {
    let text = normalized(text);
    if text.is_empty() || word_count(&text) > SMALL_TALK_WORD_CAP {
        return false;
    }
    SMALL_TALK_RE.is_match(&text)
}

/// "Didn't hear", "say that again", "pardon", and similar.
pub fn is_repeat_request(text: &str) -> bool {
    let text = normalized(text);
    if text.is_empty() || word_count(&text) > REPEAT_WORD_CAP {
        return false;
    }
    REPEAT_RE.is_match(&text)
}

/// Affirmative confirmation, anchored to the start of the utterance.
pub fn is_yes(text: &str) -> bool {
    let text = normalized(text);
    if text.is_empty() || word_count(&text) > CONFIRMATION_WORD_CAP {
        return false;
    }
    // A leading negative always wins over an embedded affirmative
    // ("no thanks" must not read as yes).
    !NO_RE.is_match(&text) && YES_RE.is_match(&text)
}

/// Negative confirmation, anchored to the start of the utterance.
pub fn is_no(text: &str) -> bool {
    let text = normalized(text);
    if text.is_empty() || word_count(&text) > CONFIRMATION_WORD_CAP {
        return false;
    }
    NO_RE.is_match(&text)
}

const REPEAT_FILLERS: &[&str] = &[
    "Oh sorry, let me say that again.",
    "My apologies, here it is once more.",
    "Sure, one more time.",
];

const SMALL_TALK_FILLERS: &[&str] = &["Hey!", "Oh nice.", "Haha, alright."];

const QUICK_FILLERS: &[&str] = &["Hmm.", "Okay.", "Got it.", "Alright."];

const THINKING_FILLERS: &[&str] = &[
    "Let me think about that.",
    "Good question, give me a second.",
    "Hmm, let me work that out.",
];

/// Selects a short acknowledgement phrase to play while the main response is
/// computed. Latency-hiding only, never user content.
pub fn pick_filler_phrase<R: Rng + ?Sized>(text: &str, rng: &mut R) -> &'static str {
    let category: &[&str] = if is_repeat_request(text) {
        REPEAT_FILLERS
    } else if is_small_talk(text) {
        SMALL_TALK_FILLERS
    } else if word_count(text.trim()) <= 6 {
        QUICK_FILLERS
    } else {
        THINKING_FILLERS
    };
    category.choose(rng).copied().unwrap_or("One moment.")
}

/// Acknowledgement prefixes used when replaying the previous explanation.
pub const REPEAT_PREFIXES: &[&str] = &[
    "Sure, here it is again.",
    "Of course, let me repeat that.",
    "No problem, once more.",
];

/// Picks a prefix for a replayed explanation.
pub fn pick_repeat_prefix<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    REPEAT_PREFIXES
        .choose(rng)
        .copied()
        .unwrap_or("Here it is again.")
}
