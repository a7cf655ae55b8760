//! Session State for the Guided Tutoring Agent
//!
//! One `SessionState` exists per conversation thread, keyed by an opaque
//! session identifier. It is loaded at the start of every turn, mutated by
//! exactly one traversal of the dialog engine, and persisted at the turn
//! boundary. The struct is a fixed-schema record rather than an open map so
//! that routing over it stays exhaustive and compiler-checked.

use serde::{Deserialize, Serialize};

/// Upper bound on the number of sub-topics in a lesson plan.
pub const MAX_LESSON_STEPS: usize = 5;
/// Lower bound on the number of sub-topics in a lesson plan.
pub const MIN_LESSON_STEPS: usize = 3;

/// The author of a message in the conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single role-tagged entry in the append-only conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Whether the session is answering ad hoc or running a structured lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    General,
    Explanation,
}

/// Records what the previous node produced. Used purely for routing between
/// nodes within a traversal; never user-visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastAction {
    #[default]
    None,
    ClassifiedGeneral,
    ClassifiedExplanation,
    GeneralAnswered,
    OfferedLesson,
    ConfirmedLesson,
    DeclinedLesson,
    AmbiguousConfirmation,
    Planned,
    Explained,
    WaitingForResponse,
    Repeated,
    ExitedLesson,
    AnsweredQuestion,
    Redirected,
    SmallTalkResponded,
    ContextAnalyzed,
    Proceed,
    CompletedLesson,
}

/// An opaque identity and display reference for the learner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

impl UserRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The full dialog state for one session.
///
/// Invariants (enforced by the engine, checked in tests):
/// - `mode == Explanation` implies `topic` and `lesson_plan` are non-empty,
///   except transiently while the plan is being constructed.
/// - While a lesson is active, `lesson_step` stays in
///   `[1, lesson_plan.len() + 1]`; reaching `len + 1` triggers lesson
///   completion and a reset back to general mode.
/// - `feedback` and `last_explanation` are scoped to the current lesson and
///   cleared on lesson exit or completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// The current user utterance. Mutated every turn, not itself history.
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub user: UserRef,
    /// Ordered, append-only conversation log. Insertion order is load-bearing:
    /// the last user and last assistant messages are consulted every turn.
    #[serde(default)]
    pub message_log: Vec<ChatMessage>,
    #[serde(default)]
    pub mode: SessionMode,
    /// The active lesson's subject. Empty when no lesson is running.
    #[serde(default)]
    pub topic: String,
    /// Ordered sub-topic descriptions; 3-5 entries while a lesson is active.
    #[serde(default)]
    pub lesson_plan: Vec<String>,
    /// 1-indexed cursor into `lesson_plan`; 0 when no lesson is active.
    #[serde(default)]
    pub lesson_step: usize,
    #[serde(default)]
    pub last_action: LastAction,
    /// True exactly when the last assistant turn ended with a yes/no lesson offer.
    #[serde(default)]
    pub awaiting_lesson_confirmation: bool,
    /// Topic staged between classification/offer and lesson planning.
    #[serde(default)]
    pub pending_topic: String,
    /// Evaluator remark to prepend to the next explanation; cleared once consumed.
    #[serde(default)]
    pub feedback: String,
    /// Most recent substantive explanation, served verbatim on repeat requests.
    #[serde(default)]
    pub last_explanation: String,
}

impl SessionState {
    /// Bootstraps a fresh session on first contact: general mode, empty
    /// lesson fields.
    pub fn new(user: UserRef) -> Self {
        Self {
            query: String::new(),
            user,
            message_log: Vec::new(),
            mode: SessionMode::General,
            topic: String::new(),
            lesson_plan: Vec::new(),
            lesson_step: 0,
            last_action: LastAction::None,
            awaiting_lesson_confirmation: false,
            pending_topic: String::new(),
            feedback: String::new(),
            last_explanation: String::new(),
        }
    }

    /// True when a structured lesson is in progress.
    pub fn lesson_active(&self) -> bool {
        self.mode == SessionMode::Explanation
            && !self.topic.is_empty()
            && !self.lesson_plan.is_empty()
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.message_log
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }

    pub fn last_assistant_message(&self) -> Option<&str> {
        self.message_log
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.message_log.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.message_log.push(ChatMessage::assistant(content));
    }

    /// Clears every lesson-scoped field and returns the session to general
    /// mode. Used on lesson completion and on mid-lesson exit.
    pub fn reset_lesson(&mut self) {
        self.mode = SessionMode::General;
        self.topic.clear();
        self.lesson_plan.clear();
        self.lesson_step = 0;
        self.pending_topic.clear();
        self.feedback.clear();
        self.last_explanation.clear();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(UserRef::default())
    }
}
