//! Structured Output Schemas
//!
//! Typed records the LLM port fills in via forced tool calls. Each schema is
//! derived with `schemars` so the JSON schema handed to the model and the
//! deserialized Rust value cannot drift apart. A model that declines to
//! populate a schema yields `None` at the port, which every caller treats as
//! a first-class outcome, not an error.

use crate::state::{MAX_LESSON_STEPS, MIN_LESSON_STEPS};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether a query deserves a short factual answer or a structured lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Simple or factual; answerable in a few sentences.
    General,
    /// Conceptual; benefits from a multi-step breakdown.
    Explanation,
}

/// Classification of an incoming user query.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryClassification {
    #[schemars(
        description = "'general' for simple factual questions answerable in a few sentences, 'explanation' for conceptual questions that benefit from a structured multi-step breakdown"
    )]
    pub query_type: QueryType,
    #[schemars(description = "A clear, concise version of the topic the user is asking about")]
    pub topic: String,
}

/// An ordered lesson plan of 3-5 sub-topics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LessonPlan {
    #[schemars(description = "A clear, refined version of the topic name")]
    pub topic: String,
    #[schemars(
        description = "A list of minimum 3 and maximum 5 detailed sub-topic steps, ordered from foundational to advanced"
    )]
    pub steps: Vec<String>,
}

impl LessonPlan {
    /// Clamps the plan to the 3-5 step bound, padding a short plan with
    /// generic steps so the lesson invariants hold even on a thin model reply.
    pub fn normalized_steps(mut self) -> Vec<String> {
        self.steps.retain(|s| !s.trim().is_empty());
        self.steps.truncate(MAX_LESSON_STEPS);
        let mut n = 1;
        while self.steps.len() < MIN_LESSON_STEPS {
            self.steps
                .push(format!("A closer look at {}, part {}", self.topic, n));
            n += 1;
        }
        self.steps
    }
}

fn default_understanding() -> u8 {
    5
}

/// The evaluator's grade of a learner answer. `understanding_level` is
/// telemetry only; no routing decision consumes it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Evaluation {
    #[schemars(description = "True if the answer demonstrates understanding of the concept")]
    pub is_correct: bool,
    #[schemars(
        description = "Warm praise when correct; when incorrect, appreciate the attempt then clearly explain the correct answer"
    )]
    pub feedback: String,
    #[serde(default = "default_understanding")]
    #[schemars(description = "Rate the user's understanding from 1 to 10", range(min = 1, max = 10))]
    pub understanding_level: u8,
}

/// What the learner meant by a mid-lesson message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LessonIntent {
    /// Answering the open lesson question.
    Answer,
    /// Asking for more detail on the current sub-topic.
    Clarification,
    /// Wants to leave the lesson for something new.
    NewTopic,
    /// An unrelated question, without asking to switch topics.
    OffTopicQuestion,
    /// Casual conversation, greetings, feelings.
    SmallTalk,
    /// Wants the previous message replayed.
    RepeatRequest,
}

/// What the engine should do about a mid-lesson message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Treat the message as an answer and proceed (default when ambiguous).
    ContinueLesson,
    /// Answer a clarifying question, then return to the lesson.
    AnswerAndContinue,
    /// Exit the lesson and reclassify the utterance.
    SwitchTopic,
    /// Politely steer an off-topic question back to the lesson.
    PolitelyRedirect,
    /// Respond warmly, then remind about the lesson.
    HandleSmallTalk,
    /// Replay the previous explanation.
    RepeatLastMessage,
}

/// Mid-lesson intent classification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopicAnalysis {
    #[schemars(description = "True if the message relates to the current lesson topic, even tangentially")]
    pub is_related: bool,
    pub intent: LessonIntent,
    /// Telemetry only; routing follows `suggested_action`.
    #[serde(default = "default_confidence")]
    #[schemars(description = "Confidence in the analysis from 0.0 to 1.0", range(min = 0.0, max = 1.0))]
    pub confidence: f32,
    pub suggested_action: SuggestedAction,
}

fn default_confidence() -> f32 {
    0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lesson_plan_pads_short_plans_to_minimum() {
        let plan = LessonPlan {
            topic: "gravity".to_string(),
            steps: vec!["what gravity is".to_string()],
        };
        let steps = plan.normalized_steps();
        assert_eq!(steps.len(), MIN_LESSON_STEPS);
        assert_eq!(steps[0], "what gravity is");
        assert!(steps[1].contains("gravity"));
    }

    #[test]
    fn lesson_plan_clamps_long_plans_to_maximum() {
        let plan = LessonPlan {
            topic: "history".to_string(),
            steps: (0..9).map(|i| format!("step {i}")).collect(),
        };
        assert_eq!(plan.normalized_steps().len(), MAX_LESSON_STEPS);
    }

    #[test]
    fn lesson_plan_drops_blank_steps_before_padding() {
        let plan = LessonPlan {
            topic: "cells".to_string(),
            steps: vec!["  ".to_string(), "membranes".to_string(), "".to_string()],
        };
        let steps = plan.normalized_steps();
        assert_eq!(steps.len(), MIN_LESSON_STEPS);
        assert_eq!(steps[0], "membranes");
    }

    #[test]
    fn topic_analysis_deserializes_snake_case_labels() {
        let json = r#"{
            "is_related": true,
            "intent": "repeat_request",
            "suggested_action": "repeat_last_message"
        }"#;
        let analysis: TopicAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.intent, LessonIntent::RepeatRequest);
        assert_eq!(analysis.suggested_action, SuggestedAction::RepeatLastMessage);
        // Omitted confidence falls back to the default.
        assert!((analysis.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn evaluation_defaults_understanding_level() {
        let json = r#"{"is_correct": true, "feedback": "Nailed it."}"#;
        let eval: Evaluation = serde_json::from_str(json).unwrap();
        assert_eq!(eval.understanding_level, 5);
    }

    #[test]
    fn query_classification_deserializes_lowercase_labels() {
        let json = r#"{"query_type": "explanation", "topic": "photosynthesis"}"#;
        let c: QueryClassification = serde_json::from_str(json).unwrap();
        assert_eq!(c.query_type, QueryType::Explanation);
        assert_eq!(c.topic, "photosynthesis");
    }
}
