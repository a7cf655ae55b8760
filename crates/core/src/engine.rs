//! Dialog Engine
//!
//! The guided-learning state machine. A turn is one traversal of a directed
//! graph of nodes over a single mutable `SessionState`; edges are decided by
//! `last_action`, `mode`, and the lesson cursor, written out as explicit
//! `match` arms so every route is compiler-checked. A traversal may cross
//! several nodes (the planner immediately produces the first explanation,
//! the evaluator immediately advances or completes) before hitting a
//! terminal node, at which point the caller persists the state.
//!
//! Every node that calls the model carries a deterministic fallback for both
//! raised errors and declined structured calls. Fallbacks keep `last_action`
//! and the state shape identical to the success path: failures degrade
//! answer quality, never control flow.

use crate::classifiers;
use crate::llm::{LlmClient, call_structured};
use crate::prompts;
use crate::schemas::{
    Evaluation, LessonPlan, QueryClassification, QueryType, SuggestedAction, TopicAnalysis,
};
use crate::state::{LastAction, MessageRole, SessionMode, SessionState};
use anyhow::{Result, anyhow};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// The named processing steps of the dialog graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    ClassifyQuery,
    GeneralAnswer,
    BriefAnswerAndOffer,
    HandleLessonConfirmation,
    PlanLesson,
    GenerateExplanation,
    AnalyzeTopicContext,
    EvaluateResponse,
    CompleteLesson,
}

/// What a node hands back to the traversal loop.
enum Transition {
    Next(Node),
    End,
}

// The longest legal traversal crosses three nodes; anything past this bound
// is a routing bug, not a long conversation.
const MAX_TRAVERSAL_NODES: usize = 8;

const GENERAL_ANSWER_FALLBACK: &str =
    "I am having trouble looking that up right now. Give me a moment and ask me again, I would love to help.";
const DECLINE_MESSAGE: &str =
    "No problem at all. Feel free to ask me anything else whenever you are curious.";
const CLARIFICATION_FALLBACK: &str =
    "That is a fair question, and it is worth sitting with. Let us return to where we were and keep going.";
const SMALL_TALK_FALLBACK: &str = "Haha, fair enough.";
const PROCEED_FEEDBACK_FALLBACK: &str =
    "Thanks for sharing your thinking. Let us keep going.";
const COMPLETE_FALLBACK: &str =
    "Well done, you made it through the whole lesson. Ask me anything else whenever you are ready.";

fn offer_fallback(topic: &str) -> String {
    format!(
        "That is a great question about {topic}. Would you like me to break it down into a short step by step lesson?"
    )
}

fn explanation_fallback(step_content: &str) -> String {
    format!("Let us think about {step_content}. What do you already know about it?")
}

fn fallback_plan(topic: &str) -> Vec<String> {
    vec![
        format!("What {topic} is and why it matters"),
        format!("How {topic} works"),
        format!("{topic} in everyday life"),
    ]
}

/// Picks the entry node for a turn. Evaluated once, before any node runs.
pub fn route_start(state: &SessionState) -> Node {
    if state.awaiting_lesson_confirmation {
        Node::HandleLessonConfirmation
    } else if state.lesson_active() {
        Node::AnalyzeTopicContext
    } else {
        Node::ClassifyQuery
    }
}

/// The dialog orchestration state machine.
///
/// Construct once at startup and share; the engine holds no per-session
/// state of its own. Randomness is seedable for deterministic tests.
pub struct DialogEngine {
    llm: Arc<dyn LlmClient>,
    rng: Mutex<StdRng>,
}

impl DialogEngine {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self::with_rng(llm, StdRng::from_os_rng())
    }

    pub fn with_rng(llm: Arc<dyn LlmClient>, rng: StdRng) -> Self {
        Self {
            llm,
            rng: Mutex::new(rng),
        }
    }

    /// Drives one traversal from the routed entry node to a terminal node.
    ///
    /// The state carries the new user utterance in `query` and at the tail
    /// of `message_log`; on return, the messages appended during this
    /// traversal are the turn's response.
    pub async fn run(&self, state: &mut SessionState) -> Result<()> {
        let mut node = route_start(state);
        for _ in 0..MAX_TRAVERSAL_NODES {
            debug!(?node, "running dialog node");
            node = match self.run_node(node, state).await? {
                Transition::Next(next) => next,
                Transition::End => return Ok(()),
            };
        }
        Err(anyhow!(
            "dialog traversal exceeded {MAX_TRAVERSAL_NODES} nodes without terminating"
        ))
    }

    async fn run_node(&self, node: Node, state: &mut SessionState) -> Result<Transition> {
        match node {
            Node::ClassifyQuery => self.classify_query(state).await,
            Node::GeneralAnswer => self.general_answer(state).await,
            Node::BriefAnswerAndOffer => self.brief_answer_and_offer(state).await,
            Node::HandleLessonConfirmation => Ok(self.handle_lesson_confirmation(state)),
            Node::PlanLesson => self.plan_lesson(state).await,
            Node::GenerateExplanation => self.generate_explanation(state).await,
            Node::AnalyzeTopicContext => self.analyze_topic_context(state).await,
            Node::EvaluateResponse => self.evaluate_response(state).await,
            Node::CompleteLesson => self.complete_lesson(state).await,
        }
    }

    /// Free-form call with a deterministic substitute on failure.
    async fn invoke_or(&self, prompt: &str, fallback: &str) -> String {
        match self.llm.invoke(prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => fallback.to_string(),
            Err(e) => {
                warn!(error = ?e, "free-form model call failed; using fallback text");
                fallback.to_string()
            }
        }
    }

    /// Structured call folded to `None` on failure, so callers have a single
    /// fallback branch for both raised errors and declined tool calls.
    async fn structured_or_none<T>(
        &self,
        prompt: &str,
        name: &'static str,
        description: &'static str,
    ) -> Option<T>
    where
        T: serde::de::DeserializeOwned + schemars::JsonSchema,
    {
        match call_structured::<T>(self.llm.as_ref(), prompt, name, description).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = ?e, tool = name, "structured model call failed");
                None
            }
        }
    }

    /// Labels the utterance general vs explanation and stages a topic.
    async fn classify_query(&self, state: &mut SessionState) -> Result<Transition> {
        let prompt = prompts::query_classifier(&state.query);
        let classification = self
            .structured_or_none::<QueryClassification>(
                &prompt,
                "classify_query",
                "Classify whether the query needs a short factual answer or a structured multi-step lesson",
            )
            .await;

        match classification {
            Some(c) => {
                state.pending_topic = if c.topic.trim().is_empty() {
                    state.query.clone()
                } else {
                    c.topic
                };
                if c.query_type == QueryType::Explanation {
                    state.last_action = LastAction::ClassifiedExplanation;
                    Ok(Transition::Next(Node::BriefAnswerAndOffer))
                } else {
                    state.last_action = LastAction::ClassifiedGeneral;
                    Ok(Transition::Next(Node::GeneralAnswer))
                }
            }
            None => {
                state.pending_topic = state.query.clone();
                state.last_action = LastAction::ClassifiedGeneral;
                Ok(Transition::Next(Node::GeneralAnswer))
            }
        }
    }

    /// One free-form short answer; terminal.
    async fn general_answer(&self, state: &mut SessionState) -> Result<Transition> {
        let prompt = prompts::general_answer(&state.query);
        let answer = self.invoke_or(&prompt, GENERAL_ANSWER_FALLBACK).await;
        state.push_assistant(answer);
        state.last_action = LastAction::GeneralAnswered;
        state.mode = SessionMode::General;
        Ok(Transition::End)
    }

    /// Brief answer plus a yes/no lesson offer; terminal.
    async fn brief_answer_and_offer(&self, state: &mut SessionState) -> Result<Transition> {
        let topic = if state.pending_topic.is_empty() {
            state.query.clone()
        } else {
            state.pending_topic.clone()
        };
        let prompt = prompts::brief_answer(&state.query, &topic);
        let answer = self.invoke_or(&prompt, &offer_fallback(&topic)).await;
        state.push_assistant(answer);
        state.pending_topic = topic;
        state.awaiting_lesson_confirmation = true;
        state.last_action = LastAction::OfferedLesson;
        Ok(Transition::End)
    }

    /// Resolves the pending yes/no lesson offer via the fast-path
    /// classifiers. No model call.
    fn handle_lesson_confirmation(&self, state: &mut SessionState) -> Transition {
        state.awaiting_lesson_confirmation = false;
        if classifiers::is_yes(&state.query) {
            state.last_action = LastAction::ConfirmedLesson;
            state.mode = SessionMode::Explanation;
            Transition::Next(Node::PlanLesson)
        } else if classifiers::is_no(&state.query) {
            state.push_assistant(DECLINE_MESSAGE);
            state.last_action = LastAction::DeclinedLesson;
            state.mode = SessionMode::General;
            state.pending_topic.clear();
            Transition::End
        } else {
            // Neither yes nor no: the learner moved on. Reclassify the new
            // utterance from scratch.
            state.last_action = LastAction::AmbiguousConfirmation;
            state.mode = SessionMode::General;
            state.pending_topic.clear();
            Transition::Next(Node::ClassifyQuery)
        }
    }

    /// Produces the 3-5 step lesson plan and announces the lesson.
    async fn plan_lesson(&self, state: &mut SessionState) -> Result<Transition> {
        let requested = if state.pending_topic.is_empty() {
            state.query.clone()
        } else {
            state.pending_topic.clone()
        };
        let prompt = prompts::lesson_planner(&requested);
        let plan = self
            .structured_or_none::<LessonPlan>(
                &prompt,
                "plan_lesson",
                "Produce an ordered lesson plan of 3 to 5 sub-topics for the requested topic",
            )
            .await;

        let (topic, steps) = match plan {
            Some(p) => {
                let topic = if p.topic.trim().is_empty() {
                    requested.clone()
                } else {
                    p.topic.clone()
                };
                (topic, p.normalized_steps())
            }
            None => (requested.clone(), fallback_plan(&requested)),
        };

        state.topic = topic;
        state.lesson_plan = steps;
        state.lesson_step = 1;
        state.mode = SessionMode::Explanation;
        state.pending_topic.clear();
        state.last_action = LastAction::Planned;
        state.push_assistant(format!(
            "Great, let us explore {} together. I have broken it into {} short steps, starting right now.",
            state.topic,
            state.lesson_plan.len()
        ));
        Ok(Transition::Next(Node::GenerateExplanation))
    }

    /// Explains the current sub-topic and asks a check question; terminal.
    async fn generate_explanation(&self, state: &mut SessionState) -> Result<Transition> {
        let total = state.lesson_plan.len();
        let step_content = state
            .lesson_plan
            .get(state.lesson_step.saturating_sub(1))
            .cloned()
            .unwrap_or_default();
        let prompt =
            prompts::tutor_explanation(&state.topic, state.lesson_step, total, &step_content);
        let explanation = self
            .invoke_or(&prompt, &explanation_fallback(&step_content))
            .await;

        let message = if state.feedback.is_empty() {
            explanation.clone()
        } else {
            format!("{} {}", state.feedback, explanation)
        };
        state.push_assistant(message);
        state.last_explanation = explanation;
        state.feedback.clear();
        state.last_action = LastAction::Explained;
        Ok(Transition::End)
    }

    /// Classifies a mid-lesson utterance and routes it: answer, repeat,
    /// clarification, exit, off-topic, or small talk.
    async fn analyze_topic_context(&self, state: &mut SessionState) -> Result<Transition> {
        // The log can end on our own message if the learner has not replied
        // yet; there is nothing to analyze.
        if state.message_log.last().map(|m| m.role) != Some(MessageRole::User) {
            state.last_action = LastAction::WaitingForResponse;
            return Ok(Transition::End);
        }

        // Fast path: serve repeats from state, no model call.
        if classifiers::is_repeat_request(&state.query) {
            return Ok(self.replay_last_explanation(state).await);
        }

        let total = state.lesson_plan.len();
        let step_content = state
            .lesson_plan
            .get(state.lesson_step.saturating_sub(1))
            .cloned()
            .unwrap_or_default();
        let last_agent_message = state
            .last_assistant_message()
            .unwrap_or_default()
            .to_string();
        let prompt = prompts::topic_analysis(
            &state.topic,
            state.lesson_step,
            total,
            &step_content,
            &last_agent_message,
            &state.query,
        );
        let analysis = self
            .structured_or_none::<TopicAnalysis>(
                &prompt,
                "analyze_topic_context",
                "Determine the intent of the user's message during an active lesson",
            )
            .await;

        // An unreadable analysis is treated as an answer to the open question.
        let action = analysis
            .map(|a| a.suggested_action)
            .unwrap_or(SuggestedAction::ContinueLesson);

        match action {
            SuggestedAction::ContinueLesson => {
                state.last_action = LastAction::ContextAnalyzed;
                Ok(Transition::Next(Node::EvaluateResponse))
            }
            SuggestedAction::RepeatLastMessage => Ok(self.replay_last_explanation(state).await),
            SuggestedAction::SwitchTopic => {
                let covered = state.lesson_step.saturating_sub(1);
                state.push_assistant(format!(
                    "No problem, we can set {} aside for now. We covered {} of {} steps, and we can pick it back up any time.",
                    state.topic, covered, total
                ));
                state.reset_lesson();
                state.last_action = LastAction::ExitedLesson;
                Ok(Transition::Next(Node::ClassifyQuery))
            }
            SuggestedAction::AnswerAndContinue => {
                let prompt =
                    prompts::clarification_answer(&state.topic, &state.query, &step_content);
                let answer = self.invoke_or(&prompt, CLARIFICATION_FALLBACK).await;
                state.push_assistant(answer);
                state.last_action = LastAction::AnsweredQuestion;
                Ok(Transition::End)
            }
            SuggestedAction::PolitelyRedirect => {
                state.push_assistant(format!(
                    "That is an interesting one, but let us stay focused on {} for now. You can ask me about it right after the lesson.",
                    state.topic
                ));
                state.last_action = LastAction::Redirected;
                Ok(Transition::End)
            }
            SuggestedAction::HandleSmallTalk => {
                let prompt = prompts::small_talk(&state.query);
                let reply = self.invoke_or(&prompt, SMALL_TALK_FALLBACK).await;
                state.push_assistant(format!(
                    "{} Anyway, back to our lesson on {}.",
                    reply, state.topic
                ));
                state.last_action = LastAction::SmallTalkResponded;
                Ok(Transition::End)
            }
        }
    }

    /// Replays the previous explanation verbatim behind a short
    /// acknowledgement prefix. No model call; terminal.
    async fn replay_last_explanation(&self, state: &mut SessionState) -> Transition {
        let prefix = {
            let mut rng = self.rng.lock().await;
            classifiers::pick_repeat_prefix(&mut *rng)
        };
        let text = if state.last_explanation.is_empty() {
            state
                .last_assistant_message()
                .unwrap_or("I do not have anything to repeat yet.")
                .to_string()
        } else {
            state.last_explanation.clone()
        };
        state.push_assistant(format!("{prefix} {text}"));
        state.last_action = LastAction::Repeated;
        Transition::End
    }

    /// Grades the learner's answer against the open question and advances.
    ///
    /// The evaluator always advances; a wrong answer earns corrective
    /// feedback on the next step rather than a re-explanation. (An earlier
    /// engine generation looped back on wrong answers; that policy is
    /// superseded.)
    async fn evaluate_response(&self, state: &mut SessionState) -> Result<Transition> {
        let question = state
            .last_assistant_message()
            .unwrap_or_default()
            .to_string();
        let prompt = prompts::evaluator(&state.topic, &question, &state.query);
        let evaluation = self
            .structured_or_none::<Evaluation>(
                &prompt,
                "evaluate_response",
                "Grade the student's answer and produce supportive feedback",
            )
            .await;

        state.feedback = match evaluation {
            Some(e) => {
                debug!(
                    is_correct = e.is_correct,
                    understanding_level = e.understanding_level,
                    "evaluated learner response"
                );
                if e.feedback.trim().is_empty() {
                    PROCEED_FEEDBACK_FALLBACK.to_string()
                } else {
                    e.feedback
                }
            }
            None => PROCEED_FEEDBACK_FALLBACK.to_string(),
        };
        state.lesson_step += 1;
        state.last_action = LastAction::Proceed;

        if state.lesson_step > state.lesson_plan.len() {
            Ok(Transition::Next(Node::CompleteLesson))
        } else {
            Ok(Transition::Next(Node::GenerateExplanation))
        }
    }

    /// Wraps up the lesson and resets the session to general mode; terminal.
    async fn complete_lesson(&self, state: &mut SessionState) -> Result<Transition> {
        let prompt = prompts::lesson_complete(&state.topic, state.lesson_plan.len());
        let congrats = self.invoke_or(&prompt, COMPLETE_FALLBACK).await;
        let message = if state.feedback.is_empty() {
            congrats
        } else {
            format!("{} {}", state.feedback, congrats)
        };
        state.push_assistant(message);
        state.reset_lesson();
        state.last_action = LastAction::CompletedLesson;
        Ok(Transition::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::ScriptedLlm;
    use crate::state::UserRef;
    use serde_json::json;

    fn engine_with(llm: Arc<ScriptedLlm>) -> DialogEngine {
        DialogEngine::with_rng(llm, StdRng::seed_from_u64(11))
    }

    fn new_turn(query: &str) -> SessionState {
        let mut state = SessionState::new(UserRef::new("u1", "Asha"));
        state.query = query.to_string();
        state.push_user(query);
        state
    }

    fn mid_lesson_state(step: usize, plan_len: usize, query: &str) -> SessionState {
        let mut state = SessionState::new(UserRef::new("u1", "Asha"));
        state.mode = SessionMode::Explanation;
        state.topic = "photosynthesis".to_string();
        state.lesson_plan = (1..=plan_len).map(|i| format!("sub-topic {i}")).collect();
        state.lesson_step = step;
        state.last_explanation = "Plants use sunlight to turn water and carbon dioxide into sugar.".to_string();
        state.push_assistant("Here is a question to check your understanding: what do plants need?");
        state.query = query.to_string();
        state.push_user(query);
        state
    }

    fn assert_step_in_bounds(state: &SessionState) {
        assert!(state.lesson_step <= state.lesson_plan.len() + 1);
    }

    #[test]
    fn entry_routing_follows_confirmation_then_lesson_then_classification() {
        let mut state = SessionState::default();
        assert_eq!(route_start(&state), Node::ClassifyQuery);

        state.mode = SessionMode::Explanation;
        state.topic = "gravity".to_string();
        state.lesson_plan = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(route_start(&state), Node::AnalyzeTopicContext);

        state.awaiting_lesson_confirmation = true;
        assert_eq!(route_start(&state), Node::HandleLessonConfirmation);
    }

    #[tokio::test]
    async fn general_query_gets_a_single_answer_and_stays_general() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured(json!({"query_type": "general", "topic": "capital of France"}));
        llm.push_text("The capital of France is Paris.");
        let engine = engine_with(llm);

        let mut state = new_turn("What is the capital of France?");
        engine.run(&mut state).await.unwrap();

        assert_eq!(
            state.last_assistant_message(),
            Some("The capital of France is Paris.")
        );
        assert_eq!(state.mode, SessionMode::General);
        assert_eq!(state.last_action, LastAction::GeneralAnswered);
        assert!(state.lesson_plan.is_empty());
        assert!(!state.awaiting_lesson_confirmation);
    }

    #[tokio::test]
    async fn explanation_query_offers_a_lesson_and_confirmation_starts_it() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured(json!({"query_type": "explanation", "topic": "photosynthesis"}));
        llm.push_text("Photosynthesis is how plants make food. Would you like a step by step lesson?");
        let engine = engine_with(llm.clone());

        // Turn 1: brief answer plus offer.
        let mut state = new_turn("How does photosynthesis work?");
        engine.run(&mut state).await.unwrap();
        assert!(state.awaiting_lesson_confirmation);
        assert_eq!(state.pending_topic, "photosynthesis");
        assert_eq!(state.last_action, LastAction::OfferedLesson);

        // Turn 2: "yes" confirms, plans, and explains step one in the same
        // traversal.
        llm.push_structured(json!({
            "topic": "Photosynthesis",
            "steps": ["what it is", "the ingredients", "the light reactions", "the sugar"]
        }));
        llm.push_text("First, photosynthesis is how plants feed themselves. What do you think they need to start?");
        state.query = "yes".to_string();
        state.push_user("yes");
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.mode, SessionMode::Explanation);
        assert_eq!(state.topic, "Photosynthesis");
        assert_eq!(state.lesson_plan.len(), 4);
        assert_eq!(state.lesson_step, 1);
        assert_eq!(state.last_action, LastAction::Explained);
        assert!(!state.awaiting_lesson_confirmation);
        assert!(state.pending_topic.is_empty());
        assert!(
            state
                .last_assistant_message()
                .unwrap()
                .contains("plants feed themselves")
        );
        assert_step_in_bounds(&state);
    }

    #[tokio::test]
    async fn declined_offer_returns_to_general_mode() {
        let llm = Arc::new(ScriptedLlm::new());
        let engine = engine_with(llm);

        let mut state = new_turn("no thanks");
        state.awaiting_lesson_confirmation = true;
        state.pending_topic = "volcanoes".to_string();
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.last_action, LastAction::DeclinedLesson);
        assert_eq!(state.mode, SessionMode::General);
        assert!(state.pending_topic.is_empty());
        assert!(!state.awaiting_lesson_confirmation);
        assert_eq!(state.last_assistant_message(), Some(DECLINE_MESSAGE));
    }

    #[tokio::test]
    async fn ambiguous_confirmation_reclassifies_the_new_utterance() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured(json!({"query_type": "general", "topic": "weather"}));
        llm.push_text("It looks like a fine day.");
        let engine = engine_with(llm);

        let mut state = new_turn("what is the weather like");
        state.awaiting_lesson_confirmation = true;
        state.pending_topic = "volcanoes".to_string();
        engine.run(&mut state).await.unwrap();

        assert!(!state.awaiting_lesson_confirmation);
        assert_eq!(state.last_action, LastAction::GeneralAnswered);
        assert_eq!(state.last_assistant_message(), Some("It looks like a fine day."));
    }

    #[tokio::test]
    async fn failed_planner_still_yields_a_valid_lesson() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured_err();
        llm.push_text_err();
        let engine = engine_with(llm);

        let mut state = new_turn("yes");
        state.awaiting_lesson_confirmation = true;
        state.pending_topic = "quantum physics".to_string();
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.mode, SessionMode::Explanation);
        assert_eq!(state.topic, "quantum physics");
        assert!(!state.lesson_plan.is_empty());
        assert_eq!(state.lesson_step, 1);
        assert_eq!(state.last_action, LastAction::Explained);
        // Fallback explanation still lands in the log and in last_explanation.
        assert!(!state.last_explanation.is_empty());
        assert_step_in_bounds(&state);
    }

    #[tokio::test]
    async fn declined_structured_plan_behaves_like_an_error() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured_none();
        llm.push_text("Let us begin with the basics. What comes to mind first?");
        let engine = engine_with(llm);

        let mut state = new_turn("sure");
        state.awaiting_lesson_confirmation = true;
        state.pending_topic = "tides".to_string();
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.lesson_plan.len(), 3);
        assert_eq!(state.lesson_step, 1);
        assert_eq!(state.mode, SessionMode::Explanation);
    }

    #[tokio::test]
    async fn repeat_request_replays_last_explanation_without_a_model_call() {
        // An empty script means any model call would fail the test.
        let llm = Arc::new(ScriptedLlm::new());
        let engine = engine_with(llm);

        let mut state = mid_lesson_state(2, 4, "can you repeat that");
        let explanation = state.last_explanation.clone();
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.last_action, LastAction::Repeated);
        assert_eq!(state.lesson_step, 2);
        let reply = state.last_assistant_message().unwrap();
        assert!(reply.ends_with(&explanation));
        assert!(reply.len() > explanation.len(), "expected an ack prefix");
    }

    #[tokio::test]
    async fn lesson_answer_advances_exactly_one_step_and_stages_feedback() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured(json!({
            "is_related": true,
            "intent": "answer",
            "suggested_action": "continue_lesson"
        }));
        llm.push_structured(json!({
            "is_correct": false,
            "feedback": "Good try! Plants actually need sunlight, water, and carbon dioxide.",
            "understanding_level": 4
        }));
        llm.push_text("Next, let us look at the ingredients. Which one do you think comes from the air?");
        let engine = engine_with(llm);

        let mut state = mid_lesson_state(2, 4, "they need soil I think");
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.lesson_step, 3);
        assert_eq!(state.last_action, LastAction::Explained);
        assert!(state.feedback.is_empty(), "feedback is consumed by the explanation");
        let reply = state.last_assistant_message().unwrap();
        assert!(reply.starts_with("Good try!"));
        assert!(reply.contains("Which one do you think comes from the air?"));
        assert_step_in_bounds(&state);
    }

    #[tokio::test]
    async fn final_step_answer_completes_the_lesson_and_resets_state() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured(json!({
            "is_related": true,
            "intent": "answer",
            "suggested_action": "continue_lesson"
        }));
        llm.push_structured(json!({
            "is_correct": true,
            "feedback": "Exactly right!",
            "understanding_level": 9
        }));
        llm.push_text("You finished the whole lesson on photosynthesis. Ask me anything else!");
        let engine = engine_with(llm);

        let mut state = mid_lesson_state(4, 4, "the sugar stores the energy");
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.last_action, LastAction::CompletedLesson);
        assert_eq!(state.mode, SessionMode::General);
        assert!(state.topic.is_empty());
        assert!(state.lesson_plan.is_empty());
        assert_eq!(state.lesson_step, 0);
        assert!(state.feedback.is_empty());
        assert!(state.last_explanation.is_empty());
        let reply = state.last_assistant_message().unwrap();
        assert!(reply.starts_with("Exactly right!"));
    }

    #[tokio::test]
    async fn failed_evaluation_still_advances_with_generic_feedback() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured_err(); // topic analysis fails: treat as answer
        llm.push_structured_err(); // evaluation fails
        llm.push_text_err(); // explanation fails
        let engine = engine_with(llm);

        let mut state = mid_lesson_state(1, 3, "maybe the roots do it");
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.lesson_step, 2);
        assert_eq!(state.last_action, LastAction::Explained);
        let reply = state.last_assistant_message().unwrap();
        assert!(reply.starts_with(PROCEED_FEEDBACK_FALLBACK));
    }

    #[tokio::test]
    async fn topic_switch_exits_the_lesson_and_reclassifies() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured(json!({
            "is_related": false,
            "intent": "new_topic",
            "suggested_action": "switch_topic"
        }));
        llm.push_structured(json!({"query_type": "explanation", "topic": "black holes"}));
        llm.push_text("Black holes are collapsed stars. Want a step by step lesson?");
        let engine = engine_with(llm);

        let mut state = mid_lesson_state(3, 4, "actually, explain black holes instead");
        engine.run(&mut state).await.unwrap();

        assert!(state.awaiting_lesson_confirmation);
        assert_eq!(state.pending_topic, "black holes");
        assert_eq!(state.lesson_step, 0);
        assert!(state.lesson_plan.is_empty());
        // Both the progress summary and the new offer were appended.
        let assistant_msgs: Vec<_> = state
            .message_log
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .collect();
        assert!(assistant_msgs[assistant_msgs.len() - 2]
            .content
            .contains("We covered 2 of 4 steps"));
    }

    #[tokio::test]
    async fn clarification_is_answered_and_turn_ends() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured(json!({
            "is_related": true,
            "intent": "clarification",
            "suggested_action": "answer_and_continue"
        }));
        llm.push_text("Chlorophyll is the green pigment that captures light. Now, back to my question: what do plants need?");
        let engine = engine_with(llm);

        let mut state = mid_lesson_state(2, 4, "wait, what is chlorophyll?");
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.last_action, LastAction::AnsweredQuestion);
        assert_eq!(state.lesson_step, 2);
        assert!(state.last_assistant_message().unwrap().contains("Chlorophyll"));
    }

    #[tokio::test]
    async fn off_topic_question_is_politely_redirected() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured(json!({
            "is_related": false,
            "intent": "off_topic_question",
            "suggested_action": "politely_redirect"
        }));
        let engine = engine_with(llm);

        let mut state = mid_lesson_state(2, 4, "who won the cricket match yesterday?");
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.last_action, LastAction::Redirected);
        assert_eq!(state.lesson_step, 2);
        assert_eq!(state.mode, SessionMode::Explanation);
        assert!(state.last_assistant_message().unwrap().contains("photosynthesis"));
    }

    #[tokio::test]
    async fn mid_lesson_small_talk_gets_a_reply_and_a_reminder() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured(json!({
            "is_related": false,
            "intent": "small_talk",
            "suggested_action": "handle_small_talk"
        }));
        llm.push_text("I am doing great, thanks for asking!");
        let engine = engine_with(llm);

        let mut state = mid_lesson_state(2, 4, "how are you doing today?");
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.last_action, LastAction::SmallTalkResponded);
        let reply = state.last_assistant_message().unwrap();
        assert!(reply.contains("back to our lesson on photosynthesis"));
        assert_eq!(state.lesson_step, 2);
    }

    #[tokio::test]
    async fn lesson_waits_when_learner_has_not_replied() {
        let llm = Arc::new(ScriptedLlm::new());
        let engine = engine_with(llm);

        let mut state = mid_lesson_state(2, 4, "placeholder");
        // Drop the trailing user message so the log ends on our own turn.
        state.message_log.pop();
        let log_len = state.message_log.len();
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.last_action, LastAction::WaitingForResponse);
        assert_eq!(state.message_log.len(), log_len);
    }

    #[tokio::test]
    async fn general_answer_failure_degrades_to_fallback_text() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured_none();
        llm.push_text_err();
        let engine = engine_with(llm);

        let mut state = new_turn("What is the tallest mountain?");
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.last_action, LastAction::GeneralAnswered);
        assert_eq!(state.last_assistant_message(), Some(GENERAL_ANSWER_FALLBACK));
    }
}
