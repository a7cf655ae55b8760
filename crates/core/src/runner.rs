//! Turn Runner
//!
//! Ties the persistence port and the dialog engine into the one entry point
//! the transports call: load the session, run one traversal, persist, and
//! hand back the reply text. Also owns the idle small-talk bypass, which
//! answers casual chatter with a single model call and deliberately skips
//! the store, so greetings never pollute lesson state.

use crate::classifiers;
use crate::engine::DialogEngine;
use crate::llm::LlmClient;
use crate::prompts;
use crate::state::{SessionState, UserRef};
use crate::store::SessionStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const SMALL_TALK_FALLBACK: &str =
    "I am here and happy to chat. What would you like to learn about today?";

/// Executes complete dialog turns against a session store.
pub struct TurnRunner {
    engine: DialogEngine,
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn SessionStore>,
}

impl TurnRunner {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            engine: DialogEngine::new(llm.clone()),
            llm,
            store,
        }
    }

    /// Runs one turn for a session and returns the reply text.
    ///
    /// The session is created on first contact. Any assistant messages the
    /// traversal appends beyond the last one are still persisted in the
    /// message log; the returned string is the final one, which is what the
    /// transports speak or display.
    #[instrument(skip_all, fields(session_id = %session_id, user_id = %user.id))]
    pub async fn run_turn(
        &self,
        user: UserRef,
        session_id: &str,
        query: &str,
    ) -> Result<String> {
        let existing = self
            .store
            .load(session_id)
            .await
            .context("Failed to load session state")?;

        // Idle small talk never touches the session: no lesson is pending,
        // nothing needs to be remembered.
        let idle = existing
            .as_ref()
            .map(|s| !s.lesson_active() && !s.awaiting_lesson_confirmation)
            .unwrap_or(true);
        if idle && classifiers::is_small_talk(query) {
            debug!("idle small talk, bypassing the dialog graph");
            let prompt = prompts::small_talk(query);
            return Ok(match self.llm.invoke(&prompt).await {
                Ok(reply) if !reply.trim().is_empty() => reply,
                Ok(_) => SMALL_TALK_FALLBACK.to_string(),
                Err(e) => {
                    warn!(error = ?e, "small talk call failed; using fallback");
                    SMALL_TALK_FALLBACK.to_string()
                }
            });
        }

        let mut state = existing.unwrap_or_else(|| SessionState::new(user));
        state.query = query.to_string();
        state.push_user(query);

        self.engine.run(&mut state).await?;

        let reply = state
            .last_assistant_message()
            .context("Dialog traversal ended without a reply")?
            .to_string();

        self.store
            .save(session_id, &state)
            .await
            .context("Failed to persist session state")?;

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::ScriptedLlm;
    use crate::state::{LastAction, SessionMode};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn asha() -> UserRef {
        UserRef::new("u1", "Asha")
    }

    #[tokio::test]
    async fn idle_small_talk_is_answered_without_creating_a_session() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_text("Hello! I am doing great, thanks for asking.");
        let store = Arc::new(MemoryStore::new());
        let runner = TurnRunner::new(llm, store.clone());

        let reply = runner.run_turn(asha(), "s1", "hi, how are you?").await.unwrap();

        assert_eq!(reply, "Hello! I am doing great, thanks for asking.");
        assert!(!store.exists("s1").await.unwrap());
    }

    #[tokio::test]
    async fn idle_small_talk_failure_falls_back_without_persisting() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_text_err();
        let store = Arc::new(MemoryStore::new());
        let runner = TurnRunner::new(llm, store.clone());

        let reply = runner.run_turn(asha(), "s1", "good morning").await.unwrap();

        assert_eq!(reply, SMALL_TALK_FALLBACK);
        assert!(!store.exists("s1").await.unwrap());
    }

    #[tokio::test]
    async fn first_contact_bootstraps_and_persists_a_session() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_structured(json!({"query_type": "general", "topic": "mount everest"}));
        llm.push_text("Mount Everest is the tallest mountain above sea level.");
        let store = Arc::new(MemoryStore::new());
        let runner = TurnRunner::new(llm, store.clone());

        let reply = runner
            .run_turn(asha(), "s1", "What is the tallest mountain?")
            .await
            .unwrap();

        assert_eq!(reply, "Mount Everest is the tallest mountain above sea level.");
        let state = store.load("s1").await.unwrap().expect("session persisted");
        assert_eq!(state.user.id, "u1");
        assert_eq!(state.message_log.len(), 2);
        assert_eq!(state.last_action, LastAction::GeneralAnswered);
    }

    #[tokio::test]
    async fn session_state_carries_across_turns() {
        let llm = Arc::new(ScriptedLlm::new());
        let store = Arc::new(MemoryStore::new());
        let runner = TurnRunner::new(llm.clone(), store.clone());

        llm.push_structured(json!({"query_type": "explanation", "topic": "rainbows"}));
        llm.push_text("Rainbows come from light bending in raindrops. Want a step by step lesson?");
        runner
            .run_turn(asha(), "s1", "why do rainbows happen?")
            .await
            .unwrap();

        llm.push_structured(json!({
            "topic": "Rainbows",
            "steps": ["light and raindrops", "refraction", "why the colors split"]
        }));
        llm.push_text("Light enters a raindrop and slows down. What do you think happens next?");
        let reply = runner.run_turn(asha(), "s1", "yes please").await.unwrap();

        assert!(reply.contains("What do you think happens next?"));
        let state = store.load("s1").await.unwrap().unwrap();
        assert_eq!(state.mode, SessionMode::Explanation);
        assert_eq!(state.topic, "Rainbows");
        assert_eq!(state.lesson_step, 1);
    }

    #[tokio::test]
    async fn small_talk_during_a_pending_offer_goes_through_the_graph() {
        let llm = Arc::new(ScriptedLlm::new());
        let store = Arc::new(MemoryStore::new());
        let runner = TurnRunner::new(llm.clone(), store.clone());

        llm.push_structured(json!({"query_type": "explanation", "topic": "volcanoes"}));
        llm.push_text("Volcanoes are openings in the crust. Want a lesson?");
        runner
            .run_turn(asha(), "s1", "tell me about volcanoes")
            .await
            .unwrap();

        // "how are you" is small talk, but an offer is pending, so it must
        // be treated as an ambiguous confirmation and reclassified.
        llm.push_structured(json!({"query_type": "general", "topic": "greeting"}));
        llm.push_text("I am doing well, thank you!");
        runner.run_turn(asha(), "s1", "how are you").await.unwrap();

        let state = store.load("s1").await.unwrap().unwrap();
        assert!(!state.awaiting_lesson_confirmation);
        assert_eq!(state.last_action, LastAction::GeneralAnswered);
    }
}
