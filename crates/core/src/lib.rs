//! Core dialog orchestration for the guided tutoring agent.
//!
//! This crate is transport-free: it knows nothing about HTTP or audio. It
//! owns the session state, the dialog engine that mutates it one traversal
//! per turn, and the ports (LLM, session store) the engine speaks through.
//! The API service wires those ports to real infrastructure.

pub mod classifiers;
pub mod engine;
pub mod llm;
pub mod prompts;
pub mod runner;
pub mod schemas;
pub mod state;
pub mod store;
