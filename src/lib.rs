// Aegis - Multi-agent debate engine for insurance coverage calls
// Library exports

// Core modules
pub mod agents;
pub mod cases;
pub mod config;
pub mod conversation;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod orchestrator;
pub mod roles;
pub mod selector;
pub mod state;
pub mod store;
pub mod termination;

pub use agents::{AgentCollaborator, AgentContext, ScriptedAgent};
pub use cases::CaseManager;
pub use config::DebateConfig;
pub use error::DebateError;
pub use orchestrator::DebateOrchestrator;
pub use roles::AgentRole;
pub use state::{CaseInput, DebateState, DecisionPackage, RunState, StatusSnapshot};
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use termination::{TerminationPolicy, Verdict};
