// Agent roles and role-name canonicalization

use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of debate participants.
///
/// `Supervisor` is the orchestrator itself. It never speaks through the
/// collaborator interface, but conversation exports from the upstream
/// system attribute workflow framing messages to it, so role resolution
/// has to recognize the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Curator,
    Interpreter,
    Reviewer,
    Supervisor,
}

impl AgentRole {
    /// Resolve a role from any of its textual spellings.
    ///
    /// Accepts both the kebab-case agent names ("evidence-curator") and the
    /// spaced title-case display names ("Evidence Curator"), plus the bare
    /// canonical identifiers. Returns `None` for anything unrecognized.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace(['-', '_'], " ");
        if normalized.is_empty() {
            return None;
        }

        if normalized.contains("curator") || normalized.contains("evidence") {
            Some(Self::Curator)
        } else if normalized.contains("interpreter") || normalized.contains("policy") {
            Some(Self::Interpreter)
        } else if normalized.contains("reviewer") || normalized.contains("compliance") {
            Some(Self::Reviewer)
        } else if normalized.contains("supervisor") {
            Some(Self::Supervisor)
        } else {
            None
        }
    }

    /// Canonical lowercase identifier ("curator", "interpreter", ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Curator => "curator",
            Self::Interpreter => "interpreter",
            Self::Reviewer => "reviewer",
            Self::Supervisor => "supervisor",
        }
    }

    /// Human-facing display name for UI exports.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Curator => "Evidence Curator",
            Self::Interpreter => "Policy Interpreter",
            Self::Reviewer => "Compliance Reviewer",
            Self::Supervisor => "Supervisor",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
