use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for journal entries; drives retention and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Authorization-relevant events: long-term retention, never auto-delete
    Critical,
    /// Routine domain changes: medium-term retention (default)
    Important,
    /// High-volume events: aggressively trimmed
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Important
    }
}

/// Entities that appear in the activity journal. The entity type becomes
/// the prefix of event names like "access_grant.created".
pub trait Loggable: Serialize + Send + Sync {
    fn entity_type() -> &'static str;

    /// Usually the entity's primary key.
    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Destructive and authorization-changing actions are always kept.
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "revoked" | "approved" | "rejected" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
