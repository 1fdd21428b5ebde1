//! Rule lifecycle events emitted by the rule source.

use serde::{Deserialize, Serialize};

/// What happened to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RuleEvent {
    /// A new rule was loaded.
    Added { rule_id: String },
    /// The rule was deleted; its name becomes free.
    Removed { rule_id: String },
    /// The rule stopped running; its name stays reserved.
    Disabled { rule_id: String },
    /// A disabled rule runs again.
    Enabled { rule_id: String },
}

impl RuleEvent {
    pub fn rule_id(&self) -> &str {
        match self {
            RuleEvent::Added { rule_id }
            | RuleEvent::Removed { rule_id }
            | RuleEvent::Disabled { rule_id }
            | RuleEvent::Enabled { rule_id } => rule_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tagged_json() {
        let event: RuleEvent =
            serde_json::from_str(r#"{"action":"disabled","rule_id":"login-spike"}"#).unwrap();
        assert_eq!(
            event,
            RuleEvent::Disabled {
                rule_id: "login-spike".into()
            }
        );
        assert_eq!(event.rule_id(), "login-spike");
    }
}
