use std::fmt;
use std::sync::Arc;

/// Stable identity of one lifetime of a rule.
///
/// The name alone is not enough: a rule may be removed and re-added under the
/// same name before every cache has dropped the old state. The registry hands
/// out a fresh `generation` each time a name becomes active, so caches keyed by
/// `RuleKey` never mix state across lifetimes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    name: Arc<str>,
    generation: u64,
}

impl RuleKey {
    pub fn new(name: impl Into<Arc<str>>, generation: u64) -> Self {
        Self {
            name: name.into(),
            generation,
        }
    }

    /// Rule name as configured by the rule source.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_generation() {
        assert_eq!(RuleKey::new("login-spike", 7).to_string(), "login-spike#7");
    }

    #[test]
    fn same_name_different_generation_is_distinct() {
        let a = RuleKey::new("r1", 1);
        let b = RuleKey::new("r1", 2);
        assert_ne!(a, b);
        assert_eq!(a.name(), b.name());
    }
}
