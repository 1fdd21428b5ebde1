pub mod config;
pub mod error;
pub mod rule_key;

pub use config::RuleStateConfig;
pub use error::*;
pub use rule_key::RuleKey;
