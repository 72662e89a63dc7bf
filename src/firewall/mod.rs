//! Firewall rules compiled to drop entries
//!
//! A rule `(user_id, rule_no)` with `allow = false` becomes one drop entry
//! at priority `1000 - rule_no`. Allow rules install nothing. The same
//! compiler also installs the automatic per-source blocks raised by the
//! packet classifier.

mod compiler;
mod rule;
mod store;

pub use compiler::{source_block, FirewallCompiler, TargetPolicy};
pub use rule::{CompiledRule, FirewallRule, RuleKey, MAX_RULE_NO};
pub use store::{MemoryRuleStore, RuleStore};
