//! Process Authorization Gate
//!
//! Matches candidate process names against the restriction table. The gate
//! only answers "which rule, if any, blocks this name"; recording the
//! violation is up to the owner of the shared log.

use crate::error::ConfigError;
use crate::thresholds::ProcessRestrictions;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

/// Rule that blocked a process name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestrictionMatch {
    Exact(String),
    Pattern(String),
}

impl RestrictionMatch {
    pub fn rule(&self) -> &str {
        match self {
            RestrictionMatch::Exact(rule) | RestrictionMatch::Pattern(rule) => rule,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    regex: Regex,
}

#[derive(Debug, Clone)]
pub struct ProcessGate {
    /// Lowercased exact names
    exact: BTreeSet<String>,
    patterns: Vec<CompiledPattern>,
}

impl ProcessGate {
    pub fn new(restrictions: &ProcessRestrictions) -> Result<Self, ConfigError> {
        let mut gate = Self {
            exact: BTreeSet::new(),
            patterns: Vec::new(),
        };
        for name in &restrictions.restricted_processes {
            gate.add_process(name);
        }
        for pattern in &restrictions.restricted_patterns {
            gate.add_pattern(pattern)?;
        }
        Ok(gate)
    }

    pub fn add_process(&mut self, name: &str) {
        self.exact.insert(name.trim().to_lowercase());
    }

    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), ConfigError> {
        if self.patterns.iter().any(|p| p.source == pattern) {
            return Ok(());
        }
        let regex = compile_pattern(pattern)?;
        self.patterns.push(CompiledPattern {
            source: pattern.to_string(),
            regex,
        });
        Ok(())
    }

    /// Return the rule blocking `name`, or `None` if it may run.
    pub fn check(&self, name: &str) -> Option<RestrictionMatch> {
        let normalized = name.trim().to_lowercase();
        if let Some(exact) = self.exact.get(&normalized) {
            return Some(RestrictionMatch::Exact(exact.clone()));
        }
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(name))
            .map(|p| RestrictionMatch::Pattern(p.source.clone()))
    }

    pub fn rule_count(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }
}

/// Compile a substring pattern where `*` matches any run of characters.
fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '*') {
        return Err(ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern would match every process".to_string(),
        });
    }

    let body = trimmed
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    RegexBuilder::new(&body)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn default_gate() -> ProcessGate {
        ProcessGate::new(&ProcessRestrictions::default()).unwrap()
    }

    #[test]
    fn test_cpu_burn_is_restricted() {
        let gate = default_gate();
        assert_eq!(
            gate.check("cpu-burn"),
            Some(RestrictionMatch::Exact("cpu-burn".to_string()))
        );
        assert!(gate.check("cpu-burn-fast").is_some());
        assert!(gate.check("cpu_burn").is_some());
    }

    #[test]
    fn test_stress_tools_are_restricted() {
        let gate = default_gate();
        assert!(gate.check("stress-ng").is_some());
        assert_eq!(
            gate.check("stress"),
            Some(RestrictionMatch::Pattern("stress".to_string()))
        );
        assert!(gate.check("prime95").is_some());
        assert!(gate.check("folding@home").is_some());
    }

    #[test]
    fn test_matching_ignores_case() {
        let gate = default_gate();
        assert!(gate.check("CPU-Burn").is_some());
        assert!(gate.check("/usr/bin/Stress-NG --cpu 8").is_some());
    }

    #[test]
    fn test_normal_processes_allowed() {
        let gate = default_gate();
        for name in ["python", "vim", "bash", "safe-task"] {
            assert!(gate.check(name).is_none(), "{} should be allowed", name);
        }
    }

    #[test]
    fn test_pattern_is_a_substring_match() {
        let mut gate = ProcessGate::new(&ProcessRestrictions::none()).unwrap();
        gate.add_pattern("miner").unwrap();
        assert!(gate.check("xmr-miner-v2").is_some());
        assert!(gate.check("mine").is_none());
    }

    #[test]
    fn test_pattern_metacharacters_are_literal() {
        let mut gate = ProcessGate::new(&ProcessRestrictions::none()).unwrap();
        gate.add_pattern("a.b").unwrap();
        assert!(gate.check("run-a.b").is_some());
        assert!(gate.check("axb").is_none());
    }

    #[test]
    fn test_match_everything_patterns_rejected() {
        let mut gate = ProcessGate::new(&ProcessRestrictions::none()).unwrap();
        assert!(matches!(
            gate.add_pattern("*"),
            Err(ConfigError::InvalidPattern { .. })
        ));
        assert!(gate.add_pattern("  ").is_err());
        assert_eq!(gate.rule_count(), 0);
    }
}
