//! Policy CLI commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::adapters::files::load_policies;
use crate::cli::output::{output, CommandOutput};
use crate::services::selector_matcher::{CompiledPolicy, SelectorMatcher};

#[derive(Args, Debug)]
pub struct PolicyArgs {
    #[command(subcommand)]
    pub command: PolicyCommands,
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Compile policies and report invalid selectors
    Check {
        /// Policy file (YAML stream or `policies:` list)
        #[arg(short, long)]
        policies: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct SelectorProblem {
    /// `None` for problems with the policy as a whole
    pub selector: Option<usize>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PolicyReport {
    pub policy: String,
    pub selectors: usize,
    pub persistence: bool,
    pub valid: bool,
    pub problems: Vec<SelectorProblem>,
}

impl From<&CompiledPolicy> for PolicyReport {
    fn from(compiled: &CompiledPolicy) -> Self {
        let policy = compiled.policy();
        Self {
            policy: policy.policy_ref().to_string(),
            selectors: policy.spec.selectors.len(),
            persistence: policy.persistence_enabled(),
            valid: compiled.is_valid(),
            problems: compiled
                .errors()
                .into_iter()
                .map(|(selector, message)| SelectorProblem { selector, message })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PolicyCheckOutput {
    pub policies: Vec<PolicyReport>,
    pub invalid: usize,
}

impl CommandOutput for PolicyCheckOutput {
    fn to_human(&self) -> String {
        if self.policies.is_empty() {
            return "No policies found.".to_string();
        }

        let mut lines = Vec::new();
        for report in &self.policies {
            let status = if report.valid { "ok" } else { "INVALID" };
            lines.push(format!(
                "{:<8} {} ({} selector(s), persistence {})",
                status,
                report.policy,
                report.selectors,
                if report.persistence { "on" } else { "off" },
            ));
            for problem in &report.problems {
                match problem.selector {
                    Some(index) => lines.push(format!("         selector[{index}]: {}", problem.message)),
                    None => lines.push(format!("         policy: {}", problem.message)),
                }
            }
        }
        lines.push(format!(
            "\n{} policy(ies) checked, {} invalid",
            self.policies.len(),
            self.invalid
        ));
        lines.join("\n")
    }
}

/// Compile `policies` and summarize their problems.
pub fn check(matcher: &SelectorMatcher) -> PolicyCheckOutput {
    let policies: Vec<PolicyReport> = matcher.policies().iter().map(PolicyReport::from).collect();
    let invalid = policies.iter().filter(|p| !p.valid).count();
    PolicyCheckOutput { policies, invalid }
}

pub async fn execute(args: PolicyArgs, json_mode: bool) -> Result<()> {
    match args.command {
        PolicyCommands::Check { policies } => {
            let loaded = load_policies(&policies)
                .with_context(|| format!("Failed to load policies from {}", policies.display()))?;
            let out = check(&SelectorMatcher::compile(&loaded));
            output(&out, json_mode);
            if out.invalid > 0 {
                anyhow::bail!("{} policy(ies) failed validation", out.invalid);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::files::parse_policies;

    #[test]
    fn test_check_reports_bad_selector() {
        let policies = parse_policies(
            r"
metadata: {name: good, namespace: ops}
spec:
  selectors:
    - reason: BackOff
      message: 'exit code \d+'
---
metadata: {name: bad, namespace: ops}
spec:
  selectors:
    - reason: BackOff
    - message: '(unclosed'
",
        )
        .unwrap();

        let out = check(&SelectorMatcher::compile(&policies));
        assert_eq!(out.invalid, 1);
        assert!(out.policies[0].valid);
        let bad = &out.policies[1];
        assert!(!bad.valid);
        assert_eq!(bad.problems.len(), 1);
        assert_eq!(bad.problems[0].selector, Some(1));
        assert!(out.to_human().contains("selector[1]"));
        assert_eq!(out.to_json()["invalid"], 1);
    }
}
