//! Policy selector matching.
//!
//! Selectors are evaluated in order and the first full match wins. Empty
//! fields are wildcards; every field is an exact comparison except
//! `message`, which is a regular expression searched in the event message.
//!
//! A selector that fails validation (bad regex, out-of-range threshold) is
//! compiled as inert: it never matches, and the rest of the policy keeps
//! working. A policy whose own defaults are invalid is inert as a whole.

use std::sync::Arc;

use regex::Regex;
use serde::Serialize;

use crate::domain::models::policy::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MODE, DEFAULT_RISK,
};
use crate::domain::models::{ClusterEvent, EventSelector, Mode, RemediationPolicy, RiskLevel};

/// Mode, threshold and risk after selector/policy/default resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectiveSettings {
    pub mode: Mode,
    pub confidence_threshold: f64,
    pub risk: RiskLevel,
}

/// The winning selector for one policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SelectorMatch {
    pub selector_index: usize,
    pub settings: EffectiveSettings,
}

#[derive(Debug, Clone)]
struct CompiledSelector {
    selector: EventSelector,
    message: Option<Regex>,
    error: Option<String>,
}

impl CompiledSelector {
    fn compile(selector: &EventSelector) -> Self {
        let mut error = None;
        let message = if selector.message.is_empty() {
            None
        } else {
            match Regex::new(&selector.message) {
                Ok(re) => Some(re),
                Err(e) => {
                    error = Some(format!("invalid message pattern {:?}: {e}", selector.message));
                    None
                }
            }
        };
        if let Some(threshold) = selector.confidence_threshold {
            if !valid_threshold(threshold) {
                error = Some(format!("confidenceThreshold {threshold} outside [0, 1]"));
            }
        }
        Self {
            selector: selector.clone(),
            message,
            error,
        }
    }

    fn matches(&self, event: &ClusterEvent) -> bool {
        if self.error.is_some() {
            return false;
        }
        let s = &self.selector;
        field_matches(&s.event_type, &event.event_type)
            && field_matches(&s.reason, &event.reason)
            && field_matches(&s.kind, &event.involved_object.kind)
            && field_matches(&s.namespace, &event.involved_object.namespace)
            && self
                .message
                .as_ref()
                .is_none_or(|re| re.is_match(&event.message))
    }
}

fn field_matches(pattern: &str, value: &str) -> bool {
    pattern.is_empty() || pattern == value
}

fn valid_threshold(threshold: f64) -> bool {
    (0.0..=1.0).contains(&threshold)
}

/// A policy with its selectors compiled.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    policy: Arc<RemediationPolicy>,
    selectors: Vec<CompiledSelector>,
    policy_error: Option<String>,
}

impl CompiledPolicy {
    pub fn compile(policy: RemediationPolicy) -> Self {
        let selectors = policy
            .spec
            .selectors
            .iter()
            .map(CompiledSelector::compile)
            .collect::<Vec<_>>();

        let mut policy_error = None;
        if let Some(threshold) = policy.spec.confidence_threshold {
            if !valid_threshold(threshold) {
                policy_error = Some(format!("confidenceThreshold {threshold} outside [0, 1]"));
            }
        }
        if policy.spec.rate_limit.events_per_minute == 0 {
            policy_error = Some("rateLimit.eventsPerMinute must be at least 1".to_string());
        }

        for (index, selector) in selectors.iter().enumerate() {
            if let Some(ref err) = selector.error {
                tracing::warn!(
                    policy = %policy.policy_ref(),
                    selector = index,
                    error = %err,
                    "selector disabled until corrected"
                );
            }
        }
        if let Some(ref err) = policy_error {
            tracing::warn!(policy = %policy.policy_ref(), error = %err, "policy disabled until corrected");
        }

        Self {
            policy: Arc::new(policy),
            selectors,
            policy_error,
        }
    }

    pub fn policy(&self) -> &Arc<RemediationPolicy> {
        &self.policy
    }

    /// Evaluate selectors in order; `None` if this policy does not govern the event.
    pub fn match_event(&self, event: &ClusterEvent) -> Option<SelectorMatch> {
        if self.policy_error.is_some() {
            return None;
        }
        self.selectors
            .iter()
            .position(|s| s.matches(event))
            .map(|index| SelectorMatch {
                selector_index: index,
                settings: self.effective_settings(&self.selectors[index].selector),
            })
    }

    fn effective_settings(&self, selector: &EventSelector) -> EffectiveSettings {
        let spec = &self.policy.spec;
        EffectiveSettings {
            mode: selector.mode.or(spec.mode).unwrap_or(DEFAULT_MODE),
            confidence_threshold: selector
                .confidence_threshold
                .or(spec.confidence_threshold)
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            risk: selector.risk.or(spec.risk).unwrap_or(DEFAULT_RISK),
        }
    }

    /// Validation problems: `(selector index, message)`; policy-level problems use `None`.
    pub fn errors(&self) -> Vec<(Option<usize>, String)> {
        let mut errors: Vec<(Option<usize>, String)> = self
            .policy_error
            .iter()
            .map(|e| (None, e.clone()))
            .collect();
        errors.extend(
            self.selectors
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.error.as_ref().map(|e| (Some(i), e.clone()))),
        );
        errors
    }

    pub fn is_valid(&self) -> bool {
        self.policy_error.is_none() && self.selectors.iter().all(|s| s.error.is_none())
    }
}

/// The compiled policy set, in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct SelectorMatcher {
    policies: Vec<CompiledPolicy>,
}

impl SelectorMatcher {
    pub fn compile(policies: &[RemediationPolicy]) -> Self {
        Self {
            policies: policies.iter().cloned().map(CompiledPolicy::compile).collect(),
        }
    }

    pub fn policies(&self) -> &[CompiledPolicy] {
        &self.policies
    }

    /// Every policy that governs `event`, each with its first matching selector.
    pub fn matches<'a>(
        &'a self,
        event: &'a ClusterEvent,
    ) -> impl Iterator<Item = (&'a CompiledPolicy, SelectorMatch)> + 'a {
        self.policies
            .iter()
            .filter_map(move |p| p.match_event(event).map(|m| (p, m)))
    }
}
