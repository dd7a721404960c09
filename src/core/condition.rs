//! Trigger and `when` condition model

use crate::core::{context::BuildContext, state::ExecutionStatus};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A set of filters gating a pipeline (`trigger`) or a step (`when`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Condition>,

    /// Upstream or pipeline status; absent means `success` only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Condition>,

    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Condition>,
}

/// One filter, written as a string, a list, or an include/exclude mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    One(String),
    Many(Vec<String>),
    Filter(ConditionFilter),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// A single compiled pattern
#[derive(Debug, Clone)]
pub enum ConditionPattern {
    /// Exact match
    Literal(String),
    /// Glob compiled to an anchored regex
    Glob(Regex),
}

impl ConditionPattern {
    /// Compile a pattern; anything without glob metacharacters stays literal
    pub fn compile(pattern: &str) -> Self {
        if !pattern.contains(['*', '?']) {
            return ConditionPattern::Literal(pattern.to_string());
        }
        match Regex::new(&glob_to_regex(pattern)) {
            Ok(regex) => ConditionPattern::Glob(regex),
            Err(_) => ConditionPattern::Literal(pattern.to_string()),
        }
    }

    /// Check if the pattern matches the given value
    pub fn matches(&self, value: &str) -> bool {
        match self {
            ConditionPattern::Literal(pattern) => pattern == value,
            ConditionPattern::Glob(regex) => regex.is_match(value),
        }
    }
}

/// Translate a glob into an anchored regex.
///
/// `**` matches anything, `*` anything but `/`, `?` one character but `/`.
pub fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}

impl Condition {
    /// Include patterns
    pub fn include(&self) -> Vec<&str> {
        match self {
            Condition::One(value) => vec![value.as_str()],
            Condition::Many(values) => values.iter().map(String::as_str).collect(),
            Condition::Filter(filter) => filter.include.iter().map(String::as_str).collect(),
        }
    }

    /// Exclude patterns
    pub fn exclude(&self) -> Vec<&str> {
        match self {
            Condition::Filter(filter) => filter.exclude.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Every pattern, include and exclude
    pub fn patterns(&self) -> Vec<&str> {
        let mut all = self.include();
        all.extend(self.exclude());
        all
    }

    /// Check a value against this filter
    pub fn matches(&self, value: &str) -> bool {
        let include = self.include();
        if !include.is_empty()
            && !include
                .iter()
                .any(|p| ConditionPattern::compile(p).matches(value))
        {
            return false;
        }

        !self
            .exclude()
            .iter()
            .any(|p| ConditionPattern::compile(p).matches(value))
    }
}

impl Conditions {
    /// True when no filter is declared
    pub fn is_empty(&self) -> bool {
        self.branch.is_none()
            && self.event.is_none()
            && self.status.is_none()
            && self.reference.is_none()
            && self.repo.is_none()
            && self.target.is_none()
            && self.cron.is_none()
            && self.instance.is_none()
            && self.action.is_none()
    }

    /// Whether the status filter admits `status` (absent filter means success only)
    pub fn runs_on_status(&self, status: ExecutionStatus) -> bool {
        match &self.status {
            Some(condition) => condition.matches(status.as_str()),
            None => status == ExecutionStatus::Success,
        }
    }

    /// Evaluate every declared filter against a build and a status
    pub fn matches(&self, context: &BuildContext, status: ExecutionStatus) -> bool {
        self.mismatch(context, status).is_none()
    }

    /// Describe the first filter that rejects the build, if any
    pub fn mismatch(&self, context: &BuildContext, status: ExecutionStatus) -> Option<String> {
        if !self.runs_on_status(status) {
            return Some(format!("status '{}' does not match", status));
        }

        for (key, condition) in self.declared() {
            let value = match key {
                "branch" => Some(context.branch.as_str()),
                "event" => Some(context.event.as_str()),
                "ref" => Some(context.reference.as_str()),
                "repo" => Some(context.repo.as_str()),
                "instance" => Some(context.instance.as_str()),
                "target" => context.target.as_deref(),
                "cron" => context.cron.as_deref(),
                "action" => context.action.as_deref(),
                _ => continue,
            };
            let value = value.unwrap_or_default();
            if !condition.matches(value) {
                return Some(format!("{} '{}' does not match", key, value));
            }
        }

        None
    }

    /// All filters paired with their key, for validation
    pub fn declared(&self) -> Vec<(&'static str, &Condition)> {
        [
            ("branch", &self.branch),
            ("event", &self.event),
            ("status", &self.status),
            ("ref", &self.reference),
            ("repo", &self.repo),
            ("target", &self.target),
            ("cron", &self.cron),
            ("instance", &self.instance),
            ("action", &self.action),
        ]
        .into_iter()
        .filter_map(|(key, condition)| condition.as_ref().map(|c| (key, c)))
        .collect()
    }
}
