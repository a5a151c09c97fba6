use serde::Deserialize;
use serde::Serialize;

use super::normalize_list;
use crate::Poolable;
use crate::ValidationError;

/// Matches any action or resource
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl Rule {
    pub fn allow(
        actions: &[&str],
        resources: &[&str],
    ) -> Self {
        Self::new(Effect::Allow, actions, resources)
    }

    pub fn deny(
        actions: &[&str],
        resources: &[&str],
    ) -> Self {
        Self::new(Effect::Deny, actions, resources)
    }

    fn new(
        effect: Effect,
        actions: &[&str],
        resources: &[&str],
    ) -> Self {
        Self {
            effect,
            actions: actions.iter().map(|s| s.to_string()).collect(),
            resources: resources.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn matches(
        &self,
        action: &str,
        resource: &str,
    ) -> bool {
        let hit = |patterns: &[String], value: &str| {
            patterns.iter().any(|p| p == WILDCARD || p == value)
        };
        hit(&self.actions, action) && hit(&self.resources, resource)
    }
}

/// Named set of allow/deny rules
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    pub description: String,
    pub rules: Vec<Rule>,
}

impl Policy {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            description: String::new(),
            rules,
        }
    }

    /// Deny wins over allow; `None` when no rule matches
    pub fn evaluate(
        &self,
        action: &str,
        resource: &str,
    ) -> Option<Effect> {
        let mut effect = None;
        for rule in self.rules.iter().filter(|r| r.matches(action, resource)) {
            if rule.effect == Effect::Deny {
                return Some(Effect::Deny);
            }
            effect = Some(Effect::Allow);
        }
        effect
    }
}

impl Poolable for Policy {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.rules.is_empty() {
            return Err(ValidationError::new("policy must contain at least one rule"));
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.actions.iter().all(|a| a.trim().is_empty()) {
                return Err(ValidationError::new(format!("rule {i} has no actions")));
            }
            if rule.resources.iter().all(|r| r.trim().is_empty()) {
                return Err(ValidationError::new(format!("rule {i} has no resources")));
            }
        }
        Ok(())
    }

    fn clean(&mut self) {
        self.description = self.description.trim().to_string();
        for rule in &mut self.rules {
            for action in rule.actions.iter_mut() {
                *action = action.to_lowercase();
            }
            normalize_list(&mut rule.actions);
            normalize_list(&mut rule.resources);
        }
    }
}
