use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::normalize_list;
use super::Effect;
use super::Policy;
use crate::Poolable;
use crate::ValidationError;

/// Named group of policy references
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Role {
    pub description: String,
    pub policies: Vec<String>,
}

impl Role {
    pub fn new(policies: &[&str]) -> Self {
        Self {
            description: String::new(),
            policies: policies.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Evaluates every referenced policy found in `policies`.
    ///
    /// Unknown references are ignored. Any deny wins; otherwise at least one
    /// allow is required.
    pub fn permits(
        &self,
        policies: &HashMap<String, Policy>,
        action: &str,
        resource: &str,
    ) -> bool {
        let mut allowed = false;
        for policy in self.policies.iter().filter_map(|name| policies.get(name)) {
            match policy.evaluate(action, resource) {
                Some(Effect::Deny) => return false,
                Some(Effect::Allow) => allowed = true,
                None => {}
            }
        }
        allowed
    }
}

impl Poolable for Role {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.policies.iter().all(|p| p.trim().is_empty()) {
            return Err(ValidationError::new("role must reference at least one policy"));
        }
        Ok(())
    }

    fn clean(&mut self) {
        self.description = self.description.trim().to_string();
        normalize_list(&mut self.policies);
    }
}
