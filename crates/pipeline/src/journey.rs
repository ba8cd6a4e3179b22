//! Journeys (SPEC_FULL.md §5 "Supplemented Features"): an optional
//! multi-step session template that biases the prompt per step and
//! tracks a session's current step (spec.md §3 `JourneyInstance`).
//!
//! `JourneyInstance` uses value semantics: `advance_step` returns a new
//! instance rather than mutating in place, mirroring spec.md §3's
//! "Mutated only via `advanceStep`, which returns a new value".

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyStep {
    pub name: String,
    /// Free-text instruction folded into the prompt while this step is
    /// current, e.g. "the customer has just placed an order and is
    /// asking about delivery".
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JourneyTemplate {
    pub name: String,
    pub steps: Vec<JourneyStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JourneyInstance {
    pub session_id: String,
    pub template: String,
    pub variables: BTreeMap<String, String>,
    pub resolved_steps: Vec<JourneyStep>,
    pub current_step_index: usize,
}

impl JourneyInstance {
    fn new(session_id: impl Into<String>, template: &JourneyTemplate, variables: BTreeMap<String, String>) -> Self {
        Self {
            session_id: session_id.into(),
            template: template.name.clone(),
            variables,
            resolved_steps: template.steps.clone(),
            current_step_index: 0,
        }
    }

    pub fn current_step(&self) -> Option<&JourneyStep> {
        self.resolved_steps.get(self.current_step_index)
    }

    pub fn is_finished(&self) -> bool {
        self.current_step_index + 1 >= self.resolved_steps.len()
    }

    /// Returns a new instance advanced to the next step, or a copy of
    /// `self` unchanged if already on the last step.
    pub fn advance_step(&self) -> Self {
        let mut next = self.clone();
        if next.current_step_index + 1 < next.resolved_steps.len() {
            next.current_step_index += 1;
        }
        next
    }

    /// A short text block describing the current step, suitable for
    /// folding into a prompt (spec.md §4.4 "journey-step description").
    pub fn prompt_block(&self) -> Option<String> {
        let step = self.current_step()?;
        let mut out = format!("Journey step ({}/{}): {} — {}",
            self.current_step_index + 1,
            self.resolved_steps.len(),
            step.name,
            step.description,
        );
        if !self.variables.is_empty() {
            let vars: Vec<String> = self.variables.iter().map(|(k, v)| format!("{k}={v}")).collect();
            out.push_str(&format!(" [{}]", vars.join(", ")));
        }
        Some(out)
    }
}

#[derive(Debug, Error)]
pub enum JourneyError {
    #[error("journey template \"{0}\" not found")]
    TemplateNotFound(String),
    #[error("journey session \"{0}\" not found")]
    SessionNotFound(String),
}

/// Process-wide store of journey templates and live sessions.
pub struct JourneyStore {
    templates: DashMap<String, Arc<JourneyTemplate>>,
    sessions: DashMap<String, JourneyInstance>,
}

impl JourneyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { templates: DashMap::new(), sessions: DashMap::new() })
    }

    pub fn register_template(&self, template: JourneyTemplate) {
        self.templates.insert(template.name.clone(), Arc::new(template));
    }

    pub fn list_templates(&self) -> Vec<String> {
        self.templates.iter().map(|e| e.key().clone()).collect()
    }

    pub fn get_template(&self, name: &str) -> Option<Arc<JourneyTemplate>> {
        self.templates.get(name).map(|e| e.value().clone())
    }

    pub fn delete_template(&self, name: &str) -> Result<(), JourneyError> {
        self.templates.remove(name).map(|_| ()).ok_or_else(|| JourneyError::TemplateNotFound(name.to_string()))
    }

    pub fn start_session(
        &self,
        session_id: &str,
        template_name: &str,
        variables: BTreeMap<String, String>,
    ) -> Result<JourneyInstance, JourneyError> {
        let template = self.get_template(template_name).ok_or_else(|| JourneyError::TemplateNotFound(template_name.to_string()))?;
        let instance = JourneyInstance::new(session_id, &template, variables);
        self.sessions.insert(session_id.to_string(), instance.clone());
        Ok(instance)
    }

    pub fn get_session(&self, session_id: &str) -> Option<JourneyInstance> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    pub fn advance_session(&self, session_id: &str) -> Result<JourneyInstance, JourneyError> {
        let current = self.get_session(session_id).ok_or_else(|| JourneyError::SessionNotFound(session_id.to_string()))?;
        let next = current.advance_step();
        self.sessions.insert(session_id.to_string(), next.clone());
        Ok(next)
    }

    pub fn end_session(&self, session_id: &str) -> Result<(), JourneyError> {
        self.sessions.remove(session_id).map(|_| ()).ok_or_else(|| JourneyError::SessionNotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> JourneyTemplate {
        JourneyTemplate {
            name: "onboarding".to_string(),
            steps: vec![
                JourneyStep { name: "welcome".to_string(), description: "greet the new user".to_string() },
                JourneyStep { name: "verify".to_string(), description: "ask for verification code".to_string() },
                JourneyStep { name: "done".to_string(), description: "confirm setup is complete".to_string() },
            ],
        }
    }

    #[test]
    fn advance_step_returns_a_new_value_rather_than_mutating() {
        let store = JourneyStore::new();
        store.register_template(template());
        let started = store.start_session("s1", "onboarding", BTreeMap::new()).unwrap();
        assert_eq!(started.current_step_index, 0);

        let advanced = store.advance_session("s1").unwrap();
        assert_eq!(advanced.current_step_index, 1);
        assert_eq!(started.current_step_index, 0, "original instance must be unaffected");
    }

    #[test]
    fn advancing_past_the_last_step_stays_on_the_last_step() {
        let store = JourneyStore::new();
        store.register_template(template());
        store.start_session("s1", "onboarding", BTreeMap::new()).unwrap();
        store.advance_session("s1").unwrap();
        store.advance_session("s1").unwrap();
        let at_end = store.advance_session("s1").unwrap();
        assert_eq!(at_end.current_step_index, 2);
        assert!(at_end.is_finished());
    }

    #[test]
    fn unknown_template_is_an_error() {
        let store = JourneyStore::new();
        let result = store.start_session("s1", "ghost", BTreeMap::new());
        assert!(matches!(result, Err(JourneyError::TemplateNotFound(_))));
    }

    #[test]
    fn prompt_block_includes_step_name_and_variables() {
        let store = JourneyStore::new();
        store.register_template(template());
        let mut vars = BTreeMap::new();
        vars.insert("userName".to_string(), "Ann".to_string());
        let instance = store.start_session("s1", "onboarding", vars).unwrap();
        let block = instance.prompt_block().unwrap();
        assert!(block.contains("welcome"));
        assert!(block.contains("userName=Ann"));
    }
}
