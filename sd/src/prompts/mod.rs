//! Prompt template store
//!
//! Named templates with `{name}` variable slots and optional system prompts.
//! Variables are declared up front or derived by scanning the template;
//! rendering fails when a declared variable is unbound and ignores extras.

mod builtin;

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from template operations
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("template not found: {0}")]
    UnknownTemplate(String),

    #[error("template '{template}' missing required variables: {}", missing.join(", "))]
    MissingVariables { template: String, missing: Vec<String> },

    #[error("template '{template}' has undeclared slots: {}", undeclared.join(", "))]
    UndeclaredSlots { template: String, undeclared: Vec<String> },

    #[error("failed to load templates: {0}")]
    Load(String),
}

/// A named template with typed variable slots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    pub template: String,
    pub variables: Vec<String>,
    pub system_prompt: Option<String>,
}

impl PromptTemplate {
    /// Create a template; empty `variables` are derived from the slots
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        template: impl Into<String>,
        variables: Vec<String>,
        system_prompt: Option<String>,
    ) -> Self {
        let template = template.into();
        let variables = if variables.is_empty() {
            extract_variables(&template)
        } else {
            variables
        };
        Self {
            id: id.into(),
            name: name.into(),
            template,
            variables,
            system_prompt,
        }
    }

    /// Render with the given bindings
    ///
    /// Every declared variable must be bound; extra bindings are ignored.
    pub fn render(&self, bindings: &HashMap<String, String>) -> Result<String, PromptError> {
        let missing: Vec<String> = self
            .variables
            .iter()
            .filter(|var| !bindings.contains_key(*var))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PromptError::MissingVariables {
                template: self.id.clone(),
                missing,
            });
        }

        let mut rendered = self.template.clone();
        for var in &self.variables {
            if let Some(value) = bindings.get(var) {
                rendered = rendered.replace(&format!("{{{var}}}"), value);
            }
        }
        Ok(rendered)
    }
}

/// Scan a template for `{name}` slots, deduplicated in order of appearance
fn extract_variables(template: &str) -> Vec<String> {
    let pattern = Regex::new(r"\{(\w+)\}").expect("static regex");
    let mut seen = std::collections::HashSet::new();
    let mut variables = Vec::new();
    for caps in pattern.captures_iter(template) {
        let name = caps[1].to_string();
        if seen.insert(name.clone()) {
            variables.push(name);
        }
    }
    variables
}

/// Registry of prompt templates
pub struct PromptStore {
    templates: HashMap<String, PromptTemplate>,
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PromptStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Store preloaded with the built-in template set
    pub fn with_builtins() -> Self {
        let mut store = Self::new();
        for builtin in builtin::BUILTINS {
            let template = PromptTemplate::new(
                builtin.id,
                builtin.name,
                builtin.template,
                builtin.variables.iter().map(|v| v.to_string()).collect(),
                Some(builtin.system_prompt.to_string()),
            );
            // Builtins are statically consistent
            store.register(template).expect("builtin template registers");
        }
        store
    }

    /// Register a template
    ///
    /// Fails when the template body has slots absent from the declared
    /// variable list.
    pub fn register(&mut self, template: PromptTemplate) -> Result<(), PromptError> {
        let scanned = extract_variables(&template.template);
        let undeclared: Vec<String> = scanned
            .into_iter()
            .filter(|slot| !template.variables.contains(slot))
            .collect();
        if !undeclared.is_empty() {
            return Err(PromptError::UndeclaredSlots {
                template: template.id.clone(),
                undeclared,
            });
        }

        debug!(id = %template.id, "Registered prompt template");
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates.get(id)
    }

    /// Template summaries for listing
    pub fn list(&self) -> Vec<(String, String, Vec<String>)> {
        let mut entries: Vec<_> = self
            .templates
            .values()
            .map(|t| (t.id.clone(), t.name.clone(), t.variables.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Render a registered template; returns (prompt, system prompt)
    pub fn render(
        &self,
        id: &str,
        bindings: &HashMap<String, String>,
    ) -> Result<(String, Option<String>), PromptError> {
        let template = self
            .templates
            .get(id)
            .ok_or_else(|| PromptError::UnknownTemplate(id.to_string()))?;
        let rendered = template.render(bindings)?;
        Ok((rendered, template.system_prompt.clone()))
    }

    /// Render a one-off template string without registering it
    pub fn render_custom(
        &self,
        template: &str,
        bindings: &HashMap<String, String>,
        system_prompt: Option<String>,
    ) -> Result<(String, Option<String>), PromptError> {
        let template = PromptTemplate::new("custom", "Custom", template, Vec::new(), system_prompt.clone());
        let rendered = template.render(bindings)?;
        Ok((rendered, system_prompt))
    }

    /// Check bindings against a template; returns (ok, missing names)
    pub fn validate(&self, id: &str, bindings: &HashMap<String, String>) -> (bool, Vec<String>) {
        let Some(template) = self.templates.get(id) else {
            return (false, vec![format!("template not found: {id}")]);
        };
        let missing: Vec<String> = template
            .variables
            .iter()
            .filter(|var| !bindings.contains_key(*var))
            .cloned()
            .collect();
        (missing.is_empty(), missing)
    }

    /// Load additional templates from a JSON file; returns the count loaded
    pub fn load_from_file(&mut self, path: &Path) -> Result<usize, PromptError> {
        #[derive(Deserialize)]
        struct TemplateFile {
            templates: Vec<PromptTemplate>,
        }

        let content = std::fs::read_to_string(path).map_err(|e| PromptError::Load(e.to_string()))?;
        let file: TemplateFile = serde_json::from_str(&content).map_err(|e| PromptError::Load(e.to_string()))?;

        let mut loaded = 0;
        for raw in file.templates {
            let template = PromptTemplate::new(raw.id, raw.name, raw.template, raw.variables, raw.system_prompt);
            self.register(template)?;
            loaded += 1;
        }
        info!(count = loaded, path = %path.display(), "Loaded prompt templates");
        Ok(loaded)
    }

    /// Save every template to a JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), PromptError> {
        let mut templates: Vec<&PromptTemplate> = self.templates.values().collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        let body = serde_json::json!({ "templates": templates });
        let serialized = serde_json::to_string_pretty(&body).map_err(|e| PromptError::Load(e.to_string()))?;
        std::fs::write(path, serialized).map_err(|e| PromptError::Load(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_builtin_identifiers_exist() {
        let store = PromptStore::with_builtins();
        for id in [
            "code_analysis",
            "standards_research",
            "code_generation",
            "bug_fix",
            "code_review",
            "refactoring",
            "documentation",
            "test_generation",
        ] {
            let template = store.get(id).unwrap_or_else(|| panic!("missing builtin: {id}"));
            assert!(template.system_prompt.is_some(), "{id} has a system prompt");
        }
    }

    #[test]
    fn test_variables_derived_from_slots() {
        let template = PromptTemplate::new("t", "T", "{a} and {b} and {a}", Vec::new(), None);
        assert_eq!(template.variables, vec!["a", "b"]);
    }

    #[test]
    fn test_render_happy_path() {
        let store = PromptStore::with_builtins();
        let (prompt, system) = store
            .render("code_analysis", &bindings(&[("language", "rust"), ("code", "fn main() {}")]))
            .unwrap();
        assert!(prompt.contains("rust"));
        assert!(prompt.contains("fn main() {}"));
        assert!(!prompt.contains("{language}"));
        assert!(system.unwrap().contains("code reviewer"));
    }

    #[test]
    fn test_render_missing_variable_fails() {
        let store = PromptStore::with_builtins();
        let err = store
            .render("code_analysis", &bindings(&[("language", "rust")]))
            .unwrap_err();
        match err {
            PromptError::MissingVariables { missing, .. } => assert_eq!(missing, vec!["code"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_ignores_extra_bindings() {
        let store = PromptStore::with_builtins();
        let result = store.render(
            "code_analysis",
            &bindings(&[("language", "rust"), ("code", "x"), ("unused", "y")]),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_render_unknown_template() {
        let store = PromptStore::with_builtins();
        let err = store.render("nope", &HashMap::new()).unwrap_err();
        assert!(matches!(err, PromptError::UnknownTemplate(_)));
    }

    #[test]
    fn test_render_custom() {
        let store = PromptStore::new();
        let (prompt, system) = store
            .render_custom("Say {word} twice", &bindings(&[("word", "hello")]), Some("sys".to_string()))
            .unwrap();
        assert_eq!(prompt, "Say hello twice");
        assert_eq!(system.as_deref(), Some("sys"));
    }

    #[test]
    fn test_validate() {
        let store = PromptStore::with_builtins();
        let (ok, missing) = store.validate("bug_fix", &bindings(&[("language", "rust")]));
        assert!(!ok);
        assert!(missing.contains(&"code".to_string()));
        assert!(missing.contains(&"error".to_string()));

        let (ok, missing) = store.validate(
            "bug_fix",
            &bindings(&[("language", "r"), ("code", "c"), ("error", "e"), ("bug_description", "d")]),
        );
        assert!(ok);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_register_rejects_undeclared_slots() {
        let mut store = PromptStore::new();
        let template = PromptTemplate {
            id: "bad".to_string(),
            name: "Bad".to_string(),
            template: "{a} {b}".to_string(),
            variables: vec!["a".to_string()],
            system_prompt: None,
        };
        let err = store.register(template).unwrap_err();
        assert!(matches!(err, PromptError::UndeclaredSlots { .. }));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("templates.json");

        let mut store = PromptStore::new();
        store
            .register(PromptTemplate::new("t1", "T1", "{x}", Vec::new(), Some("sys".to_string())))
            .unwrap();
        store.save_to_file(&path).unwrap();

        let mut other = PromptStore::new();
        let loaded = other.load_from_file(&path).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(other.get("t1").unwrap().variables, vec!["x"]);
    }
}
