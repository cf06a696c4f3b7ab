use rand::Rng;
use serde::{Deserialize, Serialize};

pub const PROMPT_PLACEHOLDER: &str = "Prompt list unavailable, try again or type your own prompt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_image: bool,
    #[serde(default)]
    pub requires_mask: bool,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            requires_image: false,
            requires_mask: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn requiring_image(mut self) -> Self {
        self.requires_image = true;
        self
    }

    pub fn requiring_mask(mut self) -> Self {
        self.requires_mask = true;
        self
    }
}

/// Read-only model list, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self { models }
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// The second entry is usually the better model, so it is preselected
    /// whenever there is more than one.
    pub fn default_model(&self) -> Option<&ModelDescriptor> {
        self.models.get(1).or_else(|| self.models.first())
    }

    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.find(id).map(|m| m.name.as_str()).unwrap_or(id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub require_password: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptBook {
    prompts: Vec<String>,
}

impl PromptBook {
    pub fn new(prompts: Vec<String>) -> Self {
        Self { prompts }
    }

    pub fn placeholder() -> Self {
        Self::new(vec![PROMPT_PLACEHOLDER.to_string()])
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn random(&self) -> Option<&str> {
        if self.prompts.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..self.prompts.len());
        Some(self.prompts[idx].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_wire_format() {
        let json = r#"[
            {"id": "sdxl", "name": "SDXL", "description": "base"},
            {"id": "inpaint", "name": "Inpaint", "requiresImage": true, "requiresMask": true}
        ]"#;
        let models: Vec<ModelDescriptor> = serde_json::from_str(json).unwrap();
        assert!(!models[0].requires_image);
        assert!(models[1].requires_image && models[1].requires_mask);
        assert_eq!(models[1].description, "");
    }

    #[test]
    fn test_default_model_prefers_second() {
        let catalog = ModelCatalog::new(vec![
            ModelDescriptor::new("a", "A"),
            ModelDescriptor::new("b", "B"),
        ]);
        assert_eq!(catalog.default_model().unwrap().id, "b");

        let single = ModelCatalog::new(vec![ModelDescriptor::new("a", "A")]);
        assert_eq!(single.default_model().unwrap().id, "a");
        assert!(ModelCatalog::default().default_model().is_none());
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let catalog = ModelCatalog::new(vec![ModelDescriptor::new("flux", "Flux Schnell")]);
        assert_eq!(catalog.display_name("flux"), "Flux Schnell");
        assert_eq!(catalog.display_name("unknown"), "unknown");
    }

    #[test]
    fn test_random_prompt_comes_from_book() {
        let book = PromptBook::new(vec!["a cat".into(), "a dog".into()]);
        let pick = book.random().unwrap();
        assert!(pick == "a cat" || pick == "a dog");
        assert!(PromptBook::new(Vec::new()).random().is_none());
    }
}
