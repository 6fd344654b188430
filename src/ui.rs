//! Display elements the plugin draws on

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Font {
    Bold,
    Medium,
}

/// A `label value` pair at a fixed position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabeledValue {
    pub label: String,
    pub value: String,
    pub position: (u32, u32),
    pub label_font: Font,
    pub text_font: Font,
}

impl LabeledValue {
    pub fn text(&self) -> String {
        format!("{} {}", self.label, self.value)
    }
}

/// Drawing surface offered by the host
pub trait Ui: Send + Sync {
    fn width(&self) -> u32;

    fn add_element(&mut self, key: &str, element: LabeledValue);

    /// Update the value of a registered element. Returns false if `key` is unknown.
    fn set(&mut self, key: &str, value: String) -> bool;
}

/// In-memory `Ui`, sized like the common 2.13" e-paper panel by default
#[derive(Debug, Clone, Serialize)]
pub struct Canvas {
    width: u32,
    height: u32,
    elements: BTreeMap<String, LabeledValue>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(250, 122)
    }
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            elements: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&LabeledValue> {
        self.elements.get(key)
    }

    /// One line per element, top-to-bottom then left-to-right
    pub fn render_text(&self) -> String {
        let mut elements: Vec<_> = self.elements.values().collect();
        elements.sort_by_key(|e| (e.position.1, e.position.0));
        elements
            .iter()
            .map(|e| e.text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Ui for Canvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn add_element(&mut self, key: &str, element: LabeledValue) {
        self.elements.insert(key.to_string(), element);
    }

    fn set(&mut self, key: &str, value: String) -> bool {
        match self.elements.get_mut(key) {
            Some(element) => {
                element.value = value;
                true
            }
            None => false,
        }
    }
}
