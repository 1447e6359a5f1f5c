use branchat_llm::ChatOptions;
use serde::{Deserialize, Serialize};

/// Spacing constants of the layout engine, in layout-space units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Offset of a child from its parent, and the spiral's horizontal step
    pub horizontal_spacing: f64,
    /// Offset below the lowest node, and the spiral's vertical step
    pub vertical_spacing: f64,
    /// Distance between file cards of one upload batch
    pub file_spacing: f64,
    /// Two positions closer than this on both axes overlap
    pub min_distance: f64,
    pub grid: f64,
    /// Probe budget of the spiral search
    pub max_attempts: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_spacing: 400.0,
            vertical_spacing: 300.0,
            file_spacing: 320.0,
            min_distance: 100.0,
            grid: 50.0,
            max_attempts: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Prepended to every history sent to the model
    pub system_prompt: Option<String>,
    /// Opening turn of the conversation synthesized for an upload batch
    pub file_analysis_prompt: String,
    /// Shown on a node until its first chunk arrives
    pub pending_text: String,
    /// Prefix of the user-facing message stored on a failed node
    pub error_prefix: String,
    /// Sampling options sent with every request
    pub chat_options: ChatOptions,
    pub layout: LayoutConfig,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            file_analysis_prompt:
                "Please analyze the contents of these files and provide the main points and insights."
                    .to_string(),
            pending_text: "Waiting for answer...".to_string(),
            error_prefix: "Request failed".to_string(),
            chat_options: ChatOptions::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl CanvasConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_file_analysis_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.file_analysis_prompt = prompt.into();
        self
    }

    pub fn with_chat_options(mut self, options: ChatOptions) -> Self {
        self.chat_options = options;
        self
    }

    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }
}
