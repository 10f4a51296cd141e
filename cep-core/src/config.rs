/// Editor configuration.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Document content at version 0. Must fit a 32-bit length.
    pub initial_content: Vec<u8>,
    /// Cap on retained applied operations (None = keep all)
    pub history_limit: Option<usize>,
    /// Name of the engine thread
    pub thread_name: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            initial_content: Vec::new(),
            history_limit: None,
            thread_name: "cep-engine".to_string(),
        }
    }
}

impl EditorConfig {
    /// Start from the given content instead of an empty document.
    pub fn with_content(content: impl Into<Vec<u8>>) -> Self {
        Self {
            initial_content: content.into(),
            ..Self::default()
        }
    }
}
