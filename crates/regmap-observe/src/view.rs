//! View trait and output formats.

use serde_json::Value;

use crate::error::Result;

/// The output format for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewFormat {
    Text,
    Json,
}

impl ViewFormat {
    /// Parse a view format from a string; anything but `json` is text.
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => ViewFormat::Json,
            _ => ViewFormat::Text,
        }
    }
}

/// The output of a view render.
#[derive(Debug)]
pub struct ViewOutput {
    /// Terminal-friendly text rendering.
    pub text: String,
    /// Machine-readable JSON (always populated).
    pub data: Value,
}

impl ViewOutput {
    /// Render in the requested format.
    pub fn render(&self, format: ViewFormat) -> Result<String> {
        match format {
            ViewFormat::Text => Ok(self.text.clone()),
            ViewFormat::Json => Ok(serde_json::to_string_pretty(&self.data)?),
        }
    }
}

/// Something that can be rendered for a human or a tool.
pub trait View {
    fn render(&self) -> Result<ViewOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing() {
        assert_eq!(ViewFormat::parse("json"), ViewFormat::Json);
        assert_eq!(ViewFormat::parse("text"), ViewFormat::Text);
        assert_eq!(ViewFormat::parse("anything"), ViewFormat::Text);
    }

    #[test]
    fn output_renders_both_formats() {
        let output = ViewOutput {
            text: "blk".to_string(),
            data: serde_json::json!({ "path": "blk" }),
        };
        assert_eq!(output.render(ViewFormat::Text).unwrap(), "blk");
        assert!(output
            .render(ViewFormat::Json)
            .unwrap()
            .contains("\"path\": \"blk\""));
    }
}
