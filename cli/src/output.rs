use anyhow::Result;
use clap::ValueEnum;
use serde_json::Value;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Result of one `card` command, printable as text or JSON.
pub struct CommandOutput {
    pub message: String,
    pub lines: Vec<String>,
    pub payload: Value,
}

impl CommandOutput {
    pub fn new(message: impl Into<String>, payload: Value) -> Self {
        Self {
            message: message.into(),
            lines: Vec::new(),
            payload,
        }
    }

    /// Extra rows shown under the message in text mode only.
    pub fn with_lines(mut self, lines: Vec<String>) -> Self {
        self.lines = lines;
        self
    }

    pub fn render(&self, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Text => {
                for line in &self.lines {
                    println!("{line}");
                }
                println!("{}", self.message);
            }
            OutputFormat::Json => {
                let rendered = serde_json::to_string_pretty(&self.payload)?;
                println!("{rendered}");
            }
        }
        Ok(())
    }
}
