//! Terminal output
//!
//! Human mode prints short status lines (`✓`, `⚠`, `✗`) and indented
//! detail lines. JSON mode prints nothing but the command's report as one
//! pretty-printed document on stdout, and errors as JSON objects on stderr.

use serde::Serialize;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Writes command results in the selected format
#[derive(Debug, Clone, Copy)]
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn human(&self) -> bool {
        self.format == OutputFormat::Human
    }

    pub fn success(&self, message: &str) {
        if self.human() {
            println!("\u{2713} {message}");
        }
    }

    /// Detail line under a status line
    pub fn info(&self, message: &str) {
        if self.human() {
            println!("  {message}");
        }
    }

    pub fn warn(&self, message: &str) {
        match self.format {
            OutputFormat::Human => eprintln!("\u{26a0} {message}"),
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"level": "warning", "message": message}))
            }
        }
    }

    pub fn error(&self, message: &str) {
        match self.format {
            OutputFormat::Human => eprintln!("\u{2717} Error: {message}"),
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"success": false, "error": message}))
            }
        }
    }

    /// Print `report` as JSON; a no-op in human mode
    pub fn report<T: Serialize + ?Sized>(&self, report: &T) -> anyhow::Result<()> {
        if !self.human() {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        Ok(())
    }
}

/// `1 file`, `3 files`
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
