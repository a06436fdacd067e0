//! Output rendering for the chat REPL.
//!
//! This module provides the renderer trait the session writes through and a
//! plain-text implementation for the terminal.

use std::io::{self, Stdout, Write};

/// ANSI escape code for dim text (used for token counts).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Trait for rendering session output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Capturing output in tests
pub trait Renderer: Send {
    /// Print a chunk of response text.
    ///
    /// This is called incrementally as fragments are streamed from the API
    /// and must reach the terminal before it returns.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message on its own line.
    fn print_info(&mut self, info: &str);

    /// Print a token count line.
    fn print_token_count(&mut self, label: &str, count: usize) {
        self.print_info(&format!("{label}: {count}"));
    }

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines after streaming.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    line_start: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            line_start: true,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn write(&mut self, text: &str) {
        let _ = self.stdout.write_all(text.as_bytes());
        if !text.is_empty() {
            self.line_start = text.ends_with('\n');
        }
        self.flush();
    }

    /// Moves to a fresh line if streamed text left the cursor mid-line.
    fn ensure_line_start(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        self.write(text);
    }

    fn print_error(&mut self, error: &str) {
        self.ensure_line_start();
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        self.ensure_line_start();
        self.write(&format!("{info}\n"));
    }

    fn print_token_count(&mut self, label: &str, count: usize) {
        self.ensure_line_start();
        if self.use_color {
            self.write(&format!("{ANSI_DIM}{label}: {count}{ANSI_RESET}\n"));
        } else {
            self.write(&format!("{label}: {count}\n"));
        }
    }

    fn finish_response(&mut self) {
        self.ensure_line_start();
    }

    fn print_interrupted(&mut self) {
        self.ensure_line_start();
        self.write("[interrupted]\n");
    }
}
