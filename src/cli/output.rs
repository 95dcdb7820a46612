//! Colored terminal output for packaging sessions

use std::io::Write;
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

use crate::packager::BuildOutcome;

/// Output manager for consistent colored terminal output
#[derive(Debug)]
pub struct OutputManager {
    bufwtr: BufferWriter,
    quiet: bool,
}

impl OutputManager {
    /// Create a new output manager
    pub fn new(quiet: bool) -> Self {
        Self {
            bufwtr: BufferWriter::stdout(ColorChoice::Auto),
            quiet,
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        self.tagged("ℹ", ColorSpec::new().set_fg(Some(Color::Cyan)), message);
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        self.tagged(
            "✓",
            ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true),
            message,
        );
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        self.tagged(
            "⚠",
            ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true),
            message,
        );
    }

    /// Print an error message (always shown)
    pub fn error(&self, message: &str) {
        let bufwtr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();

        if buffer.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true)).is_err()
            || write!(&mut buffer, "✗").is_err()
            || buffer.reset().is_err()
            || writeln!(&mut buffer, " {}", message).is_err()
            || bufwtr.print(&buffer).is_err()
        {
            // Stderr failed - fall back to stdout
            println!("[STDERR ERROR] ✗ {}", message);
        }
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        if self.quiet {
            return;
        }

        let mut buffer = self.bufwtr.buffer();
        let _ = writeln!(&mut buffer);
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
        let _ = writeln!(&mut buffer, "═══ {} ═══", title);
        let _ = buffer.reset();
        let _ = self.bufwtr.print(&buffer);
    }

    /// Print indented text (for sub-items)
    pub fn indent(&self, message: &str) {
        self.println(&format!("    {}", message));
    }

    /// Print a plain message
    pub fn println(&self, message: &str) {
        if self.quiet {
            return;
        }

        let mut buffer = self.bufwtr.buffer();
        let _ = writeln!(&mut buffer, "{}", message);
        let _ = self.bufwtr.print(&buffer);
    }

    /// Print one line per package outcome.
    pub fn outcomes(&self, outcomes: &[BuildOutcome]) {
        self.section("Packages");
        for outcome in outcomes {
            match outcome {
                BuildOutcome::Built(result) => {
                    self.success(&format!(
                        "{}: {}",
                        result.package_type,
                        result.artifact_path.display()
                    ));
                    self.indent(&format!("{} bytes, sha256 {}", result.size, result.checksum));
                }
                BuildOutcome::Skipped {
                    package_type,
                    reason,
                } => self.warn(&format!("{}: skipped ({})", package_type, reason)),
                BuildOutcome::Failed {
                    package_type,
                    error,
                } => self.error(&format!("{}: {}", package_type, error)),
            }
        }
    }

    fn tagged(&self, tag: &str, color: &ColorSpec, message: &str) {
        if self.quiet {
            return;
        }

        let mut buffer = self.bufwtr.buffer();
        let _ = buffer.set_color(color);
        let _ = write!(&mut buffer, "{}", tag);
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, " {}", message);
        let _ = self.bufwtr.print(&buffer);
    }
}
