//! Terminal output for the CLI.
//!
//! Progress goes to stdout, warnings and errors to stderr. Colour is applied
//! only when the stream supports it.

use owo_colors::{OwoColorize, Stream};
use std::io::{self, Write};
use std::time::Duration;

/// Coloured status output with verbosity control.
#[derive(Debug, Clone, Copy)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
}

impl OutputManager {
    /// `quiet` suppresses everything but errors; `verbose` enables
    /// [`verbose`](Self::verbose) lines.
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// True when verbose lines are shown.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Bold section header.
    pub fn section(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut out = io::stdout().lock();
        writeln!(out)?;
        writeln!(out, "{}", title.if_supports_color(Stream::Stdout, |s| s.bold()))
    }

    /// `→ message`
    pub fn progress(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(
            io::stdout().lock(),
            "{} {}",
            "→".if_supports_color(Stream::Stdout, |s| s.cyan()),
            message
        )
    }

    /// `✓ message`
    pub fn success(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(
            io::stdout().lock(),
            "{} {}",
            "✓".if_supports_color(Stream::Stdout, |s| s.green()),
            message
        )
    }

    /// `⚠ message` on stderr.
    pub fn warn(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(
            io::stderr().lock(),
            "{} {}",
            "⚠".if_supports_color(Stream::Stderr, |s| s.yellow()),
            message.if_supports_color(Stream::Stderr, |s| s.yellow())
        )
    }

    /// `✗ message` on stderr; never suppressed.
    pub fn error(&self, message: &str) -> io::Result<()> {
        writeln!(
            io::stderr().lock(),
            "{} {}",
            "✗".if_supports_color(Stream::Stderr, |s| s.red()),
            message.if_supports_color(Stream::Stderr, |s| s.red())
        )
    }

    /// Indented detail line.
    pub fn indent(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(io::stdout().lock(), "  {message}")
    }

    /// `  label: value` with a dimmed label.
    pub fn stat(&self, label: &str, value: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(
            io::stdout().lock(),
            "  {}: {}",
            label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
            value
        )
    }

    /// Shown only in verbose mode.
    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if !self.verbose || self.quiet {
            return Ok(());
        }
        writeln!(
            io::stdout().lock(),
            "{}",
            message.if_supports_color(Stream::Stdout, |s| s.dimmed())
        )
    }
}

/// `1536` -> `1.5 KB`
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// `1m 5s`, `2.50s` or `120ms`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}.{:02}s", secs, millis / 10)
    } else {
        format!("{millis}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_sizes_are_human_readable() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn durations_pick_a_unit() {
        assert_eq!(format_duration(Duration::from_millis(120)), "120ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.50s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    }
}
