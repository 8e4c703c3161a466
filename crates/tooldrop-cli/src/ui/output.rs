//! Terminal [`Reporter`].
//!
//! Status lines go to stdout; warnings, errors and hints go to stderr so
//! they survive `> /dev/null`. Download progress is redrawn in place only
//! when stderr is a terminal.

use std::io::{IsTerminal, Write};
use std::sync::Mutex;

use crossterm::cursor::MoveToColumn;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use tooldrop_core::Reporter;

use super::format_size;

#[derive(Debug)]
pub struct TerminalReporter {
    live_progress: bool,
    /// Last percentage drawn, to avoid redrawing every chunk.
    last_percent: Mutex<Option<u64>>,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self {
            live_progress: std::io::stderr().is_terminal(),
            last_percent: Mutex::new(None),
        }
    }

    /// Remediation hint below an error.
    pub fn hint(&self, hint: &str) {
        self.clear_progress();
        eprintln!("  {} {hint}", "hint:".dark_grey());
    }

    /// Multi-line diagnostic (asset listings, build log tails).
    pub fn diagnostic(&self, text: &str) {
        self.clear_progress();
        for line in text.lines() {
            eprintln!("  {}", line.dark_grey());
        }
    }

    fn clear_progress(&self) {
        if !self.live_progress {
            return;
        }
        let Ok(mut last) = self.last_percent.lock() else {
            return;
        };
        if last.take().is_some() {
            let mut err = std::io::stderr();
            let _ = crossterm::execute!(err, MoveToColumn(0), Clear(ClearType::CurrentLine));
        }
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress text for a download.
pub fn progress_line(current: u64, total: Option<u64>) -> String {
    match total.filter(|&t| t > 0) {
        Some(t) => format!(
            "{} / {} ({}%)",
            format_size(current),
            format_size(t),
            (current.min(t) * 100) / t
        ),
        None => format_size(current),
    }
}

impl Reporter for TerminalReporter {
    fn section(&self, title: &str) {
        self.clear_progress();
        println!();
        println!("{}", title.white().bold());
    }

    fn downloading(&self, name: &str, current: u64, total: Option<u64>) {
        if !self.live_progress {
            return;
        }
        let percent = total.filter(|&t| t > 0).map_or(current / (1024 * 1024), |t| {
            (current.min(t) * 100) / t
        });
        let Ok(mut last) = self.last_percent.lock() else {
            return;
        };
        if *last == Some(percent) {
            return;
        }
        *last = Some(percent);

        let mut err = std::io::stderr();
        let _ = write!(
            err,
            "\r  {} {}  {}",
            "fetching".cyan(),
            name,
            progress_line(current, total).dark_grey()
        );
        let _ = err.flush();
    }

    fn done(&self, name: &str, detail: &str) {
        self.clear_progress();
        println!("  {} {} {}", "✓".green(), name, detail.dark_grey());
    }

    fn info(&self, msg: &str) {
        self.clear_progress();
        println!("  {msg}");
    }

    fn success(&self, msg: &str) {
        self.clear_progress();
        println!("  {} {}", "✓".green().bold(), msg.green());
    }

    fn warning(&self, msg: &str) {
        self.clear_progress();
        eprintln!("  {} {msg}", "warning:".yellow().bold());
    }

    fn error(&self, msg: &str) {
        self.clear_progress();
        eprintln!("  {} {msg}", "error:".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line() {
        assert_eq!(progress_line(512, None), "512 B");
        assert_eq!(progress_line(1024 * 1024, Some(4 * 1024 * 1024)), "1.0 MB / 4.0 MB (25%)");
        // Servers may send more than declared
        assert!(progress_line(10, Some(5)).ends_with("(100%)"));
        assert_eq!(progress_line(7, Some(0)), "7 B");
    }
}
