//! Reporting and confirmation sink for the rewrite loop.

use crate::replacer::Declined;
use crate::token::limit_chars;
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Excerpts shown to the user are cut to this many characters.
pub const EXCERPT_LIMIT: usize = 150;

/// A match found in detect-only mode.
#[derive(Debug, Clone)]
pub struct Detection<'a> {
    pub pattern: &'a str,
    pub path: &'a Path,
    pub line: usize,
    pub text: &'a str,
}

/// A guarded replacement waiting for confirmation.
#[derive(Debug, Clone)]
pub struct Proposal<'a> {
    pub pattern: &'a str,
    pub path: &'a Path,
    pub line: usize,
    pub before: &'a str,
    pub after: &'a str,
    pub old_content: &'a str,
    pub new_content: &'a str,
}

/// A replacement a guard turned down.
#[derive(Debug, Clone)]
pub struct Rejection<'a> {
    pub pattern: &'a str,
    pub path: &'a Path,
    pub line: usize,
    pub reason: &'a Declined,
}

pub trait Reporter {
    fn detected(&mut self, detection: &Detection<'_>);

    /// Ask whether `proposal` should be written.
    fn confirm(&mut self, proposal: &Proposal<'_>) -> bool;

    fn declined(&mut self, rejection: &Rejection<'_>);

    fn applied(&mut self, _proposal: &Proposal<'_>) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Detected { pattern: String, line: usize, text: String },
    Proposed { pattern: String, line: usize, before: String, after: String },
    Declined { pattern: String, line: usize, reason: Declined },
    Applied { pattern: String, line: usize },
}

/// Records every event and answers confirmations with a fixed reply.
#[derive(Debug, Clone)]
pub struct RecordingReporter {
    pub answer: bool,
    pub events: Vec<Event>,
}

impl RecordingReporter {
    pub fn accepting() -> Self {
        Self {
            answer: true,
            events: Vec::new(),
        }
    }

    pub fn refusing() -> Self {
        Self {
            answer: false,
            events: Vec::new(),
        }
    }
}

impl Reporter for RecordingReporter {
    fn detected(&mut self, detection: &Detection<'_>) {
        self.events.push(Event::Detected {
            pattern: detection.pattern.to_string(),
            line: detection.line,
            text: detection.text.to_string(),
        });
    }

    fn confirm(&mut self, proposal: &Proposal<'_>) -> bool {
        self.events.push(Event::Proposed {
            pattern: proposal.pattern.to_string(),
            line: proposal.line,
            before: proposal.before.to_string(),
            after: proposal.after.to_string(),
        });
        self.answer
    }

    fn declined(&mut self, rejection: &Rejection<'_>) {
        self.events.push(Event::Declined {
            pattern: rejection.pattern.to_string(),
            line: rejection.line,
            reason: rejection.reason.clone(),
        });
    }

    fn applied(&mut self, proposal: &Proposal<'_>) {
        self.events.push(Event::Applied {
            pattern: proposal.pattern.to_string(),
            line: proposal.line,
        });
    }
}

/// Terminal reporter: colored excerpts, optional diff, `y/N` prompt.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    assume_yes: bool,
    show_diff: bool,
}

impl ConsoleReporter {
    pub fn new(assume_yes: bool, show_diff: bool) -> Self {
        Self {
            assume_yes,
            show_diff,
        }
    }
}

impl Reporter for ConsoleReporter {
    fn detected(&mut self, detection: &Detection<'_>) {
        println!(
            "{} {}:{} [{}]",
            "•".yellow(),
            detection.path.display(),
            detection.line,
            detection.pattern.cyan()
        );
        println!("    {}", limit_chars(detection.text, EXCERPT_LIMIT).dimmed());
    }

    fn confirm(&mut self, proposal: &Proposal<'_>) -> bool {
        println!(
            "{} {}:{} [{}]",
            "?".cyan(),
            proposal.path.display(),
            proposal.line,
            proposal.pattern.cyan()
        );
        println!("  {} {}", "-".red(), limit_chars(proposal.before, EXCERPT_LIMIT).red());
        println!("  {} {}", "+".green(), limit_chars(proposal.after, EXCERPT_LIMIT).green());
        if self.show_diff {
            display_diff(proposal.path, proposal.old_content, proposal.new_content);
        }
        if self.assume_yes {
            return true;
        }
        prompt_yes_no("Apply this change? [y/N] ")
    }

    fn declined(&mut self, rejection: &Rejection<'_>) {
        println!(
            "{} {}:{} [{}]: {}",
            "⊘".yellow(),
            rejection.path.display(),
            rejection.line,
            rejection.pattern,
            rejection.reason
        );
    }

    fn applied(&mut self, proposal: &Proposal<'_>) {
        println!(
            "{} {}:{} [{}]",
            "✓".green(),
            proposal.path.display(),
            proposal.line,
            proposal.pattern
        );
    }
}

/// Ask a y/N question on stdout. Anything but an explicit yes is a no.
pub fn prompt_yes_no(question: &str) -> bool {
    print!("{question}");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim(), "y" | "Y" | "yes"),
        Err(_) => false,
    }
}

/// Unified-style line diff between the file before and after an edit.
pub fn display_diff(file: &Path, original: &str, modified: &str) {
    println!("{}", format!("--- {} (original)", file.display()).dimmed());
    println!("{}", format!("+++ {} (rewritten)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for group in diff.grouped_ops(2) {
        for op in group {
            for change in diff.iter_changes(&op) {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("-{change}").red(),
                    ChangeTag::Insert => format!("+{change}").green(),
                    ChangeTag::Equal => format!(" {change}").normal(),
                };
                print!("{line}");
            }
        }
    }
}
