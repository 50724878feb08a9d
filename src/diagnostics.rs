// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Line-tagged diagnostic aggregation shared by all pipeline stages.

use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One recorded problem. Line 0 means the diagnostic is not tied to a
/// specific source line (file-level conditions such as I/O failures).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    line: u32,
    severity: Severity,
    message: String,
}

impl Diagnostic {
    pub fn new(line: u32, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            line,
            severity,
            message: message.into(),
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Append-only diagnostic collection.
///
/// Stages record and keep scanning; the driver merges each stage's log and
/// decides whether outputs may be written.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    items: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, line: u32, message: impl Into<String>) {
        self.items.push(Diagnostic::new(line, Severity::Error, message));
    }

    pub fn warning(&mut self, line: u32, message: impl Into<String>) {
        self.items
            .push(Diagnostic::new(line, Severity::Warning, message));
    }

    /// Append copies of every record in `other` (insertion order preserved).
    pub fn merge(&mut self, other: &DiagnosticLog) {
        self.items.extend(other.items.iter().cloned());
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    /// Print every record as `<filename>:<line>: <message>`, insertion order.
    pub fn report<W: Write>(&self, out: &mut W, filename: &str) -> io::Result<()> {
        for item in &self.items {
            if filename.is_empty() {
                writeln!(out, "{}: {}", item.line, item.message)?;
            } else {
                writeln!(out, "{filename}:{}: {}", item.line, item.message)?;
            }
        }
        Ok(())
    }

    /// Like `report`, but each line-tagged record is followed by the
    /// offending source line when one is available.
    pub fn report_with_context<W: Write>(
        &self,
        out: &mut W,
        filename: &str,
        lines: &[String],
    ) -> io::Result<()> {
        for item in &self.items {
            if filename.is_empty() {
                writeln!(out, "{}: {}", item.line, item.message)?;
            } else {
                writeln!(out, "{filename}:{}: {}", item.line, item.message)?;
            }
            if item.line == 0 {
                continue;
            }
            match lines.get(item.line as usize - 1) {
                Some(source) => writeln!(out, "{:>5} | {source}", item.line)?,
                None => writeln!(out, "{:>5} | <source unavailable>", item.line)?,
            }
        }
        Ok(())
    }
}
