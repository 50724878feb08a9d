// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Preassembler: expands mcro/mcroend blocks into the .am source.

use std::collections::HashMap;

use crate::diagnostics::DiagnosticLog;
use crate::identifiers::{is_valid_macro_name, MAX_IDENT_LEN, MAX_LINE_LEN};
use crate::namespace::NameSet;

/// Cut the line at the first `;` that sits outside a double-quoted string.
/// `\"` and `\\` escapes inside a string are honored.
pub fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut ix = 0;
    while ix < bytes.len() {
        match bytes[ix] {
            b'\\' if in_string => ix += 1,
            b'"' => in_string = !in_string,
            b';' if !in_string => return &line[..ix],
            _ => {}
        }
        ix += 1;
    }
    line
}

/// Registered macros: name to stored body lines.
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, Vec<String>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a macro body; returns false on a duplicate name.
    pub fn define(&mut self, name: &str, body: Vec<String>) -> bool {
        if self.macros.contains_key(name) {
            return false;
        }
        self.macros.insert(name.to_string(), body);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&[String]> {
        self.macros.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// Result of expanding one translation unit. `lines` is only meaningful
/// when `ok` holds; a failed run produces no artifact.
#[derive(Debug)]
pub struct PreassembleOutcome {
    pub lines: Vec<String>,
    pub ok: bool,
    pub log: DiagnosticLog,
}

enum State {
    Outside,
    Recording {
        // None while recovering from a bad header; the body is still
        // consumed so scanning can continue past mcroend.
        name: Option<String>,
        body: Vec<String>,
    },
}

/// Line-at-a-time macro expansion state machine.
pub struct Preassembler<'a> {
    names: &'a mut NameSet,
    macros: MacroTable,
    out: Vec<String>,
    log: DiagnosticLog,
    state: State,
}

impl<'a> Preassembler<'a> {
    pub fn new(names: &'a mut NameSet) -> Self {
        Self {
            names,
            macros: MacroTable::new(),
            out: Vec::new(),
            log: DiagnosticLog::new(),
            state: State::Outside,
        }
    }

    /// Feed every line of `source`, then finish.
    pub fn expand(mut self, source: &[String]) -> PreassembleOutcome {
        for (ix, line) in source.iter().enumerate() {
            self.process_line(line, ix as u32 + 1);
        }
        self.finish()
    }

    pub fn process_line(&mut self, raw: &str, line_no: u32) {
        let stripped = strip_comment(raw);
        if stripped.chars().count() > MAX_LINE_LEN {
            self.log
                .error(line_no, format!("line exceeds {MAX_LINE_LEN} characters"));
        }

        // Blank and pure-comment lines pass through unchanged, even while a
        // macro body is being recorded.
        let raw_trim = raw.trim();
        if raw_trim.is_empty() || raw_trim.starts_with(';') {
            self.out.push(raw.trim_end().to_string());
            return;
        }

        let trim = stripped.trim();
        if trim.is_empty() {
            self.out.push(String::new());
            return;
        }

        if trim == "mcro" || (trim.starts_with("mcro") && trim.as_bytes()[4].is_ascii_whitespace())
        {
            self.begin_macro(trim, line_no);
            return;
        }

        if trim == "mcroend" {
            self.end_macro(line_no);
            return;
        }

        if let State::Recording { body, .. } = &mut self.state {
            body.push(trim.to_string());
            return;
        }

        // A line holding exactly a registered macro name expands in place.
        if let Some(body) = self.macros.lookup(trim) {
            self.out.extend(body.iter().cloned());
            return;
        }
        self.out.push(stripped.trim_end().to_string());
    }

    fn begin_macro(&mut self, trim: &str, line_no: u32) {
        if matches!(self.state, State::Recording { .. }) {
            self.log.error(line_no, "nested macro definition");
            return;
        }

        let rest = trim["mcro".len()..].trim();
        let name = rest.split_ascii_whitespace().next().unwrap_or("");
        let valid_name = if name.is_empty() {
            self.log.error(line_no, "missing macro name");
            None
        } else if name.chars().count() > MAX_IDENT_LEN {
            self.log.error(line_no, "macro name too long");
            None
        } else if !is_valid_macro_name(name) {
            self.log
                .error(line_no, format!("illegal macro name '{name}'"));
            None
        } else if self.macros.contains(name) || self.names.contains(name) {
            self.log
                .error(line_no, format!("identifier '{name}' already in use"));
            None
        } else {
            Some(name.to_string())
        };

        self.state = State::Recording {
            name: valid_name,
            body: Vec::new(),
        };
    }

    fn end_macro(&mut self, line_no: u32) {
        match std::mem::replace(&mut self.state, State::Outside) {
            State::Outside => {
                self.log.error(line_no, "'mcroend' without 'mcro'");
            }
            State::Recording { name, body } => {
                if let Some(name) = name {
                    self.macros.define(&name, body);
                    self.names.insert(&name);
                }
            }
        }
    }

    pub fn finish(mut self) -> PreassembleOutcome {
        if let State::Recording { name, .. } = &self.state {
            let name = name.as_deref().unwrap_or("?");
            self.log.error(0, format!("unclosed macro '{name}'"));
        }
        let ok = !self.log.has_errors();
        PreassembleOutcome {
            lines: self.out,
            ok,
            log: self.log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(lines: &[&str]) -> PreassembleOutcome {
        let mut names = NameSet::new();
        let source: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        Preassembler::new(&mut names).expand(&source)
    }

    #[test]
    fn expands_invocation_and_drops_definition() {
        let out = expand(&[
            "mcro copy3",
            "    mov r1, r2",
            "    mov r2, r3",
            "mcroend",
            "copy3",
            "stop",
        ]);
        assert!(out.ok);
        assert_eq!(out.lines, vec!["mov r1, r2", "mov r2, r3", "stop"]);
    }

    #[test]
    fn invocation_expands_every_time() {
        let out = expand(&["mcro m_1", "inc r1", "mcroend", "m_1", "m_1"]);
        assert!(out.ok);
        assert_eq!(out.lines, vec!["inc r1", "inc r1"]);
    }

    #[test]
    fn blank_and_comment_lines_pass_through() {
        let out = expand(&["; header comment", "", "stop"]);
        assert!(out.ok);
        assert_eq!(out.lines, vec!["; header comment", "", "stop"]);
    }

    #[test]
    fn is_idempotent_without_macros() {
        let source = ["MAIN: mov r1, r2", "; note", "", "stop"];
        let first = expand(&source);
        assert!(first.ok);
        let second = {
            let mut names = NameSet::new();
            Preassembler::new(&mut names).expand(&first.lines)
        };
        assert!(second.ok);
        assert_eq!(first.lines, second.lines);
    }

    #[test]
    fn macro_names_register_in_shared_namespace() {
        let mut names = NameSet::new();
        let source: Vec<String> = ["mcro setup", "clr r1", "mcroend"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = Preassembler::new(&mut names).expand(&source);
        assert!(out.ok);
        assert!(names.contains("setup"));
    }

    #[test]
    fn reserved_macro_name_is_rejected() {
        let out = expand(&["mcro mov", "inc r1", "mcroend", "stop"]);
        assert!(!out.ok);
        assert_eq!(out.log.items()[0].message(), "illegal macro name 'mov'");
    }

    #[test]
    fn duplicate_macro_is_rejected() {
        let out = expand(&[
            "mcro m1", "inc r1", "mcroend", "mcro m1", "dec r1", "mcroend",
        ]);
        assert!(!out.ok);
        assert_eq!(
            out.log.items()[0].message(),
            "identifier 'm1' already in use"
        );
    }

    #[test]
    fn missing_and_illegal_names_are_rejected() {
        assert!(!expand(&["mcro", "mcroend"]).ok);
        assert!(!expand(&["mcro 1up", "mcroend"]).ok);
        assert!(!expand(&["mcro _hidden", "mcroend"]).ok);
    }

    #[test]
    fn nested_macro_is_an_error() {
        let out = expand(&["mcro outer", "mcro inner", "mcroend", "mcroend"]);
        assert!(!out.ok);
        assert_eq!(out.log.items()[0].message(), "nested macro definition");
        assert_eq!(out.log.items()[1].message(), "'mcroend' without 'mcro'");
    }

    #[test]
    fn stray_mcroend_is_an_error() {
        let out = expand(&["mcroend"]);
        assert!(!out.ok);
        assert_eq!(out.log.items()[0].message(), "'mcroend' without 'mcro'");
    }

    #[test]
    fn unclosed_macro_is_an_error() {
        let out = expand(&["mcro m1", "inc r1"]);
        assert!(!out.ok);
        let last = out.log.items().last().unwrap();
        assert_eq!(last.line(), 0);
        assert_eq!(last.message(), "unclosed macro 'm1'");
    }

    #[test]
    fn overlong_line_is_rejected() {
        let long = "x".repeat(81);
        let out = expand(&[long.as_str()]);
        assert!(!out.ok);
        assert!(out.log.items()[0].message().contains("exceeds 80"));
    }

    #[test]
    fn long_comment_does_not_trip_length_check() {
        let line = format!("stop ; {}", "c".repeat(120));
        let out = expand(&[line.as_str()]);
        assert!(out.ok, "{:?}", out.log.items());
        assert_eq!(out.lines, vec!["stop"]);
    }

    #[test]
    fn strip_comment_respects_strings() {
        assert_eq!(strip_comment("mov r1, r2 ; tail"), "mov r1, r2 ");
        assert_eq!(strip_comment(".string \"a;b\""), ".string \"a;b\"");
        assert_eq!(strip_comment(".string \"a;b\" ; c"), ".string \"a;b\" ");
        assert_eq!(strip_comment(".string \"\\\";\" ; c"), ".string \"\\\";\" ");
        assert_eq!(strip_comment("plain"), "plain");
    }
}
