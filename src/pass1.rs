// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Pass 1: build the symbol table, size every instruction, and collect the
// data image. No symbol references are resolved here.

use crate::codeimg::CodeImage;
use crate::diagnostics::DiagnosticLog;
use crate::identifiers::is_valid_label_name;
use crate::instructions::parse_instruction;
use crate::isa::{self, IC_INIT};
use crate::namespace::NameSet;
use crate::preassembler::strip_comment;
use crate::symbol_table::{DefineError, SymbolKind, SymbolTable};

/// Everything pass 1 hands to pass 2 and the output stage.
#[derive(Debug)]
pub struct Pass1Result {
    pub symbols: SymbolTable,
    /// One zero placeholder per word pass 2 will emit.
    pub code: CodeImage,
    /// Real data words; addresses start at `icf` after relocation.
    pub data: CodeImage,
    pub icf: u16,
    pub dc: u16,
    pub ok: bool,
    pub log: DiagnosticLog,
}

struct Analyzer<'a> {
    names: &'a mut NameSet,
    symbols: SymbolTable,
    code: CodeImage,
    data: CodeImage,
    ic: u16,
    dc: u16,
    log: DiagnosticLog,
}

/// Run the first pass over the expanded source.
pub fn run(lines: &[String], names: &mut NameSet) -> Pass1Result {
    let mut analyzer = Analyzer {
        names,
        symbols: SymbolTable::new(),
        code: CodeImage::new(),
        data: CodeImage::new(),
        ic: IC_INIT,
        dc: 0,
        log: DiagnosticLog::new(),
    };
    for (ix, line) in lines.iter().enumerate() {
        analyzer.process_line(line, ix as u32 + 1);
    }
    analyzer.finish()
}

/// Split an optional leading `LABEL:` off the line. The label text is not
/// validated here; the colon must sit right after the identifier.
fn read_optional_label(line: &str) -> (Option<&str>, &str) {
    let bytes = line.as_bytes();
    let first = bytes.first().copied().unwrap_or(0);
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return (None, line);
    }
    let mut end = 1;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    if bytes.get(end) == Some(&b':') {
        (Some(&line[..end]), &line[end + 1..])
    } else {
        (None, line)
    }
}

fn parse_int_prefix(s: &str) -> Option<(i64, &str)> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    s[..end].parse::<i64>().ok().map(|v| (v, &s[end..]))
}

/// Comma-separated integers; every failure maps to the one `err` message
/// its directive reports.
fn parse_int_list(text: &str, err: &str) -> Result<Vec<i64>, String> {
    let mut values = Vec::new();
    let mut rest = text.trim();
    if rest.is_empty() {
        return Err(err.to_string());
    }
    loop {
        let (value, tail) = parse_int_prefix(rest).ok_or_else(|| err.to_string())?;
        values.push(value);
        rest = tail.trim_start();
        if rest.is_empty() {
            return Ok(values);
        }
        let Some(tail) = rest.strip_prefix(',') else {
            return Err(err.to_string());
        };
        rest = tail.trim_start();
        if rest.is_empty() {
            return Err(err.to_string());
        }
    }
}

/// `.string "…"` body: character codes plus a terminating zero.
fn parse_string_words(text: &str) -> Result<Vec<i64>, String> {
    let rest = text.trim_start();
    let Some(rest) = rest.strip_prefix('"') else {
        return Err(".string expects a quoted literal".to_string());
    };
    let mut words = Vec::new();
    let mut chars = rest.chars();
    loop {
        match chars.next() {
            None => return Err("missing closing quote in .string".to_string()),
            Some('"') => break,
            Some('\\') => match chars.next() {
                None => return Err("missing closing quote in .string".to_string()),
                // \" and \\ map to themselves; other escapes pass through.
                Some(esc) => words.push(esc as i64),
            },
            Some(c) => words.push(c as i64),
        }
    }
    if !chars.as_str().trim().is_empty() {
        return Err("unexpected text after .string".to_string());
    }
    words.push(0);
    Ok(words)
}

/// `.mat [rows][cols]` with an optional initializer list; missing cells
/// fill with zero.
fn parse_mat_words(text: &str) -> Result<Vec<i64>, String> {
    const ERR: &str = "malformed .mat definition";
    let mut rest = text.trim_start();

    let read_dim = |rest: &mut &str| -> Result<i64, String> {
        let Some(tail) = rest.strip_prefix('[') else {
            return Err(ERR.to_string());
        };
        let (value, tail) = parse_int_prefix(tail.trim_start()).ok_or_else(|| ERR.to_string())?;
        let tail = tail.trim_start();
        let Some(tail) = tail.strip_prefix(']') else {
            return Err(ERR.to_string());
        };
        *rest = tail.trim_start();
        Ok(value)
    };

    let rows = read_dim(&mut rest)?;
    let cols = read_dim(&mut rest)?;
    if rows <= 0 || cols <= 0 {
        return Err(ERR.to_string());
    }
    let total = rows
        .checked_mul(cols)
        .and_then(|t| usize::try_from(t).ok())
        .ok_or_else(|| ERR.to_string())?;

    let mut values = if rest.is_empty() {
        Vec::new()
    } else {
        parse_int_list(rest, ERR)?
    };
    if values.len() > total {
        return Err(ERR.to_string());
    }
    values.resize(total, 0);
    Ok(values)
}

/// Read an identifier operand for `.entry`/`.extern`.
fn parse_symbol_operand(text: &str) -> Option<&str> {
    let rest = text.trim_start();
    let bytes = rest.as_bytes();
    let first = bytes.first().copied()?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut end = 1;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    Some(&rest[..end])
}

impl Analyzer<'_> {
    fn process_line(&mut self, raw: &str, line_no: u32) {
        let line = strip_comment(raw);
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            return;
        }

        let (label, rest) = read_optional_label(trimmed);
        let rest = rest.trim_start();
        if rest.is_empty() {
            if label.is_some() {
                self.log.error(line_no, "label without statement");
            }
            return;
        }

        if rest.starts_with('.') {
            self.handle_directive(rest, label, line_no);
        } else {
            self.handle_instruction(rest, label, line_no);
        }
    }

    /// Validate and define a label; namespace collisions and table errors
    /// all land in the log, and the label is skipped.
    fn define_label(&mut self, label: &str, value: u16, kind: SymbolKind, line_no: u32) {
        if !is_valid_label_name(label) {
            self.log
                .error(line_no, format!("illegal label name '{label}'"));
            return;
        }
        if self.names.contains(label) && self.symbols.lookup(label).is_none() {
            self.log.error(
                line_no,
                format!("identifier '{label}' already in use as a macro name"),
            );
            return;
        }
        match self.symbols.define(label, value, kind, line_no) {
            Ok(()) => {
                self.names.insert(label);
            }
            Err(DefineError::AlreadyExtern { prev_line }) => self.log.error(
                line_no,
                format!("cannot define external symbol '{label}' (declared extern at line {prev_line})"),
            ),
            Err(DefineError::AlreadyDefined { prev_line }) => self.log.error(
                line_no,
                format!("duplicate label '{label}' (previously defined at line {prev_line})"),
            ),
        }
    }

    fn push_data_words(&mut self, words: &[i64], line_no: u32) {
        for &value in words {
            self.data.push(isa::word_imm(value), line_no);
        }
        self.dc = self.dc.wrapping_add(words.len() as u16);
    }

    fn handle_directive(&mut self, text: &str, label: Option<&str>, line_no: u32) {
        let name_end = text[1..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .map(|ix| ix + 1)
            .unwrap_or(text.len());
        let (directive, rest) = text.split_at(name_end);

        match directive {
            ".data" => {
                if let Some(label) = label {
                    self.define_label(label, self.dc, SymbolKind::Data, line_no);
                }
                match parse_int_list(rest, "malformed .data list") {
                    Ok(words) => self.push_data_words(&words, line_no),
                    Err(msg) => self.log.error(line_no, msg),
                }
            }
            ".string" => {
                if let Some(label) = label {
                    self.define_label(label, self.dc, SymbolKind::Data, line_no);
                }
                match parse_string_words(rest) {
                    Ok(words) => self.push_data_words(&words, line_no),
                    Err(msg) => self.log.error(line_no, msg),
                }
            }
            ".mat" => {
                if let Some(label) = label {
                    self.define_label(label, self.dc, SymbolKind::Data, line_no);
                }
                match parse_mat_words(rest) {
                    Ok(words) => self.push_data_words(&words, line_no),
                    Err(msg) => self.log.error(line_no, msg),
                }
            }
            ".extern" => {
                // A label in front of .extern carries no meaning; ignore it.
                let Some(name) = parse_symbol_operand(rest) else {
                    self.log.error(line_no, "expected symbol after .extern");
                    return;
                };
                if let Err(DefineError::AlreadyDefined { prev_line }) =
                    self.symbols.define(name, 0, SymbolKind::Extern, line_no)
                {
                    self.log.error(
                        line_no,
                        format!("cannot declare '{name}' extern (defined locally at line {prev_line})"),
                    );
                }
            }
            ".entry" => {
                let Some(name) = parse_symbol_operand(rest) else {
                    self.log.error(line_no, "expected symbol after .entry");
                    return;
                };
                if self.symbols.mark_entry(name, line_no).is_err() {
                    self.log.error(
                        line_no,
                        format!("symbol '{name}' marked .entry but also declared .extern"),
                    );
                }
            }
            _ => {
                self.log.error(line_no, "unknown directive");
            }
        }
    }

    fn handle_instruction(&mut self, text: &str, label: Option<&str>, line_no: u32) {
        if let Some(label) = label {
            self.define_label(label, self.ic, SymbolKind::Code, line_no);
        }
        let Some(parsed) = parse_instruction(text, line_no, &mut self.log) else {
            // Malformed instruction: reserve nothing.
            return;
        };
        let words = parsed.word_count();
        self.code.push_placeholders(words, line_no);
        self.ic = self.ic.wrapping_add(words);
    }

    fn finish(mut self) -> Pass1Result {
        let icf = self.ic;
        self.symbols.relocate_data(icf);
        let ok = !self.log.has_errors();
        Pass1Result {
            symbols: self.symbols,
            code: self.code,
            data: self.data,
            icf,
            dc: self.dc,
            ok,
            log: self.log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(lines: &[&str]) -> Pass1Result {
        let mut names = NameSet::new();
        let source: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        run(&source, &mut names)
    }

    #[test]
    fn sizes_instructions_and_reserves_placeholders() {
        let result = analyze(&["mov r3, r4", "stop", "prn #-1"]);
        assert!(result.ok, "{:?}", result.log.items());
        // 2 + 1 + 2 words reserved.
        assert_eq!(result.code.len(), 5);
        assert_eq!(result.icf, 105);
        assert_eq!(result.dc, 0);
        assert!(result.code.words().iter().all(|w| w.value == 0));
    }

    #[test]
    fn data_directive_defines_and_advances_dc() {
        let result = analyze(&["L: .data 5, -3", "mov L, r2"]);
        assert!(result.ok, "{:?}", result.log.items());
        // mov L, r2 = first + label + register word.
        assert_eq!(result.icf, 103);
        assert_eq!(result.dc, 2);
        let l = result.symbols.lookup("L").unwrap();
        assert_eq!(l.kind(), Some(SymbolKind::Data));
        assert_eq!(l.value(), 103); // 0 + ICF
        assert_eq!(result.data.word_at(0), isa::word_imm(5));
        assert_eq!(result.data.word_at(1), isa::word_imm(-3));
    }

    #[test]
    fn string_directive_pushes_chars_and_terminator() {
        let result = analyze(&["S: .string \"ab\""]);
        assert!(result.ok);
        assert_eq!(result.dc, 3);
        assert_eq!(result.data.word_at(0), isa::word_imm('a' as i64));
        assert_eq!(result.data.word_at(1), isa::word_imm('b' as i64));
        assert_eq!(result.data.word_at(2), isa::word_imm(0));
    }

    #[test]
    fn string_escapes_quote_and_backslash() {
        let result = analyze(&[r#"S: .string "a\"b\\c""#]);
        assert!(result.ok, "{:?}", result.log.items());
        assert_eq!(result.dc, 6);
        assert_eq!(result.data.word_at(1), isa::word_imm('"' as i64));
        assert_eq!(result.data.word_at(3), isa::word_imm('\\' as i64));
    }

    #[test]
    fn mat_fills_missing_cells_with_zero() {
        let result = analyze(&["M: .mat [2][2] 1, 2, 3"]);
        assert!(result.ok, "{:?}", result.log.items());
        assert_eq!(result.dc, 4);
        assert_eq!(result.data.word_at(2), isa::word_imm(3));
        assert_eq!(result.data.word_at(3), isa::word_imm(0));
    }

    #[test]
    fn mat_rejects_bad_dimensions_and_overflow() {
        for line in ["M: .mat [0][2]", "M: .mat [2][-1]", "M: .mat 2 2", "M: .mat [1][1] 1, 2"] {
            let result = analyze(&[line]);
            assert!(!result.ok, "{line} should fail");
            assert!(result
                .log
                .items()
                .iter()
                .any(|d| d.message() == "malformed .mat definition"));
        }
    }

    #[test]
    fn extern_defines_at_zero_and_entry_flags() {
        let result = analyze(&[".extern K", "MAIN: mov r1, r2", ".entry MAIN"]);
        assert!(result.ok, "{:?}", result.log.items());
        let k = result.symbols.lookup("K").unwrap();
        assert!(k.is_extern());
        assert_eq!(k.value(), 0);
        let main = result.symbols.lookup("MAIN").unwrap();
        assert!(main.is_entry());
        assert_eq!(main.value(), 100);
    }

    #[test]
    fn forward_entry_is_filled_by_later_definition() {
        let result = analyze(&[".entry X", "X: .data 1"]);
        assert!(result.ok);
        let x = result.symbols.lookup("X").unwrap();
        assert!(x.is_entry());
        assert_eq!(x.kind(), Some(SymbolKind::Data));
    }

    #[test]
    fn label_before_entry_or_extern_is_ignored() {
        let result = analyze(&["IGNORED: .extern K", "ALSO: .entry K2", "K2: stop"]);
        assert!(result.ok, "{:?}", result.log.items());
        assert!(result.symbols.lookup("IGNORED").is_none());
        assert!(result.symbols.lookup("ALSO").is_none());
    }

    #[test]
    fn entry_on_extern_is_an_error() {
        let result = analyze(&[".extern K", ".entry K"]);
        assert!(!result.ok);
        assert_eq!(
            result.log.items()[0].message(),
            "symbol 'K' marked .entry but also declared .extern"
        );
    }

    #[test]
    fn malformed_operand_reserves_no_words() {
        let result = analyze(&["mov ,r1", "stop"]);
        assert!(!result.ok);
        assert_eq!(result.log.items()[0].message(), "missing source operand");
        assert_eq!(result.log.items()[0].line(), 1);
        // Only the stop word is reserved.
        assert_eq!(result.code.len(), 1);
        assert_eq!(result.icf, 101);
    }

    #[test]
    fn duplicate_label_is_reported_with_first_line() {
        let result = analyze(&["A: stop", "A: stop"]);
        assert!(!result.ok);
        assert_eq!(
            result.log.items()[0].message(),
            "duplicate label 'A' (previously defined at line 1)"
        );
    }

    #[test]
    fn defining_an_extern_locally_is_an_error() {
        let result = analyze(&[".extern K", "K: stop"]);
        assert!(!result.ok);
        assert!(result.log.items()[0]
            .message()
            .starts_with("cannot define external symbol 'K'"));
    }

    #[test]
    fn label_matching_macro_name_collides() {
        let mut names = NameSet::new();
        names.insert("setup");
        let source = vec!["setup: stop".to_string()];
        let result = run(&source, &mut names);
        assert!(!result.ok);
        assert_eq!(
            result.log.items()[0].message(),
            "identifier 'setup' already in use as a macro name"
        );
        assert!(result.symbols.lookup("setup").is_none());
    }

    #[test]
    fn illegal_labels_are_skipped_but_line_continues() {
        let result = analyze(&["bad_label: stop"]);
        assert!(!result.ok);
        assert_eq!(
            result.log.items()[0].message(),
            "illegal label name 'bad_label'"
        );
        // The instruction itself still reserved its word.
        assert_eq!(result.code.len(), 1);
    }

    #[test]
    fn naked_label_is_an_error() {
        let result = analyze(&["LONELY:"]);
        assert!(!result.ok);
        assert_eq!(result.log.items()[0].message(), "label without statement");
    }

    #[test]
    fn unknown_directive_and_missing_operands() {
        assert!(!analyze(&[".word 5"]).ok);
        assert!(!analyze(&[".extern"]).ok);
        assert!(!analyze(&[".entry"]).ok);
        assert!(!analyze(&["X: .data"]).ok);
        assert!(!analyze(&["X: .data 1,"]).ok);
        assert!(!analyze(&["X: .data 1 2"]).ok);
        assert!(!analyze(&["X: .string abc"]).ok);
        assert!(!analyze(&["X: .string \"abc"]).ok);
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let result = analyze(&["; pure comment", "", "   ", "stop ; trailing"]);
        assert!(result.ok);
        assert_eq!(result.code.len(), 1);
    }

    #[test]
    fn repeated_extern_is_tolerated() {
        let result = analyze(&[".extern K", ".extern K"]);
        assert!(result.ok, "{:?}", result.log.items());
    }

    #[test]
    fn collect_all_keeps_scanning_after_errors() {
        let result = analyze(&["mov ,r1", "bogus r2", "stop"]);
        assert!(!result.ok);
        assert_eq!(result.log.error_count(), 2);
        assert_eq!(result.code.len(), 1);
    }
}
