// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Pass 2: emit final instruction words, record extern use-sites, and
// collect the entry list. Data words stay with the pass-1 result.

use crate::codeimg::CodeImage;
use crate::diagnostics::DiagnosticLog;
use crate::instructions::{parse_instruction, Operand};
use crate::isa::{self, IC_INIT};
use crate::preassembler::strip_comment;
use crate::symbol_table::SymbolTable;

/// One reference to an external symbol: the address of the operand word
/// that carries the External stand-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternUse {
    pub name: String,
    pub addr: u16,
}

/// One `.entry` output row: name plus final relocated address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub name: String,
    pub addr: u16,
}

#[derive(Debug)]
pub struct Pass2Result {
    pub code: CodeImage,
    pub externals: Vec<ExternUse>,
    pub entries: Vec<EntryRecord>,
    pub ok: bool,
    pub log: DiagnosticLog,
}

enum Slot {
    Src,
    Dst,
}

struct Emitter<'a> {
    symbols: &'a SymbolTable,
    code: CodeImage,
    externals: Vec<ExternUse>,
    ic: u16,
    log: DiagnosticLog,
}

/// Run the second pass over the expanded source against pass 1's symbols.
pub fn run(lines: &[String], symbols: &SymbolTable) -> Pass2Result {
    let mut emitter = Emitter {
        symbols,
        code: CodeImage::new(),
        externals: Vec::new(),
        ic: IC_INIT,
        log: DiagnosticLog::new(),
    };
    for (ix, line) in lines.iter().enumerate() {
        emitter.process_line(line, ix as u32 + 1);
    }

    let entries = collect_entries(symbols, &mut emitter.log);
    let ok = !emitter.log.has_errors();
    Pass2Result {
        code: emitter.code,
        externals: emitter.externals,
        entries,
        ok,
        log: emitter.log,
    }
}

/// Strip blank/comment lines, an optional label, and directive lines;
/// returns the instruction text to encode, if any.
fn instruction_text(raw: &str) -> Option<&str> {
    let line = strip_comment(raw);
    let mut rest = line.trim_start();
    if rest.is_empty() {
        return None;
    }

    let bytes = rest.as_bytes();
    if bytes[0].is_ascii_alphabetic() || bytes[0] == b'_' {
        let mut end = 1;
        while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
            end += 1;
        }
        if bytes.get(end) == Some(&b':') {
            rest = rest[end + 1..].trim_start();
        }
    }

    if rest.is_empty() || rest.starts_with('.') {
        return None;
    }
    Some(rest)
}

/// Warn when a payload will not survive the 8-bit mask. The word is still
/// emitted with the low byte, so addresses never shift.
fn check_fit8(log: &mut DiagnosticLog, line_no: u32, value: i64, what: &str) {
    if !(-128..=255).contains(&value) {
        log.warning(
            line_no,
            format!("{what} value out of 8-bit range: {value} (masked)"),
        );
    }
}

impl Emitter<'_> {
    /// The one place a word is appended: the counter and the image advance
    /// together, which keeps use-site addresses honest.
    fn emit(&mut self, word: u16, line_no: u32) {
        self.code.push(word, line_no);
        self.ic = self.ic.wrapping_add(1);
    }

    fn process_line(&mut self, raw: &str, line_no: u32) {
        let Some(text) = instruction_text(raw) else {
            return;
        };
        let Some(parsed) = parse_instruction(text, line_no, &mut self.log) else {
            return;
        };

        self.emit(
            isa::first_word(
                parsed.opcode,
                parsed.src.as_ref().map(Operand::mode_code),
                parsed.dst.as_ref().map(Operand::mode_code),
            ),
            line_no,
        );

        if let (Some(Operand::Register(src)), Some(Operand::Register(dst))) =
            (&parsed.src, &parsed.dst)
        {
            self.emit(isa::word_regs_pair(*src, *dst), line_no);
            return;
        }

        if let Some(src) = &parsed.src {
            self.emit_operand(src, Slot::Src, line_no);
        }
        if let Some(dst) = &parsed.dst {
            self.emit_operand(dst, Slot::Dst, line_no);
        }
    }

    fn emit_operand(&mut self, operand: &Operand, slot: Slot, line_no: u32) {
        match operand {
            Operand::Immediate(value) => {
                check_fit8(&mut self.log, line_no, *value, "immediate");
                self.emit(isa::word_imm(*value), line_no);
            }
            Operand::Register(reg) => {
                let word = match slot {
                    Slot::Src => isa::word_reg_src(*reg),
                    Slot::Dst => isa::word_reg_dst(*reg),
                };
                self.emit(word, line_no);
            }
            Operand::Direct(name) => {
                self.emit_label_word(name, line_no);
            }
            Operand::Matrix(name, row, col) => {
                // Label word first, then the row/col register pair.
                self.emit_label_word(name, line_no);
                self.emit(isa::word_regs_pair(*row, *col), line_no);
            }
        }
    }

    /// Resolve a symbol reference into its operand word. Externs record a
    /// use-site at the address the word lands on; unknown names get the
    /// External stand-in so the stream length stays correct.
    fn emit_label_word(&mut self, name: &str, line_no: u32) {
        let use_addr = self.ic;
        match self.symbols.lookup(name) {
            Some(sym) if sym.is_extern() => {
                self.emit(isa::word_extern(), line_no);
                self.externals.push(ExternUse {
                    name: name.to_string(),
                    addr: use_addr,
                });
            }
            Some(sym) if sym.is_defined() => {
                check_fit8(&mut self.log, line_no, sym.value() as i64, "address");
                self.emit(isa::word_reloc(sym.value()), line_no);
            }
            _ => {
                self.log
                    .error(line_no, format!("undefined symbol '{name}'"));
                self.emit(isa::word_extern(), line_no);
            }
        }
    }
}

/// Emit one entry row per ENTRY-flagged, locally defined symbol; this is
/// the single place entry validity is checked.
fn collect_entries(symbols: &SymbolTable, log: &mut DiagnosticLog) -> Vec<EntryRecord> {
    let mut entries = Vec::new();
    for sym in symbols.iter() {
        if !sym.is_entry() {
            continue;
        }
        if sym.is_extern() {
            log.error(
                sym.def_line(),
                format!("entry symbol '{}' declared extern", sym.name()),
            );
            continue;
        }
        if !sym.is_defined() {
            log.error(
                sym.def_line(),
                format!("entry symbol '{}' is undefined", sym.name()),
            );
            continue;
        }
        entries.push(EntryRecord {
            name: sym.name().to_string(),
            addr: sym.value(),
        });
    }
    entries
}
