// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Instruction set table and the operand/instruction parser shared by both
// passes: pass 1 takes only the word count, pass 2 takes the payloads.

use crate::diagnostics::DiagnosticLog;

/// A parsed operand with its addressing-mode payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Immediate(i64),
    Direct(String),
    /// Label plus row/column registers from `label[rX][rY]`.
    Matrix(String, u8, u8),
    Register(u8),
}

impl Operand {
    /// 2-bit mode code used in the first instruction word.
    pub fn mode_code(&self) -> u8 {
        match self {
            Operand::Immediate(_) => 0,
            Operand::Direct(_) => 1,
            Operand::Matrix(..) => 2,
            Operand::Register(_) => 3,
        }
    }

    fn mode_mask(&self) -> u8 {
        1 << self.mode_code()
    }

    /// Extra words this operand occupies after the first word.
    pub fn extra_words(&self) -> u16 {
        match self {
            Operand::Matrix(..) => 2,
            _ => 1,
        }
    }
}

// Addressing-mode masks for the legality columns.
const AM_IMM: u8 = 1 << 0;
const AM_DIR: u8 = 1 << 1;
const AM_MAT: u8 = 1 << 2;
const AM_REG: u8 = 1 << 3;
const AM_ALL: u8 = AM_IMM | AM_DIR | AM_MAT | AM_REG;
const AM_NOIMM: u8 = AM_DIR | AM_MAT | AM_REG;
const AM_JUMP: u8 = AM_DIR | AM_MAT;

#[derive(Debug, Clone, Copy)]
pub struct OpSpec {
    pub mnemonic: &'static str,
    pub opcode: u8,
    pub argc: u8,
    src_ok: u8,
    dst_ok: u8,
}

impl OpSpec {
    pub fn allows_src(&self, op: &Operand) -> bool {
        self.src_ok & op.mode_mask() != 0
    }

    pub fn allows_dst(&self, op: &Operand) -> bool {
        self.dst_ok & op.mode_mask() != 0
    }
}

/// The sixteen machine operations; index equals the numeric opcode.
pub const OPCODE_TABLE: [OpSpec; 16] = [
    OpSpec { mnemonic: "mov", opcode: 0, argc: 2, src_ok: AM_ALL, dst_ok: AM_NOIMM },
    OpSpec { mnemonic: "cmp", opcode: 1, argc: 2, src_ok: AM_ALL, dst_ok: AM_ALL },
    OpSpec { mnemonic: "add", opcode: 2, argc: 2, src_ok: AM_ALL, dst_ok: AM_NOIMM },
    OpSpec { mnemonic: "sub", opcode: 3, argc: 2, src_ok: AM_ALL, dst_ok: AM_NOIMM },
    OpSpec { mnemonic: "lea", opcode: 4, argc: 2, src_ok: AM_JUMP, dst_ok: AM_NOIMM },
    OpSpec { mnemonic: "clr", opcode: 5, argc: 1, src_ok: 0, dst_ok: AM_NOIMM },
    OpSpec { mnemonic: "not", opcode: 6, argc: 1, src_ok: 0, dst_ok: AM_NOIMM },
    OpSpec { mnemonic: "inc", opcode: 7, argc: 1, src_ok: 0, dst_ok: AM_NOIMM },
    OpSpec { mnemonic: "dec", opcode: 8, argc: 1, src_ok: 0, dst_ok: AM_NOIMM },
    OpSpec { mnemonic: "jmp", opcode: 9, argc: 1, src_ok: 0, dst_ok: AM_JUMP },
    OpSpec { mnemonic: "bne", opcode: 10, argc: 1, src_ok: 0, dst_ok: AM_JUMP },
    OpSpec { mnemonic: "red", opcode: 11, argc: 1, src_ok: 0, dst_ok: AM_NOIMM },
    OpSpec { mnemonic: "prn", opcode: 12, argc: 1, src_ok: 0, dst_ok: AM_ALL },
    OpSpec { mnemonic: "jsr", opcode: 13, argc: 1, src_ok: 0, dst_ok: AM_JUMP },
    OpSpec { mnemonic: "rts", opcode: 14, argc: 0, src_ok: 0, dst_ok: 0 },
    OpSpec { mnemonic: "stop", opcode: 15, argc: 0, src_ok: 0, dst_ok: 0 },
];

/// Linear lookup is fine for sixteen ops. Mnemonics are case-sensitive.
pub fn find_op(mnemonic: &str) -> Option<&'static OpSpec> {
    OPCODE_TABLE.iter().find(|spec| spec.mnemonic == mnemonic)
}

/// A fully parsed instruction; `src` is populated only for 2-operand ops,
/// `dst` for 1- and 2-operand ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    pub opcode: u8,
    pub src: Option<Operand>,
    pub dst: Option<Operand>,
}

impl ParsedInstruction {
    pub fn operand_count(&self) -> u8 {
        self.src.is_some() as u8 + self.dst.is_some() as u8
    }

    /// Total words this instruction occupies: one first word, then one word
    /// per Immediate/Direct/Register operand and two per Matrix operand,
    /// except that two Register operands share a single packed word.
    pub fn word_count(&self) -> u16 {
        if let (Some(Operand::Register(_)), Some(Operand::Register(_))) = (&self.src, &self.dst) {
            return 2;
        }
        1 + self.src.as_ref().map_or(0, Operand::extra_words)
            + self.dst.as_ref().map_or(0, Operand::extra_words)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            bytes: line.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// After whitespace: nothing left except an optional comment.
    fn rest_is_comment_or_ws(&mut self) -> bool {
        self.skip_ws();
        matches!(self.peek(), 0 | b';')
    }

    /// Consume `c` after whitespace; leaves the cursor untouched on mismatch.
    fn eat(&mut self, c: u8) -> bool {
        self.skip_ws();
        if self.peek() == c {
            self.pos += 1;
            return true;
        }
        false
    }

    /// Read `[A-Za-z_][A-Za-z0-9_]*`.
    fn read_word(&mut self) -> Option<&'a str> {
        let start = self.pos;
        let c = self.peek();
        if !(c.is_ascii_alphabetic() || c == b'_') {
            return None;
        }
        self.pos += 1;
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos]).ok()
    }

    /// Read a register `r0..r7`; anything longer (r12, rx) is left for the
    /// identifier path.
    fn read_register(&mut self) -> Option<u8> {
        if self.peek() == b'r'
            && self.peek_at(1).is_ascii_digit()
            && !self.peek_at(2).is_ascii_alphanumeric()
        {
            let r = self.peek_at(1) - b'0';
            if r <= 7 {
                self.pos += 2;
                return Some(r);
            }
        }
        None
    }

    /// Read an optional sign plus decimal digits.
    fn read_int(&mut self) -> Option<i64> {
        let start = self.pos;
        if matches!(self.peek(), b'+' | b'-') {
            self.pos += 1;
        }
        if !self.peek().is_ascii_digit() {
            self.pos = start;
            return None;
        }
        while self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).ok()?;
        match text.parse::<i64>() {
            Ok(v) => Some(v),
            Err(_) => {
                self.pos = start;
                None
            }
        }
    }

    /// Try `[rX][rY]`; on failure the cursor is restored so the operand
    /// stays Direct and the trailing-junk check reports the leftovers.
    fn read_matrix_suffix(&mut self) -> Option<(u8, u8)> {
        let start = self.pos;
        let parsed = (|| {
            if !self.eat(b'[') {
                return None;
            }
            self.skip_ws();
            let row = self.read_register()?;
            if !self.eat(b']') || !self.eat(b'[') {
                return None;
            }
            self.skip_ws();
            let col = self.read_register()?;
            if !self.eat(b']') {
                return None;
            }
            Some((row, col))
        })();
        if parsed.is_none() {
            self.pos = start;
        }
        parsed
    }

    /// Parse one operand and classify its addressing mode.
    fn read_operand(&mut self) -> Option<Operand> {
        self.skip_ws();
        if self.peek() == b'#' {
            self.pos += 1;
            self.skip_ws();
            return self.read_int().map(Operand::Immediate);
        }
        if let Some(reg) = self.read_register() {
            return Some(Operand::Register(reg));
        }
        let name = self.read_word()?.to_string();
        if let Some((row, col)) = self.read_matrix_suffix() {
            return Some(Operand::Matrix(name, row, col));
        }
        Some(Operand::Direct(name))
    }

    /// True when the next non-space byte ends the operand list.
    fn at_operand_end(&mut self) -> bool {
        self.skip_ws();
        matches!(self.peek(), 0 | b';' | b',')
    }
}

/// Parse a full instruction (mnemonic and operands, legality checked).
/// Diagnostics go to `log`; `None` means the line did not parse.
pub fn parse_instruction(
    line: &str,
    line_no: u32,
    log: &mut DiagnosticLog,
) -> Option<ParsedInstruction> {
    let mut cur = Cursor::new(line);
    cur.skip_ws();
    let Some(mnemonic) = cur.read_word() else {
        log.error(line_no, "expected instruction mnemonic");
        return None;
    };
    let Some(spec) = find_op(mnemonic) else {
        log.error(line_no, format!("unknown mnemonic '{mnemonic}'"));
        return None;
    };

    match spec.argc {
        2 => {
            if cur.at_operand_end() {
                log.error(line_no, "missing source operand");
                return None;
            }
            let Some(src) = cur.read_operand() else {
                log.error(line_no, "invalid source operand");
                return None;
            };
            if !cur.eat(b',') {
                log.error(line_no, "expected comma between operands");
                return None;
            }
            cur.skip_ws();
            if matches!(cur.peek(), 0 | b';') {
                log.error(line_no, "missing destination operand");
                return None;
            }
            let Some(dst) = cur.read_operand() else {
                log.error(line_no, "invalid destination operand");
                return None;
            };
            if !spec.allows_src(&src) {
                log.error(line_no, "addressing mode not allowed for source");
                return None;
            }
            if !spec.allows_dst(&dst) {
                log.error(line_no, "addressing mode not allowed for destination");
                return None;
            }
            if !cur.rest_is_comment_or_ws() {
                log.error(line_no, "unexpected text after instruction");
                return None;
            }
            Some(ParsedInstruction {
                opcode: spec.opcode,
                src: Some(src),
                dst: Some(dst),
            })
        }
        1 => {
            let Some(dst) = cur.read_operand() else {
                log.error(line_no, "invalid operand");
                return None;
            };
            if !spec.allows_dst(&dst) {
                log.error(line_no, "addressing mode not allowed");
                return None;
            }
            if !cur.rest_is_comment_or_ws() {
                log.error(line_no, "unexpected text after instruction");
                return None;
            }
            Some(ParsedInstruction {
                opcode: spec.opcode,
                src: None,
                dst: Some(dst),
            })
        }
        _ => {
            if !cur.rest_is_comment_or_ws() {
                log.error(line_no, "unexpected text after zero-operand instruction");
                return None;
            }
            Some(ParsedInstruction {
                opcode: spec.opcode,
                src: None,
                dst: None,
            })
        }
    }
}
