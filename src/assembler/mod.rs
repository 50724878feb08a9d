// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Driver facade: preassembler -> pass 1 -> pass 2 -> output files.

use std::fs;
use std::io;

use crate::diagnostics::DiagnosticLog;
use crate::namespace::NameSet;
use crate::pass1::{self, Pass1Result};
use crate::pass2::{self, Pass2Result};
use crate::preassembler::Preassembler;

pub mod cli;
pub mod output;

pub use cli::Cli;
use output::ObjectWriter;

/// File names derived from one base path (no extension).
#[derive(Debug, Clone)]
pub struct UnitPaths {
    pub as_path: String,
    pub am_path: String,
    pub ob_path: String,
    pub ent_path: String,
    pub ext_path: String,
}

impl UnitPaths {
    pub fn new(base: &str) -> Self {
        Self {
            as_path: format!("{base}.as"),
            am_path: format!("{base}.am"),
            ob_path: format!("{base}.ob"),
            ent_path: format!("{base}.ent"),
            ext_path: format!("{base}.ext"),
        }
    }
}

/// Outcome of assembling one translation unit. `source_lines` holds the
/// text the recorded line numbers refer to: the expanded source once the
/// preassembler succeeded, the raw source before that.
#[derive(Debug)]
pub struct AsmRunReport {
    source_path: String,
    source_lines: Vec<String>,
    ok: bool,
    log: DiagnosticLog,
}

impl AsmRunReport {
    fn new(source_path: String, source_lines: Vec<String>, ok: bool, log: DiagnosticLog) -> Self {
        Self {
            source_path,
            source_lines,
            ok,
            log,
        }
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn source_lines(&self) -> &[String] {
        &self.source_lines
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn log(&self) -> &DiagnosticLog {
        &self.log
    }
}

/// Assemble every file named on the command line; one report per file.
pub fn run_with_cli(cli: &Cli) -> Vec<AsmRunReport> {
    cli.input_bases()
        .iter()
        .map(|base| assemble_file(base))
        .collect()
}

/// Assemble `<base>.as` into `<base>.ob` (+ `.ent`/`.ext` when non-empty).
///
/// Every stage gets a fresh symbol table, namespace, and log; stage logs
/// merge into the report in pipeline order. Any failure leaves no output
/// files on disk for this unit.
pub fn assemble_file(base: &str) -> AsmRunReport {
    let paths = UnitPaths::new(base);
    let mut log = DiagnosticLog::new();
    let mut names = NameSet::new();

    let source = match fs::read_to_string(&paths.as_path) {
        Ok(text) => text,
        Err(err) => {
            log.error(0, format!("cannot open {}: {err}", paths.as_path));
            remove_outputs(&paths);
            return AsmRunReport::new(paths.as_path, Vec::new(), false, log);
        }
    };
    let source_lines: Vec<String> = source.lines().map(str::to_string).collect();

    let expanded = Preassembler::new(&mut names).expand(&source_lines);
    log.merge(&expanded.log);
    if !expanded.ok {
        remove_outputs(&paths);
        return AsmRunReport::new(paths.as_path, source_lines, false, log);
    }

    if let Err(err) = write_lines(&paths.am_path, &expanded.lines) {
        log.error(0, format!("cannot write {}: {err}", paths.am_path));
        let _ = fs::remove_file(&paths.am_path);
        remove_outputs(&paths);
        return AsmRunReport::new(paths.as_path, expanded.lines, false, log);
    }

    let p1 = pass1::run(&expanded.lines, &mut names);
    log.merge(&p1.log);
    if !p1.ok {
        remove_outputs(&paths);
        return AsmRunReport::new(paths.as_path, expanded.lines, false, log);
    }

    let p2 = pass2::run(&expanded.lines, &p1.symbols);
    log.merge(&p2.log);
    if !p2.ok {
        remove_outputs(&paths);
        return AsmRunReport::new(paths.as_path, expanded.lines, false, log);
    }

    if let Err(err) = write_outputs(&paths, &p1, &p2) {
        log.error(0, format!("cannot write outputs: {err}"));
        remove_outputs(&paths);
        return AsmRunReport::new(paths.as_path, expanded.lines, false, log);
    }

    AsmRunReport::new(paths.as_path, expanded.lines, true, log)
}

fn write_lines(path: &str, lines: &[String]) -> io::Result<()> {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    fs::write(path, text)
}

fn write_outputs(paths: &UnitPaths, p1: &Pass1Result, p2: &Pass2Result) -> io::Result<()> {
    let writer = ObjectWriter::new();

    let mut buf = Vec::new();
    writer.write_object(&mut buf, &p2.code, &p1.data)?;
    fs::write(&paths.ob_path, &buf)?;

    // Side files exist only when they have rows; stale copies go away.
    if p2.entries.is_empty() {
        let _ = fs::remove_file(&paths.ent_path);
    } else {
        buf.clear();
        writer.write_entries(&mut buf, &p2.entries)?;
        fs::write(&paths.ent_path, &buf)?;
    }
    if p2.externals.is_empty() {
        let _ = fs::remove_file(&paths.ext_path);
    } else {
        buf.clear();
        writer.write_externals(&mut buf, &p2.externals)?;
        fs::write(&paths.ext_path, &buf)?;
    }
    Ok(())
}

/// Drop every output artifact for this unit (failure path; also clears
/// leftovers from an earlier successful run).
fn remove_outputs(paths: &UnitPaths) {
    let _ = fs::remove_file(&paths.ob_path);
    let _ = fs::remove_file(&paths.ent_path);
    let _ = fs::remove_file(&paths.ext_path);
}
