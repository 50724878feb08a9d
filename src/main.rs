// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for asm410.

use std::io::{self, Write};
use std::process;

use clap::Parser;

use asm410::assembler::{self, Cli};

fn main() {
    let cli = Cli::parse();
    let mut all_ok = true;

    for base in cli.input_bases() {
        if !cli.quiet {
            println!(">>> Processing {base}.as");
        }
        let report = assembler::assemble_file(&base);

        let stderr = io::stderr();
        let mut err = stderr.lock();
        let _ = report.log().report_with_context(
            &mut err,
            report.source_path(),
            report.source_lines(),
        );
        if !report.ok() {
            let _ = writeln!(err, "Assembly failed for {}", report.source_path());
            all_ok = false;
        }
    }

    process::exit(if all_ok { 0 } else { 1 });
}
