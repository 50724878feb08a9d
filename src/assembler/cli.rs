// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Command-line surface for the asm410 driver.

use clap::Parser;

const LONG_ABOUT: &str = "Two-pass assembler for the 10-bit word machine.

Each input is assembled independently: <base>.as expands to <base>.am,
and a successful run writes <base>.ob plus <base>.ent/<base>.ext when the
source declares entries or references externals. A failing file leaves no
output files behind and sets a non-zero exit code, but later files are
still processed.";

#[derive(Parser, Debug)]
#[command(
    name = "asm410",
    version,
    about = "Two-pass assembler for the 10-bit word machine",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        value_name = "FILE",
        required = true,
        long_help = "Input source files. The .as suffix may be included or omitted; \
                     every other path piece is kept as given."
    )]
    pub files: Vec<String>,

    #[arg(
        short = 'q',
        long = "quiet",
        long_help = "Suppress the per-file progress line. Diagnostics still print."
    )]
    pub quiet: bool,
}

impl Cli {
    /// Input paths reduced to their base form (no `.as` suffix).
    pub fn input_bases(&self) -> Vec<String> {
        self.files.iter().map(|f| base_name(f)).collect()
    }
}

/// Strip a trailing `.as` if present; anything else is taken verbatim.
pub fn base_name(file: &str) -> String {
    file.strip_suffix(".as").unwrap_or(file).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_only_the_as_suffix() {
        assert_eq!(base_name("prog.as"), "prog");
        assert_eq!(base_name("prog"), "prog");
        assert_eq!(base_name("dir/prog.as"), "dir/prog");
        assert_eq!(base_name("prog.asm"), "prog.asm");
    }

    #[test]
    fn cli_collects_multiple_files() {
        let cli = Cli::parse_from(["asm410", "a.as", "b"]);
        assert_eq!(cli.input_bases(), vec!["a", "b"]);
        assert!(!cli.quiet);
        let cli = Cli::parse_from(["asm410", "-q", "a.as"]);
        assert!(cli.quiet);
    }
}
