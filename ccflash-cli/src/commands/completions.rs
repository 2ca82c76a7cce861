//! Shell completion generation.

use clap_complete::{Shell, generate};
use std::io;

/// Generate completions for the given shell on stdout.
pub(crate) fn cmd_completions(shell: Shell, cmd: &mut clap::Command) {
    let name = cmd.get_name().to_string();
    generate(shell, cmd, name, &mut io::stdout());
}
