//! `tooldrop completions`

use clap::CommandFactory;
use clap_complete::{Shell, generate};

/// Write completions for `shell` to stdout.
pub fn completions(shell: Shell) {
    let mut command = crate::Cli::command();
    let name = command.get_name().to_string();
    generate(shell, &mut command, name, &mut std::io::stdout());
}
