use anyhow::Result;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    concur_cli::main_entry()
}
