//! Entry point for the `openfiscal` binary.
#![forbid(unsafe_code)]

use openfiscal_cli::{CliError, run};

#[expect(clippy::print_stderr, reason = "top-level error reporting")]
fn main() {
    match run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("openfiscal: {err}");
            std::process::exit(1);
        }
    }
}
