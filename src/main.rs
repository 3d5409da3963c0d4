//! aerodb-client entry point
//!
//! Parses arguments and dispatches via `cli::run`; any error is printed to
//! stderr as `<code>: <message>` and the process exits with status 1.

use aerodb_client::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
