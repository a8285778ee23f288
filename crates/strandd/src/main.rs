//! `strandd` daemon entry point.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match strandd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            drop(writeln!(io::stderr(), "strandd: {error}"));
            ExitCode::FAILURE
        }
    }
}
