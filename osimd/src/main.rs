//! # Simulator Daemon
//!
//! Main entry point for a Kernel, CPU or Memory unit.

use osimd::{parse_args, usage, Command, Daemon};
use std::env;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("osimd");

    let options = match parse_args(&args) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            eprintln!("{}", usage(program));
            process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", usage(program));
            process::exit(1);
        }
    };

    let daemon = Daemon::new(options).unwrap_or_else(|e| {
        eprintln!("Failed to start: {}", e);
        process::exit(1);
    });
    daemon.init_logging();
    if let Err(e) = daemon.stop_on_signals() {
        eprintln!("Failed to start: {}", e);
        process::exit(1);
    }

    if let Err(e) = daemon.run() {
        log::error!("{}", e);
        eprintln!("Runtime error: {}", e);
        process::exit(1);
    }
}
