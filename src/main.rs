//! Shrinkwrap - bundle ASGI applications into self-contained artifacts.
//!
//! When this binary carries an embedded bundle it runs as the stub of a
//! self-extracting executable instead of as the build tool.

use shrinkwrap::bundler::platform::executable::stub;
use shrinkwrap::cli::{self, OutputManager};
use std::process;

fn main() {
    if let Some(code) = stub::stub_main() {
        process::exit(code);
    }

    let args = cli::parse_args();

    let level = if args.verbose {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let output = OutputManager::new(args.verbose, args.quiet);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            process::exit(1);
        }
    };

    let exit_code = match runtime.block_on(cli::run(&args, &output)) {
        Ok(code) => code,
        Err(e) => {
            if let Err(io) = output.error(&e.to_string()) {
                log::error!("{e} (terminal output failed: {io})");
            }
            for suggestion in e.recovery_suggestions() {
                if let Err(io) = output.indent(&format!("hint: {suggestion}")) {
                    log::error!("hint: {suggestion} (terminal output failed: {io})");
                }
            }
            e.exit_code()
        }
    };

    process::exit(exit_code);
}
