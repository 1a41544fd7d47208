use std::{env, io, process};

use dagstore::cli::{CommandLineConfig, execute};
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_env("DAGSTORE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let config = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            eprint!("{}", CommandLineConfig::help());
            process::exit(2);
        }
    };

    match execute(&config) {
        Ok(output) => println!("{output}"),
        Err(failure) => {
            println!("{}", failure.to_json());
            process::exit(failure.exit_code());
        }
    }
}
