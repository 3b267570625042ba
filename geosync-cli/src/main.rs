//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() {
    if let Err(err) = geosync_cli::run() {
        eprintln!("geosync: {err}");
        std::process::exit(1);
    }
}
