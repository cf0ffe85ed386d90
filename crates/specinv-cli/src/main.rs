use std::panic::catch_unwind;
use std::process::exit;

fn main() {
    let code = catch_unwind(specinv_cli::run_from_env).unwrap_or_else(|_| {
        eprintln!("specinv: unexpected error");
        30
    });
    exit(code);
}
