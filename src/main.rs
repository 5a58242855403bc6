mod builtins;
mod exec;
mod jobs;
mod parser;
mod shell;
mod signals;
mod term;

use std::env;
use std::process;

use log::LevelFilter;

fn main() {
    let args: Vec<String> = env::args().collect();
    let mut emit_prompt = true;
    let mut verbose = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "-h" => print_usage(),
            "-v" => verbose = true,
            "-p" => emit_prompt = false,
            _ => {}
        }
    }

    env_logger::Builder::from_default_env()
        .filter_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .init();

    // Terminal handshake first: it relies on SIGTTIN stopping us, which the
    // shell dispositions installed next would suppress.
    if let Err(err) = term::init() {
        eprintln!("msh: {err:#}");
        process::exit(1);
    }
    signals::install_shell_signals();

    if let Err(err) = shell::run_shell(emit_prompt) {
        eprintln!("msh: {err:#}");
        process::exit(1);
    }
}

fn print_usage() -> ! {
    println!("Usage: msh [-hvp]");
    println!("   -h   Print this help message");
    println!("   -v   Enable debug logging");
    println!("   -p   Do not print a command prompt");
    process::exit(0);
}
