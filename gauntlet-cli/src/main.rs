//! Gauntlet binary entry point.

fn main() {
    match gauntlet_cli::run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("gauntlet: {e:#}");
            std::process::exit(2);
        }
    }
}
