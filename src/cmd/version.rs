use crate::out;
use crate::Cli;

pub fn run(cli: &Cli) {
    if cli.output.is_json() {
        let _ = out::write_json(&serde_json::json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }));
    } else if !cli.output.is_none() {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    }
}
