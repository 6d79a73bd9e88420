use std::process;
use trident_cli::{cli, exit_code_for};

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("Error: {:#}", e);
        process::exit(exit_code_for(&e));
    }
}
