//! x402 facilitator server binary. See [`run`] for the endpoints and environment.

mod chain;
mod config;
mod run;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}
