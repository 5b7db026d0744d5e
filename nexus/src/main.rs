//! LibEuFin Nexus entry point: an EBICS 3 (H005) to Taler Wire Gateway
//! payment gateway core. Thin wiring only (spec.md §1); the HTTP facade,
//! the Postgres DAOs, and the PDF key-letter generator are external
//! collaborators this binary does not implement.

mod config;
mod run;
mod sig_down;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        process::exit(1)
    }
}
