#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]

//! Binary entrypoint: wires the fleet management plane together and blocks
//! until shutdown.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    fleet_app::run_app().await?;
    Ok(())
}
