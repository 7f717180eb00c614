//! `crucible encode` — encode a source the way the pipeline stores it.

use anyhow::{Context, Result};

use crucible::source::encode_source_lenient;

pub fn cmd_encode(source: &str) -> Result<()> {
    let encoded = encode_source_lenient(source)
        .context("Failed to encode source for upload")?;
    println!("{encoded}");
    Ok(())
}
