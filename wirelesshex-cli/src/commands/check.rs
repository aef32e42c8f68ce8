//! Check command: validate an image file without touching hardware.

use anyhow::Result;
use console::style;
use std::path::Path;

use wirelesshex::storage::{DATA_OFFSET, MAX_IMAGE_BYTES, REGION_SIZE};

use crate::commands::load_image;
use crate::{Cli, CliError};

/// Check command implementation.
///
/// Runs the same validation the upload path runs, then reports whether the
/// image fits the receiver's storage region.
pub(crate) fn cmd_check(cli: &Cli, file: &Path) -> Result<()> {
    let image = load_image(file)?;

    if !cli.quiet {
        eprintln!(
            "{} {}",
            style("✓").green(),
            style(file.display()).bold()
        );
        eprintln!("  {} data records", image.records.len());
        eprintln!(
            "  {} firmware bytes ({} once stored with its header)",
            image.data_bytes,
            image.data_bytes + u64::from(DATA_OFFSET)
        );
        eprintln!(
            "  receiver capacity: {MAX_IMAGE_BYTES} bytes in a {REGION_SIZE} byte region"
        );
    }

    if image.data_bytes > u64::from(MAX_IMAGE_BYTES) {
        return Err(CliError::Transfer(format!(
            "image is {} bytes over the receiver's limit",
            image.data_bytes - u64::from(MAX_IMAGE_BYTES)
        ))
        .into());
    }

    if !cli.quiet {
        eprintln!("{} Image fits the receiver", style("✓").green().bold());
    }
    Ok(())
}
