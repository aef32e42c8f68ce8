//! Upload command: drive the gateway through a full image transfer.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wirelesshex::protocol::frame::{self, Reply};
use wirelesshex::{SerialLine, MAX_IMAGE_BYTES};

use crate::commands::load_image;
use crate::{get_port, use_fancy_output, Cli, CliError};

/// Timing and retry limits for one upload.
pub(crate) struct UploadOptions {
    /// Wait for the gateway's handshake and EOF confirmations. Covers the
    /// radio handshake the gateway performs before answering.
    pub timeout: Duration,
    /// Wait for one record's `FLX:<seq>:OK` echo. Covers a few radio
    /// retransmissions on the far side.
    pub ack_timeout: Duration,
    /// Sends per record (and per handshake) before giving up.
    pub retries: u32,
}

/// What the gateway said about the line we just sent.
enum LineReply {
    Ok,
    ChunkOk(u16),
    Invalid,
    Noise,
    Silence,
}

/// Upload command implementation.
pub(crate) fn cmd_upload(
    cli: &Cli,
    file: &Path,
    options: &UploadOptions,
    interrupted: &Arc<AtomicBool>,
) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading image {}",
            style("•").cyan(),
            style(file.display()).bold()
        );
    }

    let image = load_image(file)?;
    if !cli.quiet {
        eprintln!(
            "{} {} records, {} bytes of firmware",
            style("✓").green(),
            image.records.len(),
            image.data_bytes
        );
    }
    if image.data_bytes > u64::from(MAX_IMAGE_BYTES) {
        return Err(CliError::Transfer(format!(
            "image is {} bytes; the receiver stores at most {MAX_IMAGE_BYTES}",
            image.data_bytes
        ))
        .into());
    }

    let port = get_port(cli)?;
    if !cli.quiet {
        eprintln!(
            "{} Using gateway on {} at {} baud",
            style("•").cyan(),
            style(&port).bold(),
            cli.baud
        );
    }
    let mut line = wirelesshex::serial::open_port(&port, cli.baud)
        .with_context(|| format!("failed to open {port}"))?;

    // Handshake: the gateway answers FLX?OK only once the target node has
    // acknowledged over the radio, so each attempt waits the full timeout.
    handshake(&mut line, frame::HANDSHAKE, options, interrupted)
        .context("target node did not answer the handshake")?;
    if !cli.quiet {
        eprintln!("{} Target node in bootload mode", style("✓").green());
    }

    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(image.records.len() as u64);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    for (seq, record) in image.records.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)] // image fits in 31744 bytes
        send_record(&mut line, seq as u16, record, options, interrupted)?;
        pb.inc(1);
    }
    pb.finish_and_clear();

    handshake(&mut line, frame::EOF, options, interrupted)
        .context("target node did not confirm the end of transfer")?;

    if !cli.quiet {
        eprintln!(
            "{} Image delivered; the node is flashing and rebooting",
            style("✓").green().bold()
        );
    }
    Ok(())
}

/// Send `query` until the gateway echoes `FLX?OK`.
fn handshake(
    line: &mut impl SerialLine,
    query: &[u8],
    options: &UploadOptions,
    interrupted: &Arc<AtomicBool>,
) -> Result<()> {
    for attempt in 1..=options.retries {
        if interrupted.load(Ordering::Relaxed) {
            return Err(CliError::Cancelled.into());
        }
        debug!(
            "serial < {} (attempt {attempt})",
            String::from_utf8_lossy(query)
        );
        line.write_line(query)?;
        match read_reply(line, options.timeout)? {
            LineReply::Ok => return Ok(()),
            LineReply::Silence | LineReply::Noise => {},
            LineReply::Invalid | LineReply::ChunkOk(_) => {
                warn!("unexpected gateway reply to handshake");
            },
        }
    }
    Err(CliError::Transfer(format!(
        "no answer to {} after {} attempts",
        String::from_utf8_lossy(query),
        options.retries
    ))
    .into())
}

/// Send one record until its sequence number is echoed back.
fn send_record(
    line: &mut impl SerialLine,
    seq: u16,
    record: &[u8],
    options: &UploadOptions,
    interrupted: &Arc<AtomicBool>,
) -> Result<()> {
    let mut chunk = format!("FLX:{seq}:").into_bytes();
    chunk.extend_from_slice(record);

    let mut invalid = 0u32;
    for _ in 0..options.retries {
        if interrupted.load(Ordering::Relaxed) {
            return Err(CliError::Cancelled.into());
        }
        line.write_line(&chunk)?;
        match read_reply(line, options.ack_timeout)? {
            LineReply::ChunkOk(acked) if acked == seq => return Ok(()),
            LineReply::ChunkOk(acked) => {
                debug!("stale echo for record {acked}, expecting {seq}");
            },
            LineReply::Invalid => {
                // Validated locally before sending, so this is line noise.
                invalid += 1;
                warn!("gateway rejected record {seq} ({invalid})");
            },
            LineReply::Ok | LineReply::Noise | LineReply::Silence => {},
        }
    }
    Err(CliError::Transfer(format!(
        "record {seq} not acknowledged after {} attempts",
        options.retries
    ))
    .into())
}

/// Read and classify the gateway's next line.
fn read_reply(line: &mut impl SerialLine, timeout: Duration) -> Result<LineReply> {
    let Some(reply) = line.read_line(timeout)? else {
        return Ok(LineReply::Silence);
    };
    debug!("serial > {}", String::from_utf8_lossy(&reply));
    if reply == frame::INVALID {
        return Ok(LineReply::Invalid);
    }
    Ok(match Reply::parse(&reply) {
        Some(Reply::HandshakeOk) => LineReply::Ok,
        Some(Reply::ChunkOk { seq }) => LineReply::ChunkOk(seq),
        // Timeout notices and application chatter from the gateway.
        None => LineReply::Noise,
    })
}
