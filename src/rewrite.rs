//! The `rewrite` command: parse a stream and serialize it back out.

use anyhow::{Context, Result};
use fragforge_media::{
    read_stream, write_stream, BoxReader, CountingWriter, FragmentOptions, TopLevel,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteOptions {
    pub fragment: FragmentOptions,
    /// Collapse uniform per-sample values into `tfhd` defaults
    pub set_sample_defaults: bool,
    /// Replace an existing output file
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteSummary {
    pub fragments: usize,
    pub passthrough: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Rewrite `input` into `output`.
///
/// The whole input is parsed before the output is created, so a malformed
/// input never leaves a partial output file behind.
pub fn rewrite_file(input: &Path, output: &Path, options: RewriteOptions) -> Result<RewriteSummary> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }
    if output.exists() && !options.overwrite {
        anyhow::bail!(
            "Output file already exists: {:?} (set output.overwrite in config to replace it)",
            output
        );
    }

    let file = File::open(input).with_context(|| format!("Failed to open {:?}", input))?;
    let mut reader = BoxReader::new(BufReader::new(file))?;
    let mut items = read_stream(&mut reader, options.fragment)
        .with_context(|| format!("Failed to parse {:?}", input))?;

    let file = File::create(output).with_context(|| format!("Failed to create {:?}", output))?;
    let mut writer = BufWriter::new(file);
    let bytes_out = write_items(&mut items, &mut writer, options)
        .with_context(|| format!("Failed to write {:?}", output))?;
    writer.flush()?;

    Ok(summarize(&items, reader.len(), bytes_out))
}

/// Rewrite between in-memory or already-open streams.
pub fn rewrite_stream<R: Read + Seek, W: Write>(
    reader: &mut BoxReader<R>,
    writer: &mut W,
    options: RewriteOptions,
) -> Result<RewriteSummary> {
    let mut items = read_stream(reader, options.fragment)?;
    let bytes_out = write_items(&mut items, writer, options)?;
    Ok(summarize(&items, reader.len(), bytes_out))
}

fn write_items<W: Write>(
    items: &mut [TopLevel],
    writer: &mut W,
    options: RewriteOptions,
) -> Result<u64> {
    let mut counter = CountingWriter::new(writer);
    write_stream(items, &mut counter, options.set_sample_defaults)?;
    Ok(counter.count())
}

fn summarize(items: &[TopLevel], bytes_in: u64, bytes_out: u64) -> RewriteSummary {
    let fragments = items
        .iter()
        .filter(|item| matches!(item, TopLevel::Fragment(_)))
        .count();
    tracing::debug!(
        "rewrote {} fragments and {} other atoms, {} -> {} bytes",
        fragments,
        items.len() - fragments,
        bytes_in,
        bytes_out
    );
    RewriteSummary {
        fragments,
        passthrough: items.len() - fragments,
        bytes_in,
        bytes_out,
    }
}
