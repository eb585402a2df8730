//! Box tree and sample table reports for the `inspect` command.

use anyhow::{Context, Result};
use fragforge_media::boxes::Payload;
use fragforge_media::stream::{read_atoms, split_fragments};
use fragforge_media::{Atom, AtomType, BoxReader, Fragment, FragmentOptions, TopLevel};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: String,
    pub file_size: u64,
    pub atoms: Vec<AtomReport>,
    pub fragments: Vec<FragmentReport>,
}

#[derive(Debug, Serialize)]
pub struct AtomReport {
    pub offset: u64,
    pub atom_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_type: Option<String>,
    pub size: u64,
    /// On-disk width of the size field (32 or 64)
    pub size_bits: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AtomReport>,
}

#[derive(Debug, Serialize)]
pub struct FragmentReport {
    pub offset: u64,
    pub sequence_number: u32,
    pub track_id: u32,
    pub base_media_decode_time: Option<u64>,
    pub data_offset: Option<i32>,
    pub samples: Vec<SampleReport>,
}

#[derive(Debug, Serialize)]
pub struct SampleReport {
    pub index: usize,
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
    pub is_sync: bool,
    pub composition_offset: Option<i32>,
}

/// Parse a file and describe every atom and fragment in it.
pub fn inspect_file(path: &Path, options: FragmentOptions) -> Result<FileReport> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut reader = BoxReader::new(BufReader::new(file))?;
    let mut report = inspect_reader(&mut reader, options)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    report.path = path.display().to_string();
    Ok(report)
}

pub fn inspect_reader<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    options: FragmentOptions,
) -> Result<FileReport> {
    let file_size = reader.len();
    let atoms = read_atoms(reader)?;

    let reports = atoms
        .iter()
        .map(|(offset, atom)| describe_atom(atom, *offset))
        .collect();
    let fragment_offsets: Vec<u64> = atoms
        .iter()
        .filter(|(_, atom)| atom.atom_type() == AtomType::MOOF)
        .map(|(offset, _)| *offset)
        .collect();

    let fragments = split_fragments(atoms, options)?
        .iter()
        .filter_map(|item| match item {
            TopLevel::Fragment(fragment) => Some(fragment),
            TopLevel::Atom(_) => None,
        })
        .zip(fragment_offsets)
        .map(|(fragment, offset)| describe_fragment(fragment, offset))
        .collect::<Result<Vec<_>>>()?;

    Ok(FileReport {
        path: String::new(),
        file_size,
        atoms: reports,
        fragments,
    })
}

fn describe_atom(atom: &Atom, offset: u64) -> AtomReport {
    let mut child_offset = offset + atom.header_size() + atom.payload().content_size();
    let children = atom
        .children()
        .iter()
        .map(|child| {
            let report = describe_atom(child, child_offset);
            child_offset += report.size;
            report
        })
        .collect();

    AtomReport {
        offset,
        atom_type: atom.atom_type().to_string(),
        extended_type: atom.extended_type().map(|uuid| uuid.to_string()),
        size: atom.compute_size(),
        size_bits: atom.size().bit_depth(),
        summary: summarize(atom),
        children,
    }
}

fn summarize(atom: &Atom) -> Option<String> {
    let summary = match atom.payload() {
        Payload::Container => return None,
        Payload::Opaque => format!(
            "{} bytes passed through",
            atom.body().map(|body| body.len()).unwrap_or(0)
        ),
        Payload::Mfhd(mfhd) => format!("sequence_number={}", mfhd.sequence_number),
        Payload::Tfhd(tfhd) => format!(
            "track_id={} flags={:#08x}",
            tfhd.track_id,
            tfhd.flags().bits()
        ),
        Payload::Trun(trun) => format!(
            "version={} samples={} data_offset={:?}",
            trun.version,
            trun.sample_count(),
            trun.data_offset
        ),
        Payload::Tfdt(tfdt) => format!(
            "version={} base_media_decode_time={}",
            tfdt.version(),
            tfdt.base_media_decode_time()
        ),
        Payload::Sdtp(sdtp) => format!("entries={}", sdtp.entries.len()),
        Payload::Tfxd(tfxd) => format!(
            "absolute_time={} duration={}",
            tfxd.fragment_absolute_time(),
            tfxd.fragment_duration()
        ),
        Payload::Mdat(mdat) => format!("{} bytes of sample data", mdat.data.len()),
        Payload::Mvhd(mvhd) => format!(
            "timescale={} duration={} next_track_id={}",
            mvhd.timescale, mvhd.duration, mvhd.next_track_id
        ),
        Payload::Tkhd(tkhd) => {
            let (width, height) = tkhd.dimensions();
            format!("track_id={} {}x{}", tkhd.track_id, width, height)
        }
        Payload::Trex(trex) => format!("track_id={}", trex.track_id),
        Payload::Hdlr(hdlr) => format!("handler={} name={:?}", hdlr.handler_type, hdlr.name()),
        Payload::Mdhd(mdhd) => format!(
            "timescale={} duration={} language={}",
            mdhd.timescale, mdhd.duration, mdhd.language
        ),
    };
    Some(summary)
}

fn describe_fragment(fragment: &Fragment, offset: u64) -> Result<FragmentReport> {
    let trun = fragment.trun()?;
    let mut samples = Vec::with_capacity(trun.sample_count());
    for (index, sample) in fragment.samples()?.enumerate() {
        let sample = sample?;
        samples.push(SampleReport {
            index,
            duration: sample.duration,
            size: sample.size,
            flags: sample.flags,
            is_sync: sample.is_sync(),
            composition_offset: sample.composition_offset,
        });
    }

    Ok(FragmentReport {
        offset,
        sequence_number: fragment.sequence_number()?,
        track_id: fragment.tfhd()?.track_id,
        base_media_decode_time: fragment.tfdt().map(|tfdt| tfdt.base_media_decode_time()),
        data_offset: trun.data_offset,
        samples,
    })
}

/// Print a report as an indented tree followed by per-fragment sample tables.
pub fn print_report(report: &FileReport) {
    println!("File: {}", report.path);
    println!("Size: {} bytes", report.file_size);
    println!();
    for atom in &report.atoms {
        print_atom(atom, 0);
    }

    for fragment in &report.fragments {
        println!();
        println!(
            "Fragment #{} at {} (track {}, {} samples)",
            fragment.sequence_number,
            fragment.offset,
            fragment.track_id,
            fragment.samples.len()
        );
        if let Some(time) = fragment.base_media_decode_time {
            println!("  base_media_decode_time: {}", time);
        }
        if let Some(data_offset) = fragment.data_offset {
            println!("  data_offset: {}", data_offset);
        }
        for sample in &fragment.samples {
            print!(
                "  [{}] duration={} size={} flags={:#010x}",
                sample.index, sample.duration, sample.size, sample.flags
            );
            if let Some(offset) = sample.composition_offset {
                print!(" cts={}", offset);
            }
            if sample.is_sync {
                print!(" [sync]");
            }
            println!();
        }
    }
}

fn print_atom(atom: &AtomReport, depth: usize) {
    print!("{:indent$}{} @{} ({} bytes", "", atom.atom_type, atom.offset, atom.size, indent = depth * 2);
    if atom.size_bits == 64 {
        print!(", 64-bit size");
    }
    print!(")");
    if let Some(ref extended_type) = atom.extended_type {
        print!(" {}", extended_type);
    }
    if let Some(ref summary) = atom.summary {
        print!(" {}", summary);
    }
    println!();
    for child in &atom.children {
        print_atom(child, depth + 1);
    }
}
