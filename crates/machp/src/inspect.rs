//! The per-file pipeline: container dispatch, slice decoding and report
//! aggregation.
//!
//! One owned buffer holds the file; each slice is decoded from a borrowed
//! subrange, strictly sequentially. The pipeline is reentrant and keeps
//! no global state, so callers may run many files in parallel.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::codesign::parse_code_signature;
use crate::entropy::shannon_entropy;
use crate::macho::{commands, fat, Container, DylibRef, FatArch, MachHeader};
use crate::macho::symtab::decode_symbols;
use crate::report::{FatArchReport, HeaderReport, Report, SliceReport};
use crate::reader::subrange;
use crate::{Error, Result};

/// Read and decode one file.
pub fn inspect_file(path: impl AsRef<Path>) -> Result<Report> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|_| Error::FileNotFound(path.to_path_buf()))?;
    inspect_bytes(&data, &path.display().to_string())
}

/// Decode an in-memory image. `file_path` only labels the report.
pub fn inspect_bytes(data: &[u8], file_path: &str) -> Result<Report> {
    log::debug!("inspecting {file_path} ({} bytes)", data.len());

    let mut report = Report {
        file_path: file_path.to_string(),
        file_size: data.len() as u64,
        entropy: shannon_entropy(data),
        fat: false,
        parsed: false,
        nfat_arch: None,
        archs: Vec::new(),
        slices: Vec::new(),
        header_slice: None,
        imported_symbols: None,
        exports: None,
        dylibs: None,
    };

    match fat::detect(data)? {
        Container::Thin => {
            let slice = decode_slice(data, 0, data.len() as u64, None)?;
            report.header_slice = Some(Box::new(slice));
        }
        Container::Fat { magic, archs } => {
            log::debug!("fat archive 0x{magic:08X} with {} entries", archs.len());
            report.fat = true;
            report.nfat_arch = Some(archs.len() as u32);
            for arch in &archs {
                report.archs.push(FatArchReport {
                    cputype: arch.cputype,
                    cpusubtype: arch.cpusubtype,
                    offset: arch.offset,
                    size: arch.size,
                    align: arch.align,
                    decoded: arch.is_abi64(),
                });
            }
            for arch in archs.iter().filter(|a| a.is_abi64()) {
                report.slices.push(decode_fat_slice(data, arch)?);
            }
            attach_unions(&mut report);
        }
    }

    report.parsed = true;
    Ok(report)
}

fn decode_fat_slice(data: &[u8], arch: &FatArch) -> Result<SliceReport> {
    // Ranges were validated by the fat dispatcher.
    let start = arch.offset as usize;
    let end = start + arch.size as usize;
    let slice = subrange(data, start, end)?;
    let mut report = decode_slice(slice, arch.offset, arch.size, Some(arch.align))?;
    report.cputype = arch.cputype;
    report.cpusubtype = arch.cpusubtype;
    Ok(report)
}

/// Run the thin-image pipeline over `slice` (the slice's own bytes).
fn decode_slice(slice: &[u8], offset: u64, size: u64, align: Option<u32>) -> Result<SliceReport> {
    let header = MachHeader::parse(slice, 0)?;
    let walked = commands::walk(slice, &header)?;

    let symbols = match &walked.symtab {
        Some(st) => decode_symbols(slice, st, header.endian())?,
        None => Default::default(),
    };

    let code_signature = match walked.code_signature {
        Some((dataoff, datasize)) => Some(parse_code_signature(
            slice,
            dataoff as usize,
            datasize as usize,
        )?),
        None => None,
    };

    let mut imported = symbols.imported;
    let mut exports = symbols.exported;
    imported.sort();
    exports.sort();

    let mut hasher = Sha256::new();
    hasher.update(slice);

    Ok(SliceReport {
        offset,
        size,
        cputype: header.cputype,
        cpusubtype: header.cpusubtype,
        align,
        sha256: hex::encode(hasher.finalize()),
        entropy: shannon_entropy(slice),
        header: HeaderReport {
            magic: header.magic,
            cputype: header.cputype,
            cpusubtype: header.cpusubtype,
            filetype: header.filetype,
            ncmds: header.ncmds,
            sizeofcmds: header.sizeofcmds,
            flags: header.flags,
            flags_decoded: header.flag_names().iter().map(|s| s.to_string()).collect(),
            reserved: header.reserved,
            big_endian: header.big_endian,
            load_commands: walked.records,
            code_signature,
        },
        dylibs: walked.dylibs,
        num_imported_symbols: imported.len(),
        imported_symbols: imported,
        num_exports: exports.len(),
        exports,
        symtab: walked.symtab,
        dysymtab: walked.dysymtab,
    })
}

/// Archive-level unions: sorted symbol sets, dylibs deduplicated by name
/// in first-seen order.
fn attach_unions(report: &mut Report) {
    let mut imported: Vec<String> = Vec::new();
    let mut exports: Vec<String> = Vec::new();
    let mut dylibs: Vec<DylibRef> = Vec::new();

    for slice in &report.slices {
        imported.extend(slice.imported_symbols.iter().cloned());
        exports.extend(slice.exports.iter().cloned());
        for dylib in &slice.dylibs {
            if !dylibs.iter().any(|d| d.name == dylib.name) {
                dylibs.push(dylib.clone());
            }
        }
    }

    imported.sort();
    imported.dedup();
    exports.sort();
    exports.dedup();

    report.imported_symbols = Some(imported);
    report.exports = Some(exports);
    report.dylibs = Some(dylibs);
}
