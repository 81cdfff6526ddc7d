//! The typed report tree handed to the serializer.
//!
//! These are closed structs mirroring the output model: the external
//! serializer (serde_json in the CLI) renders them as pretty-printed
//! JSON with `snake_case` keys. Decoded domain values embed directly;
//! nothing here re-parses bytes.

use serde::Serialize;

use crate::codesign::CodeSignature;
use crate::macho::{DylibRef, DysymtabCommand, LoadCommandRecord, SymtabCommand};

/// Top-level report for one input file.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub file_path: String,
    pub file_size: u64,
    /// Shannon entropy of the whole file.
    pub entropy: f64,
    pub fat: bool,
    pub parsed: bool,
    /// Number of fat index entries, fat input only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nfat_arch: Option<u32>,
    /// Every enumerated fat entry, including skipped 32-bit slices.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub archs: Vec<FatArchReport>,
    /// Decoded 64-bit slices, fat input only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slices: Vec<SliceReport>,
    /// The single slice of a thin image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_slice: Option<Box<SliceReport>>,
    /// Union of imported symbols across slices, sorted. Fat input only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_symbols: Option<Vec<String>>,
    /// Union of exports across slices, sorted. Fat input only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exports: Option<Vec<String>>,
    /// Dylib references deduplicated by name, first-seen order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dylibs: Option<Vec<DylibRef>>,
}

impl Report {
    /// Number of decoded slices (one for thin input).
    pub fn slice_count(&self) -> usize {
        if self.header_slice.is_some() {
            1
        } else {
            self.slices.len()
        }
    }

    /// All decoded slices regardless of container shape.
    pub fn all_slices(&self) -> Vec<&SliceReport> {
        match &self.header_slice {
            Some(s) => vec![s.as_ref()],
            None => self.slices.iter().collect(),
        }
    }
}

/// One entry of the fat index, as enumerated.
#[derive(Debug, Clone, Serialize)]
pub struct FatArchReport {
    pub cputype: u32,
    pub cpusubtype: u32,
    pub offset: u64,
    pub size: u64,
    pub align: u32,
    /// Whether the ABI64 policy descended into this slice.
    pub decoded: bool,
}

/// One decoded 64-bit slice.
#[derive(Debug, Clone, Serialize)]
pub struct SliceReport {
    pub offset: u64,
    pub size: u64,
    pub cputype: u32,
    pub cpusubtype: u32,
    /// Fat-entry alignment; absent for thin input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<u32>,
    /// SHA-256 of the raw slice bytes, lowercase hex.
    pub sha256: String,
    /// Shannon entropy of the slice bytes.
    pub entropy: f64,
    pub header: HeaderReport,
    pub dylibs: Vec<DylibRef>,
    pub imported_symbols: Vec<String>,
    pub num_imported_symbols: usize,
    pub exports: Vec<String>,
    pub num_exports: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symtab: Option<SymtabCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dysymtab: Option<DysymtabCommand>,
}

/// Decoded header plus everything reached through its load commands.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderReport {
    pub magic: u32,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    /// Symbolic flag names in fixed table order.
    pub flags_decoded: Vec<String>,
    pub reserved: u32,
    pub big_endian: bool,
    pub load_commands: Vec<LoadCommandRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_signature: Option<CodeSignature>,
}
