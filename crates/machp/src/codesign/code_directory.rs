//! CodeDirectory blob decoding.
//!
//! The CodeDirectory carries the page hashes and identity of a signed
//! image. This decoder reads the fixed 44-byte header, the special-slot
//! hashes preceding `hashOffset`, and the NUL-terminated identifier, and
//! computes the SHA-1 `cdhash` over the blob exactly as stored.

use crate::codesign::constants::{special_slot_label, CODEDIRECTORY_HEADER_SIZE, NOT_BOUND};
use crate::reader::{read_cstr, read_u32, read_u8, Endian};
use crate::{Error, Result};
use serde::Serialize;
use sha1::{Digest, Sha1};

/// One special-slot hash with its assigned label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecialSlot {
    pub index: u32,
    pub label: String,
    /// Lowercase hex, or `Not Bound` for an all-zero hash.
    pub hash: String,
}

/// Decoded CodeDirectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeDirectoryInfo {
    pub ident: String,
    pub version: u32,
    pub flags: u32,
    pub hash_offset: u32,
    pub n_special_slots: u32,
    pub n_code_slots: u32,
    pub code_limit: u32,
    pub hash_size: u8,
    pub hash_type: u8,
    pub platform: u8,
    pub page_size: u8,
    /// SHA-1 of the entire blob as stored, lowercase hex.
    pub cd_hash: String,
    pub special_slots: Vec<SpecialSlot>,
}

/// Decode a CodeDirectory blob. `blob` spans the whole blob including its
/// 8-byte header; integers are big-endian.
pub fn parse_code_directory(blob: &[u8]) -> Result<CodeDirectoryInfo> {
    if blob.len() < CODEDIRECTORY_HEADER_SIZE {
        return Err(Error::Parsing(format!(
            "CodeDirectory: {} bytes is shorter than the {CODEDIRECTORY_HEADER_SIZE}-byte header",
            blob.len()
        )));
    }

    let version = read_u32(blob, 8, Endian::Big)?;
    let flags = read_u32(blob, 12, Endian::Big)?;
    let hash_offset = read_u32(blob, 16, Endian::Big)?;
    let ident_offset = read_u32(blob, 20, Endian::Big)?;
    let n_special_slots = read_u32(blob, 24, Endian::Big)?;
    let n_code_slots = read_u32(blob, 28, Endian::Big)?;
    let code_limit = read_u32(blob, 32, Endian::Big)?;
    let hash_size = read_u8(blob, 36)?;
    let hash_type = read_u8(blob, 37)?;
    let platform = read_u8(blob, 38)?;
    let page_size = read_u8(blob, 39)?;

    let ident = read_cstr(blob, ident_offset as usize, blob.len())
        .map_err(|_| {
            Error::Parsing(format!(
                "CodeDirectory: identifier offset {ident_offset} outside blob of {} bytes",
                blob.len()
            ))
        })?
        .unwrap_or_default();

    let special_slots = read_special_slots(blob, hash_offset, n_special_slots, hash_size)?;

    let mut hasher = Sha1::new();
    hasher.update(blob);
    let cd_hash = hex::encode(hasher.finalize());

    Ok(CodeDirectoryInfo {
        ident,
        version,
        flags,
        hash_offset,
        n_special_slots,
        n_code_slots,
        code_limit,
        hash_size,
        hash_type,
        platform,
        page_size,
        cd_hash,
        special_slots,
    })
}

/// The `n` special-slot hashes immediately precede `hash_offset`, stored
/// contiguously; labels are assigned by forward index.
fn read_special_slots(
    blob: &[u8],
    hash_offset: u32,
    n_special_slots: u32,
    hash_size: u8,
) -> Result<Vec<SpecialSlot>> {
    if n_special_slots == 0 {
        return Ok(Vec::new());
    }
    let hash_size = hash_size as usize;
    let total = (n_special_slots as usize)
        .checked_mul(hash_size)
        .ok_or_else(|| Error::Parsing("CodeDirectory: special slot count overflows".into()))?;
    let start = (hash_offset as usize).checked_sub(total).ok_or_else(|| {
        Error::Parsing(format!(
            "CodeDirectory: {n_special_slots} special slots precede hashOffset {hash_offset}"
        ))
    })?;
    if (hash_offset as usize) > blob.len() {
        return Err(Error::Parsing(format!(
            "CodeDirectory: hashOffset {hash_offset} outside blob of {} bytes",
            blob.len()
        )));
    }

    let mut slots = Vec::with_capacity(n_special_slots as usize);
    for i in 0..n_special_slots as usize {
        let off = start + i * hash_size;
        let raw = &blob[off..off + hash_size];
        let hash = if raw.iter().all(|&b| b == 0) {
            NOT_BOUND.to_string()
        } else {
            hex::encode(raw)
        };
        slots.push(SpecialSlot {
            index: i as u32,
            label: special_slot_label(i),
            hash,
        });
    }
    Ok(slots)
}

/// Test helper: a minimal valid CodeDirectory blob with the given
/// identifier, shared with the super-blob tests.
#[cfg(test)]
pub(crate) fn tests_build_cd_for_superblob(ident: &str) -> Vec<u8> {
    tests::build_cd(ident, &[], 1)
}
