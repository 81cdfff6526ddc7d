//! Embedded code-signature decoding.
//!
//! The signature region referenced by `LC_CODE_SIGNATURE` is a SuperBlob:
//! a 12-byte header `(magic, length, count)` followed by `count` index
//! entries `(slot_type, offset)` pointing at sub-blobs, each of which
//! opens with its own `(magic, length)` header. Every integer in this
//! format is big-endian regardless of the slice's byte order.
//!
//! Dispatch is on the sub-blob magic, not the index slot type: slot
//! numbers are an untrustworthy hint, while the magic at the blob head is
//! self-describing.

pub mod cms;
pub mod code_directory;
pub mod constants;
pub mod der;
pub mod entitlements;
pub mod requirements;

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;

use crate::reader::{read_u32, subrange, Endian};
use crate::{Error, Result};
use self::constants::*;

pub use self::cms::cms_certificate_subjects;
pub use self::code_directory::{parse_code_directory, CodeDirectoryInfo, SpecialSlot};
pub use self::der::der_entitlement_keys;
pub use self::entitlements::xml_entitlement_keys;
pub use self::requirements::requirement_summary;

/// Everything decoded from one embedded signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodeSignature {
    pub magic: u32,
    pub length: u32,
    pub count: u32,
    /// The first CodeDirectory in index order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_directory: Option<CodeDirectoryInfo>,
    /// Further CodeDirectories (alternate digests), in index order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternate_code_directories: Vec<CodeDirectoryInfo>,
    /// Sorted top-level keys of the XML entitlements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entitlements_keys: Option<Vec<String>>,
    /// DER entitlement keys in document order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub der_entitlements_keys: Option<Vec<String>>,
    /// Printable fragments of the designated requirement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    /// Certificate subject summaries from the CMS wrapper.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificates: Option<Vec<String>>,
    /// Unrecognized sub-blobs: `0xXXXXXXXX` magic -> base64 payload.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub other_blobs: BTreeMap<String, String>,
}

/// Decode the code-signature region `[cs_offset, cs_offset + cs_size)` of
/// a slice.
pub fn parse_code_signature(data: &[u8], cs_offset: usize, cs_size: usize) -> Result<CodeSignature> {
    let region_end = cs_offset
        .checked_add(cs_size)
        .ok_or_else(|| Error::Parsing("code signature: offset + size overflows".into()))?;
    let region = subrange(data, cs_offset, region_end).map_err(|_| {
        Error::Parsing(format!(
            "code signature region [{cs_offset}, {region_end}) exceeds slice of {} bytes",
            data.len()
        ))
    })?;

    let magic = read_u32(region, 0, Endian::Big)?;
    if magic != CSMAGIC_EMBEDDED_SIGNATURE && magic != CSMAGIC_DETACHED_SIGNATURE {
        return Err(Error::InvalidFormat(format!(
            "unknown code-signature super-blob magic 0x{magic:08X}"
        )));
    }
    let length = read_u32(region, 4, Endian::Big)?;
    let count = read_u32(region, 8, Endian::Big)?;

    let mut sig = CodeSignature {
        magic,
        length,
        count,
        ..Default::default()
    };

    for i in 0..count as usize {
        let entry = SUPERBLOB_HEADER_SIZE + i * INDEX_ENTRY_SIZE;
        let slot_type = read_u32(region, entry, Endian::Big).map_err(|_| {
            Error::Parsing(format!("code signature: index entry {i} is truncated"))
        })?;
        let blob_offset = read_u32(region, entry + 4, Endian::Big)? as usize;

        let blob = read_blob(region, i, blob_offset)?;
        log::debug!(
            "code signature blob {i}: slot 0x{slot_type:X}, magic 0x{:08X}, {} bytes",
            blob.magic,
            blob.bytes.len()
        );
        decode_blob(&mut sig, &blob)?;
    }

    Ok(sig)
}

struct Blob<'a> {
    magic: u32,
    /// Entire blob including its 8-byte header.
    bytes: &'a [u8],
}

impl Blob<'_> {
    fn payload(&self) -> &[u8] {
        &self.bytes[BLOB_HEADER_SIZE..]
    }
}

fn read_blob<'a>(region: &'a [u8], index: usize, blob_offset: usize) -> Result<Blob<'a>> {
    let magic = read_u32(region, blob_offset, Endian::Big).map_err(|_| {
        Error::Parsing(format!(
            "code signature blob {index}: header at offset {blob_offset} out of bounds"
        ))
    })?;
    let blob_length = read_u32(region, blob_offset + 4, Endian::Big)? as usize;
    if blob_length < BLOB_HEADER_SIZE {
        return Err(Error::Parsing(format!(
            "code signature blob {index}: length {blob_length} below blob header size"
        )));
    }
    let end = blob_offset.checked_add(blob_length).ok_or_else(|| {
        Error::Parsing(format!("code signature blob {index}: length overflows"))
    })?;
    if end > region.len() {
        return Err(Error::Parsing(format!(
            "code signature blob {index}: [{blob_offset}, {end}) exceeds the signature region"
        )));
    }
    Ok(Blob {
        magic,
        bytes: &region[blob_offset..end],
    })
}

fn decode_blob(sig: &mut CodeSignature, blob: &Blob<'_>) -> Result<()> {
    match blob.magic {
        CSMAGIC_CODEDIRECTORY => {
            let cd = parse_code_directory(blob.bytes)?;
            if sig.code_directory.is_none() {
                sig.code_directory = Some(cd);
            } else {
                sig.alternate_code_directories.push(cd);
            }
        }
        CSMAGIC_EMBEDDED_ENTITLEMENTS => {
            if sig.entitlements_keys.is_none() {
                sig.entitlements_keys = Some(xml_entitlement_keys(blob.payload())?);
            }
        }
        CSMAGIC_EMBEDDED_DER_ENTITLEMENTS => {
            if sig.der_entitlements_keys.is_none() {
                sig.der_entitlements_keys = Some(der_entitlement_keys(blob.payload()));
            }
        }
        CSMAGIC_REQUIREMENT | CSMAGIC_REQUIREMENTS => {
            if sig.requirements.is_none() {
                sig.requirements = Some(requirement_summary(blob.payload()));
            }
        }
        CSMAGIC_BLOBWRAPPER => {
            if sig.certificates.is_none() {
                sig.certificates = Some(cms_certificate_subjects(blob.payload()));
            }
        }
        other => {
            sig.other_blobs.insert(
                format!("0x{other:08X}"),
                BASE64.encode(blob.payload()),
            );
        }
    }
    Ok(())
}
