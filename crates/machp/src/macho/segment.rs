//! `LC_SEGMENT_64` and section decoding.
//!
//! A segment command is a 72-byte header followed by `nsects` 80-byte
//! section records, all inside the command's `cmdsize`. Segments with
//! file-backed content additionally carry the Shannon entropy of their
//! `[fileoff, fileoff + filesize)` range.

use crate::entropy::shannon_entropy;
use crate::macho::constants::{SECTION_64_SIZE, SEGMENT_64_CMD_SIZE};
use crate::reader::{read_fixed_ascii, read_i32, read_u32, read_u64, Endian};
use crate::{Error, Result};
use serde::Serialize;

/// Decoded 80-byte section record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section64 {
    pub sectname: String,
    pub segname: String,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: u32,
}

/// Decoded `LC_SEGMENT_64` payload with its sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment64 {
    pub segname: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: i32,
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
    pub sections: Vec<Section64>,
    /// Entropy of the file-backed range, when one exists inside the slice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
}

/// Minimal decode of a 32-bit `LC_SEGMENT` (56-byte header). These only
/// occur in slices the fat policy would normally skip; sections are not
/// walked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment32 {
    pub segname: String,
    pub vmaddr: u32,
    pub vmsize: u32,
    pub fileoff: u32,
    pub filesize: u32,
    pub maxprot: i32,
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
}

impl Segment64 {
    /// Decode the segment command at `cmd_offset` within `data` (the
    /// slice bytes). `cmdsize` bounds the section array.
    pub fn parse(data: &[u8], cmd_offset: usize, cmdsize: usize, endian: Endian) -> Result<Self> {
        if cmdsize < SEGMENT_64_CMD_SIZE {
            return Err(Error::Parsing(format!(
                "LC_SEGMENT_64 at offset {cmd_offset}: cmdsize {cmdsize} below minimum {SEGMENT_64_CMD_SIZE}"
            )));
        }

        let segname = read_fixed_ascii(data, cmd_offset + 8, 16)?;
        let vmaddr = read_u64(data, cmd_offset + 24, endian)?;
        let vmsize = read_u64(data, cmd_offset + 32, endian)?;
        let fileoff = read_u64(data, cmd_offset + 40, endian)?;
        let filesize = read_u64(data, cmd_offset + 48, endian)?;
        let maxprot = read_i32(data, cmd_offset + 56, endian)?;
        let initprot = read_i32(data, cmd_offset + 60, endian)?;
        let nsects = read_u32(data, cmd_offset + 64, endian)?;
        let flags = read_u32(data, cmd_offset + 68, endian)?;

        let sect_bytes = (nsects as usize)
            .checked_mul(SECTION_64_SIZE)
            .ok_or_else(|| {
                Error::Parsing(format!(
                    "LC_SEGMENT_64 \"{segname}\" at offset {cmd_offset}: nsects {nsects} overflows"
                ))
            })?;
        if SEGMENT_64_CMD_SIZE + sect_bytes > cmdsize {
            return Err(Error::Parsing(format!(
                "LC_SEGMENT_64 \"{segname}\" at offset {cmd_offset}: {nsects} sections \
                 do not fit in cmdsize {cmdsize}"
            )));
        }

        let mut sections = Vec::with_capacity(nsects as usize);
        for i in 0..nsects as usize {
            let off = cmd_offset + SEGMENT_64_CMD_SIZE + i * SECTION_64_SIZE;
            sections.push(Section64 {
                sectname: read_fixed_ascii(data, off, 16)?,
                segname: read_fixed_ascii(data, off + 16, 16)?,
                addr: read_u64(data, off + 32, endian)?,
                size: read_u64(data, off + 40, endian)?,
                offset: read_u32(data, off + 48, endian)?,
                align: read_u32(data, off + 52, endian)?,
                reloff: read_u32(data, off + 56, endian)?,
                nreloc: read_u32(data, off + 60, endian)?,
                flags: read_u32(data, off + 64, endian)?,
                reserved1: read_u32(data, off + 68, endian)?,
                reserved2: read_u32(data, off + 72, endian)?,
                reserved3: read_u32(data, off + 76, endian)?,
            });
        }

        let entropy = file_range_entropy(data, fileoff, filesize);

        Ok(Self {
            segname,
            vmaddr,
            vmsize,
            fileoff,
            filesize,
            maxprot,
            initprot,
            nsects,
            flags,
            sections,
            entropy,
        })
    }
}

impl Segment32 {
    pub fn parse(data: &[u8], cmd_offset: usize, cmdsize: usize, endian: Endian) -> Result<Self> {
        if cmdsize < 56 {
            return Err(Error::Parsing(format!(
                "LC_SEGMENT at offset {cmd_offset}: cmdsize {cmdsize} below minimum 56"
            )));
        }
        Ok(Self {
            segname: read_fixed_ascii(data, cmd_offset + 8, 16)?,
            vmaddr: read_u32(data, cmd_offset + 24, endian)?,
            vmsize: read_u32(data, cmd_offset + 28, endian)?,
            fileoff: read_u32(data, cmd_offset + 32, endian)?,
            filesize: read_u32(data, cmd_offset + 36, endian)?,
            maxprot: read_i32(data, cmd_offset + 40, endian)?,
            initprot: read_i32(data, cmd_offset + 44, endian)?,
            nsects: read_u32(data, cmd_offset + 48, endian)?,
            flags: read_u32(data, cmd_offset + 52, endian)?,
        })
    }
}

/// Entropy of `[fileoff, fileoff + filesize)` when the range is non-empty
/// and lies inside the slice; `None` otherwise.
fn file_range_entropy(data: &[u8], fileoff: u64, filesize: u64) -> Option<f64> {
    if filesize == 0 {
        return None;
    }
    let start = usize::try_from(fileoff).ok()?;
    let end = start.checked_add(usize::try_from(filesize).ok()?)?;
    if end > data.len() {
        return None;
    }
    Some(shannon_entropy(&data[start..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push32(buf: &mut Vec<u8>, v: u32) {
        buf.extend(v.to_le_bytes());
    }

    fn push64(buf: &mut Vec<u8>, v: u64) {
        buf.extend(v.to_le_bytes());
    }

    fn segment_cmd(nsects: u32, fileoff: u64, filesize: u64) -> Vec<u8> {
        let cmdsize = 72 + nsects * 80;
        let mut buf = Vec::new();
        push32(&mut buf, 0x19);
        push32(&mut buf, cmdsize);
        buf.extend_from_slice(b"__TEXT\0\0\0\0\0\0\0\0\0\0");
        push64(&mut buf, 0x100000000);
        push64(&mut buf, 0x4000);
        push64(&mut buf, fileoff);
        push64(&mut buf, filesize);
        push32(&mut buf, 5); // maxprot
        push32(&mut buf, 5); // initprot
        push32(&mut buf, nsects);
        push32(&mut buf, 0);
        for i in 0..nsects {
            buf.extend_from_slice(b"__text\0\0\0\0\0\0\0\0\0\0");
            buf.extend_from_slice(b"__TEXT\0\0\0\0\0\0\0\0\0\0");
            push64(&mut buf, 0x100001000 + u64::from(i));
            push64(&mut buf, 0x100);
            push32(&mut buf, 0x1000);
            push32(&mut buf, 4);
            push32(&mut buf, 0);
            push32(&mut buf, 0);
            push32(&mut buf, 0x80000400);
            push32(&mut buf, 0);
            push32(&mut buf, 0);
            push32(&mut buf, 0);
        }
        buf
    }

    #[test]
    fn test_parse_segment_with_sections() {
        let buf = segment_cmd(2, 0, 0);
        let seg = Segment64::parse(&buf, 0, buf.len(), Endian::Little).unwrap();
        assert_eq!(seg.segname, "__TEXT");
        assert_eq!(seg.vmaddr, 0x100000000);
        assert_eq!(seg.nsects, 2);
        assert_eq!(seg.sections.len(), 2);
        assert_eq!(seg.sections[0].sectname, "__text");
        assert_eq!(seg.sections[1].addr, 0x100001001);
        assert_eq!(seg.sections[0].flags, 0x80000400);
        assert!(seg.entropy.is_none());
    }

    #[test]
    fn test_sections_must_fit_cmdsize() {
        let buf = segment_cmd(2, 0, 0);
        // Lie: declare a cmdsize that only covers one section.
        let err = Segment64::parse(&buf, 0, 72 + 80, Endian::Little).unwrap_err();
        assert!(matches!(err, Error::Parsing(_)));
    }

    #[test]
    fn test_entropy_attached_for_file_backed_range() {
        let mut buf = segment_cmd(0, 72, 256);
        buf.extend((0..=255u8).collect::<Vec<_>>());
        let seg = Segment64::parse(&buf, 0, 72, Endian::Little).unwrap();
        let h = seg.entropy.expect("entropy for file-backed segment");
        assert!((h - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_skipped_when_range_escapes_slice() {
        let buf = segment_cmd(0, 0x10000, 0x1000);
        let seg = Segment64::parse(&buf, 0, 72, Endian::Little).unwrap();
        assert!(seg.entropy.is_none());
    }

    #[test]
    fn test_segment32_minimal_decode() {
        let mut buf = Vec::new();
        push32(&mut buf, 0x1);
        push32(&mut buf, 56);
        buf.extend_from_slice(b"__DATA\0\0\0\0\0\0\0\0\0\0");
        for v in [0x4000u32, 0x1000, 0x2000, 0x1000, 3, 3, 0, 0] {
            push32(&mut buf, v);
        }
        let seg = Segment32::parse(&buf, 0, 56, Endian::Little).unwrap();
        assert_eq!(seg.segname, "__DATA");
        assert_eq!(seg.vmaddr, 0x4000);
        assert_eq!(seg.nsects, 0);
    }
}
