//! Fat-archive dispatch: the top-level container decision.
//!
//! The first four bytes, read big-endian, decide the shape of the file:
//! `0xCAFEBABE`/`0xCAFEBABF` open a fat index, the two 64-bit Mach-O
//! magics mark a thin image, anything else is not a Mach-O. Fat index
//! headers and entries are big-endian regardless of slice order.

use crate::macho::constants::{CPU_ARCH_ABI64, FAT_MAGIC, FAT_MAGIC_64, MH_CIGAM_64, MH_MAGIC_64};
use crate::reader::{read_u32, read_u64, Endian};
use crate::{Error, Result};

/// One entry of the fat index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatArch {
    pub cputype: u32,
    pub cpusubtype: u32,
    pub offset: u64,
    pub size: u64,
    pub align: u32,
}

impl FatArch {
    /// Whether the fat policy descends into this slice.
    pub fn is_abi64(&self) -> bool {
        self.cputype & CPU_ARCH_ABI64 != 0
    }
}

/// Decoded container shape of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    /// Fat archive: the raw magic and every enumerated entry.
    Fat { magic: u32, archs: Vec<FatArch> },
    /// A single thin 64-bit image spanning the whole file.
    Thin,
}

/// Classify `data` by its leading magic and, for fat input, decode the
/// arch index. Slice ranges are validated against the file length here so
/// the per-slice pipeline can trust them.
pub fn detect(data: &[u8]) -> Result<Container> {
    let magic = read_u32(data, 0, Endian::Big)
        .map_err(|_| Error::InvalidFormat("file is shorter than a magic number".into()))?;

    match magic {
        FAT_MAGIC | FAT_MAGIC_64 => {
            let archs = parse_fat_index(data, magic)?;
            Ok(Container::Fat { magic, archs })
        }
        // A little-endian thin file leads with CF FA ED FE, which is
        // MH_CIGAM_64 when read big-endian; a big-endian file the inverse.
        MH_MAGIC_64 | MH_CIGAM_64 => Ok(Container::Thin),
        other => Err(Error::InvalidFormat(format!(
            "unrecognized file magic 0x{other:08X}"
        ))),
    }
}

fn parse_fat_index(data: &[u8], magic: u32) -> Result<Vec<FatArch>> {
    let nfat_arch = read_u32(data, 4, Endian::Big)?;
    let wide = magic == FAT_MAGIC_64;
    let entry_size = if wide { 32 } else { 20 };

    let mut archs = Vec::with_capacity(nfat_arch.min(64) as usize);
    for i in 0..nfat_arch as usize {
        let off = 8 + i * entry_size;
        let arch = if wide {
            FatArch {
                cputype: read_u32(data, off, Endian::Big)?,
                cpusubtype: read_u32(data, off + 4, Endian::Big)?,
                offset: read_u64(data, off + 8, Endian::Big)?,
                size: read_u64(data, off + 16, Endian::Big)?,
                align: read_u32(data, off + 24, Endian::Big)?,
            }
        } else {
            FatArch {
                cputype: read_u32(data, off, Endian::Big)?,
                cpusubtype: read_u32(data, off + 4, Endian::Big)?,
                offset: u64::from(read_u32(data, off + 8, Endian::Big)?),
                size: u64::from(read_u32(data, off + 12, Endian::Big)?),
                align: read_u32(data, off + 16, Endian::Big)?,
            }
        };

        let end = arch.offset.checked_add(arch.size).ok_or_else(|| {
            Error::Parsing(format!("fat arch {i}: slice offset + size overflows"))
        })?;
        if end > data.len() as u64 {
            return Err(Error::Parsing(format!(
                "fat arch {i}: slice [{}, {end}) exceeds file of {} bytes",
                arch.offset,
                data.len()
            )));
        }
        archs.push(arch);
    }
    Ok(archs)
}
