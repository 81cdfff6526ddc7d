//! Load-command walking and per-command decoding.
//!
//! The walker iterates exactly `ncmds` records starting at header + 32,
//! reading `(cmd, cmdsize)` in slice endianness and dispatching on the
//! command code. A `cmdsize` below 8, or one that pushes the cursor past
//! the command region or the slice, is fatal for the file.

use crate::macho::constants::*;
use crate::macho::header::MachHeader;
use crate::macho::segment::{Segment32, Segment64};
use crate::macho::symtab::{DysymtabCommand, SymtabCommand};
use crate::reader::{read_cstr, read_u32, Endian};
use crate::{Error, Result};
use serde::Serialize;

/// A dylib reference projected out of a dylib-like load command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DylibRef {
    pub name: String,
    pub timestamp: u32,
    /// Rendered `major.minor.patch`.
    pub current_version: String,
    pub compatibility_version: String,
}

/// Typed payload of one decoded load command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandDetail {
    Segment64(Segment64),
    Segment32(Segment32),
    Symtab(SymtabCommand),
    Dysymtab(DysymtabCommand),
    Dylib(DylibRef),
    Dylinker { name: String },
    Thread,
    Fvmlib { name: String, minor_version: u32, header_addr: u32 },
    FvmFile { name: String, header_addr: u32 },
    Ident { text: String },
    Prepage,
    CodeSignature { dataoff: u32, datasize: u32 },
    Unknown,
}

/// One walked load command: identity plus decoded payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadCommandRecord {
    pub index: u32,
    pub cmd: u32,
    pub cmdsize: u32,
    /// Offset of the command within the slice.
    pub offset: usize,
    /// Mnemonic, or `Unknown (0x........)`.
    pub name: String,
    pub detail: CommandDetail,
}

/// Everything the walker collects from one slice.
#[derive(Debug, Default, Clone)]
pub struct LoadCommands {
    pub records: Vec<LoadCommandRecord>,
    pub segments: Vec<Segment64>,
    pub dylibs: Vec<DylibRef>,
    pub symtab: Option<SymtabCommand>,
    pub dysymtab: Option<DysymtabCommand>,
    pub code_signature: Option<(u32, u32)>,
}

/// Render a packed Mach-O version as `major.minor.patch`.
pub fn format_version(v: u32) -> String {
    format!("{}.{}.{}", (v >> 16) & 0xFFFF, (v >> 8) & 0xFF, v & 0xFF)
}

fn command_name(cmd: u32) -> String {
    let name = match cmd {
        LC_SEGMENT => "LC_SEGMENT",
        LC_SYMTAB => "LC_SYMTAB",
        LC_THREAD => "LC_THREAD",
        LC_UNIXTHREAD => "LC_UNIXTHREAD",
        LC_LOADFVMLIB => "LC_LOADFVMLIB",
        LC_IDFVMLIB => "LC_IDFVMLIB",
        LC_IDENT => "LC_IDENT",
        LC_FVMFILE => "LC_FVMFILE",
        LC_PREPAGE => "LC_PREPAGE",
        LC_DYSYMTAB => "LC_DYSYMTAB",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
        LC_ID_DYLIB => "LC_ID_DYLIB",
        LC_LOAD_DYLINKER => "LC_LOAD_DYLINKER",
        LC_ID_DYLINKER => "LC_ID_DYLINKER",
        LC_LOAD_WEAK_DYLIB => "LC_LOAD_WEAK_DYLIB",
        LC_SEGMENT_64 => "LC_SEGMENT_64",
        LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE",
        LC_REEXPORT_DYLIB => "LC_REEXPORT_DYLIB",
        LC_LAZY_LOAD_DYLIB => "LC_LAZY_LOAD_DYLIB",
        LC_LOAD_UPWARD_DYLIB => "LC_LOAD_UPWARD_DYLIB",
        _ => return format!("Unknown (0x{cmd:08X})"),
    };
    name.to_string()
}

fn is_dylib_load(cmd: u32) -> bool {
    matches!(
        cmd,
        LC_LOAD_DYLIB | LC_LOAD_WEAK_DYLIB | LC_REEXPORT_DYLIB | LC_LAZY_LOAD_DYLIB
            | LC_LOAD_UPWARD_DYLIB
    )
}

/// Read the trailing name of a name-offset command: bytes from
/// `cmd_offset + name_offset` up to the end of the command, NULs and
/// control characters stripped.
fn read_trailing_name(
    data: &[u8],
    cmd_offset: usize,
    cmdsize: usize,
    name_offset: usize,
) -> Result<String> {
    if name_offset < 8 || name_offset > cmdsize {
        return Err(Error::Parsing(format!(
            "load command at offset {cmd_offset}: name offset {name_offset} \
             outside cmdsize {cmdsize}"
        )));
    }
    let start = cmd_offset + name_offset;
    let end = cmd_offset + cmdsize;
    if end > data.len() {
        return Err(Error::Parsing(format!(
            "load command at offset {cmd_offset}: name runs past the slice"
        )));
    }
    let raw: String = data[start..end]
        .iter()
        .take_while(|&&b| b != 0)
        .filter(|b| !b.is_ascii_control())
        .map(|&b| b as char)
        .collect();
    Ok(raw)
}

fn parse_dylib(data: &[u8], cmd_offset: usize, cmdsize: usize, endian: Endian) -> Result<DylibRef> {
    let name_offset = read_u32(data, cmd_offset + 8, endian)? as usize;
    let timestamp = read_u32(data, cmd_offset + 12, endian)?;
    let current = read_u32(data, cmd_offset + 16, endian)?;
    let compat = read_u32(data, cmd_offset + 20, endian)?;
    Ok(DylibRef {
        name: read_trailing_name(data, cmd_offset, cmdsize, name_offset)?,
        timestamp,
        current_version: format_version(current),
        compatibility_version: format_version(compat),
    })
}

/// Walk all load commands of the slice whose header is `header`.
///
/// `data` is the slice bytes; the walk starts at offset 32 and must stay
/// within `32 + sizeofcmds` and within the slice.
pub fn walk(data: &[u8], header: &MachHeader) -> Result<LoadCommands> {
    let endian = header.endian();
    let cmds_end = MACH_HEADER_64_SIZE
        .checked_add(header.sizeofcmds as usize)
        .ok_or_else(|| Error::Parsing("sizeofcmds overflows the slice".into()))?;
    if cmds_end > data.len() {
        return Err(Error::Parsing(format!(
            "load commands: sizeofcmds {} exceeds slice of {} bytes",
            header.sizeofcmds,
            data.len()
        )));
    }

    let mut out = LoadCommands::default();
    let mut cursor = MACH_HEADER_64_SIZE;

    for index in 0..header.ncmds {
        let cmd = read_u32(data, cursor, endian).map_err(|_| {
            Error::Parsing(format!(
                "load command {index} at offset {cursor}: truncated header"
            ))
        })?;
        let cmdsize = read_u32(data, cursor + 4, endian)? as usize;
        if cmdsize < 8 {
            return Err(Error::Parsing(format!(
                "load command {index} at offset {cursor}: cmdsize {cmdsize} below minimum 8"
            )));
        }
        let next = cursor.checked_add(cmdsize).ok_or_else(|| {
            Error::Parsing(format!(
                "load command {index} at offset {cursor}: cmdsize {cmdsize} overflows"
            ))
        })?;
        if next > cmds_end || next > data.len() {
            return Err(Error::Parsing(format!(
                "load command {index} at offset {cursor}: cmdsize {cmdsize} \
                 runs past the command region"
            )));
        }

        let detail = decode_one(data, cursor, cmd, cmdsize, endian, &mut out)?;
        out.records.push(LoadCommandRecord {
            index,
            cmd,
            cmdsize: cmdsize as u32,
            offset: cursor,
            name: command_name(cmd),
            detail,
        });
        cursor = next;
    }

    Ok(out)
}

fn decode_one(
    data: &[u8],
    cursor: usize,
    cmd: u32,
    cmdsize: usize,
    endian: Endian,
    out: &mut LoadCommands,
) -> Result<CommandDetail> {
    let detail = match cmd {
        LC_SEGMENT_64 => {
            let seg = Segment64::parse(data, cursor, cmdsize, endian)?;
            out.segments.push(seg.clone());
            CommandDetail::Segment64(seg)
        }
        LC_SEGMENT => CommandDetail::Segment32(Segment32::parse(data, cursor, cmdsize, endian)?),
        LC_SYMTAB => {
            let st = SymtabCommand::parse(data, cursor, endian)?;
            out.symtab = Some(st);
            CommandDetail::Symtab(st)
        }
        LC_DYSYMTAB => {
            let dt = DysymtabCommand::parse(data, cursor, endian)?;
            out.dysymtab = Some(dt);
            CommandDetail::Dysymtab(dt)
        }
        LC_THREAD | LC_UNIXTHREAD => CommandDetail::Thread,
        LC_LOADFVMLIB | LC_IDFVMLIB => {
            let name_offset = read_u32(data, cursor + 8, endian)? as usize;
            CommandDetail::Fvmlib {
                minor_version: read_u32(data, cursor + 12, endian)?,
                header_addr: read_u32(data, cursor + 16, endian)?,
                name: read_trailing_name(data, cursor, cmdsize, name_offset)?,
            }
        }
        LC_IDENT => {
            let text = read_cstr(data, cursor + 8, cursor + cmdsize)?.unwrap_or_default();
            CommandDetail::Ident { text }
        }
        LC_FVMFILE => {
            let name_offset = read_u32(data, cursor + 8, endian)? as usize;
            CommandDetail::FvmFile {
                header_addr: read_u32(data, cursor + 12, endian)?,
                name: read_trailing_name(data, cursor, cmdsize, name_offset)?,
            }
        }
        LC_PREPAGE => CommandDetail::Prepage,
        LC_ID_DYLIB => CommandDetail::Dylib(parse_dylib(data, cursor, cmdsize, endian)?),
        LC_LOAD_DYLINKER | LC_ID_DYLINKER => {
            let name_offset = read_u32(data, cursor + 8, endian)? as usize;
            CommandDetail::Dylinker {
                name: read_trailing_name(data, cursor, cmdsize, name_offset)?,
            }
        }
        LC_CODE_SIGNATURE => {
            let dataoff = read_u32(data, cursor + 8, endian)?;
            let datasize = read_u32(data, cursor + 12, endian)?;
            out.code_signature = Some((dataoff, datasize));
            CommandDetail::CodeSignature { dataoff, datasize }
        }
        c if is_dylib_load(c) => {
            let dylib = parse_dylib(data, cursor, cmdsize, endian)?;
            out.dylibs.push(dylib.clone());
            CommandDetail::Dylib(dylib)
        }
        _ => CommandDetail::Unknown,
    };
    Ok(detail)
}
