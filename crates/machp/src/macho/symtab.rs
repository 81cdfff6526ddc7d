//! Symbol-table decoding: `LC_SYMTAB`, `LC_DYSYMTAB` and the nlist_64
//! records they reference.
//!
//! Classification rules:
//! - imported: undefined external with zero value
//!   (`n_type & N_TYPE == 0`, `n_type & N_EXT == 1`, `n_value == 0`)
//! - exported: defined external, not a STAB
//!   (`n_type & N_STAB == 0`, `n_type & N_EXT == 1`, `n_type & N_TYPE != 0`)
//!
//! Symbols whose string index escapes the heap or whose name is not valid
//! UTF-8 are skipped rather than failing the slice.

use crate::macho::constants::{NLIST_64_SIZE, N_EXT, N_STAB, N_TYPE};
use crate::reader::{read_cstr, read_u16, read_u32, read_u64, read_u8, Endian};
use crate::Result;
use serde::Serialize;

/// `LC_SYMTAB` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SymtabCommand {
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

impl SymtabCommand {
    pub fn parse(data: &[u8], cmd_offset: usize, endian: Endian) -> Result<Self> {
        Ok(Self {
            symoff: read_u32(data, cmd_offset + 8, endian)?,
            nsyms: read_u32(data, cmd_offset + 12, endian)?,
            stroff: read_u32(data, cmd_offset + 16, endian)?,
            strsize: read_u32(data, cmd_offset + 20, endian)?,
        })
    }
}

/// `LC_DYSYMTAB` payload: 18 u32 fields describing symbol-table groups
/// and the indirect tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DysymtabCommand {
    pub ilocalsym: u32,
    pub nlocalsym: u32,
    pub iextdefsym: u32,
    pub nextdefsym: u32,
    pub iundefsym: u32,
    pub nundefsym: u32,
    pub tocoff: u32,
    pub ntoc: u32,
    pub modtaboff: u32,
    pub nmodtab: u32,
    pub extrefsymoff: u32,
    pub nextrefsyms: u32,
    pub indirectsymoff: u32,
    pub nindirectsyms: u32,
    pub extreloff: u32,
    pub nextrel: u32,
    pub locreloff: u32,
    pub nlocrel: u32,
}

impl DysymtabCommand {
    pub fn parse(data: &[u8], cmd_offset: usize, endian: Endian) -> Result<Self> {
        let mut fields = [0u32; 18];
        for (i, f) in fields.iter_mut().enumerate() {
            *f = read_u32(data, cmd_offset + 8 + i * 4, endian)?;
        }
        let [ilocalsym, nlocalsym, iextdefsym, nextdefsym, iundefsym, nundefsym, tocoff, ntoc, modtaboff, nmodtab, extrefsymoff, nextrefsyms, indirectsymoff, nindirectsyms, extreloff, nextrel, locreloff, nlocrel] =
            fields;
        Ok(Self {
            ilocalsym,
            nlocalsym,
            iextdefsym,
            nextdefsym,
            iundefsym,
            nundefsym,
            tocoff,
            ntoc,
            modtaboff,
            nmodtab,
            extrefsymoff,
            nextrefsyms,
            indirectsymoff,
            nindirectsyms,
            extreloff,
            nextrel,
            locreloff,
            nlocrel,
        })
    }
}

/// One decoded nlist_64 record with its resolved name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u64,
}

impl Symbol {
    pub fn is_stab(&self) -> bool {
        self.n_type & N_STAB != 0
    }

    pub fn is_imported(&self) -> bool {
        self.n_type & N_TYPE == 0 && self.n_type & N_EXT != 0 && self.n_value == 0
    }

    pub fn is_exported(&self) -> bool {
        self.n_type & N_STAB == 0 && self.n_type & N_EXT != 0 && self.n_type & N_TYPE != 0
    }
}

/// The three projections of a slice's symbol table.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    /// All named symbols in nlist index order.
    pub symbols: Vec<Symbol>,
    pub imported: Vec<String>,
    pub exported: Vec<String>,
}

/// Decode `nsyms` nlist_64 records from the slice, resolving names
/// against the `[stroff, stroff + strsize)` string heap.
pub fn decode_symbols(data: &[u8], symtab: &SymtabCommand, endian: Endian) -> Result<SymbolTable> {
    let heap_start = symtab.stroff as usize;
    let heap_end = heap_start.saturating_add(symtab.strsize as usize).min(data.len());

    let mut table = SymbolTable::default();
    for i in 0..symtab.nsyms as usize {
        let off = symtab.symoff as usize + i * NLIST_64_SIZE;
        let n_strx = read_u32(data, off, endian)?;
        let n_type = read_u8(data, off + 4)?;
        let n_sect = read_u8(data, off + 5)?;
        let n_desc = read_u16(data, off + 6, endian)?;
        let n_value = read_u64(data, off + 8, endian)?;

        if n_strx as usize >= symtab.strsize as usize {
            log::debug!("symbol {i}: string index {n_strx} outside heap, skipped");
            continue;
        }
        let name_off = heap_start + n_strx as usize;
        if name_off >= heap_end {
            continue;
        }
        let Some(name) = read_cstr(data, name_off, heap_end)? else {
            log::debug!("symbol {i}: name is not valid UTF-8, skipped");
            continue;
        };

        let sym = Symbol {
            name,
            n_type,
            n_sect,
            n_desc,
            n_value,
        };
        if sym.is_imported() {
            table.imported.push(sym.name.clone());
        } else if sym.is_exported() {
            table.exported.push(sym.name.clone());
        }
        table.symbols.push(sym);
    }
    Ok(table)
}
