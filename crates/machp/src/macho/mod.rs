//! Mach-O container decoding: fat dispatch, headers, load commands,
//! segments and symbol tables.

pub mod commands;
pub mod constants;
pub mod fat;
pub mod header;
pub mod segment;
pub mod symtab;

pub use self::commands::{format_version, CommandDetail, DylibRef, LoadCommandRecord, LoadCommands};
pub use self::fat::{Container, FatArch};
pub use self::header::MachHeader;
pub use self::segment::{Section64, Segment32, Segment64};
pub use self::symtab::{DysymtabCommand, Symbol, SymbolTable, SymtabCommand};
