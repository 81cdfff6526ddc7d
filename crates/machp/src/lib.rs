//! Mach-O binary inspector.
//!
//! Decodes thin and fat Mach-O images into a normalized report: per-slice
//! headers, load commands, segments and sections, symbol tables, dylib
//! references and embedded code-signing data. The pipeline is strictly
//! bounds-checked, endian-correct and reentrant; see [`inspect_file`] for
//! the entry point.

pub mod codesign;
pub mod entropy;
pub mod error;
pub mod inspect;
pub mod macho;
pub mod reader;
pub mod report;

pub use error::Error;
pub use inspect::{inspect_bytes, inspect_file};
pub use report::{Report, SliceReport};

pub type Result<T> = std::result::Result<T, Error>;
