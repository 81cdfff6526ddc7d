//! Error types for Mach-O inspection.
//!
//! Every decoder in this crate returns [`crate::Result`], which uses the
//! [`enum@Error`] defined here. Structural failures are fatal for the file
//! being inspected; see the variant docs for the distinction between
//! format-level and bounds-level failures.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for inspection operations.
///
/// Match on variants to handle specific failure cases.
///
/// # Examples
///
/// ```no_run
/// use machp::{inspect_file, Error};
///
/// match inspect_file("app.bin") {
///     Ok(report) => println!("{} slices", report.slice_count()),
///     Err(Error::InvalidFormat(msg)) => eprintln!("not a Mach-O: {msg}"),
///     Err(e) => eprintln!("failed: {e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// The input file could not be opened.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Magic mismatch or a structurally impossible field at the top of a
    /// container: unknown file magic, non-64-bit Mach-O header magic,
    /// unknown code-signature super-blob magic.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Bounds violation, truncated record, or offset arithmetic overflow.
    /// The message identifies the offset and the structure being decoded.
    #[error("Parse error: {0}")]
    Parsing(String),

    /// Reserved for format features the pipeline declines to decode.
    /// Constructed nowhere today.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O failure outside the initial open, e.g. writing a report file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
