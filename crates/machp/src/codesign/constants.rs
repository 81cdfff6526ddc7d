//! Apple code-signing constants: blob magics, slot labels and header
//! sizes. All on-disk integers in this format are big-endian.

// =============================================================================
// Blob magics
// =============================================================================

/// SuperBlob wrapping an embedded signature.
pub const CSMAGIC_EMBEDDED_SIGNATURE: u32 = 0xFADE0CC0;

/// SuperBlob wrapping a detached signature.
pub const CSMAGIC_DETACHED_SIGNATURE: u32 = 0xFADE0CC1;

/// Single requirement expression.
pub const CSMAGIC_REQUIREMENT: u32 = 0xFADE0C00;

/// Requirement set (vector of typed requirements).
pub const CSMAGIC_REQUIREMENTS: u32 = 0xFADE0C01;

/// CodeDirectory blob.
pub const CSMAGIC_CODEDIRECTORY: u32 = 0xFADE0C02;

/// XML plist entitlements.
pub const CSMAGIC_EMBEDDED_ENTITLEMENTS: u32 = 0xFADE7171;

/// DER-encoded entitlements.
pub const CSMAGIC_EMBEDDED_DER_ENTITLEMENTS: u32 = 0xFADE7172;

/// CMS (PKCS#7) signature wrapper.
pub const CSMAGIC_BLOBWRAPPER: u32 = 0xFADE0B01;

// =============================================================================
// Sizes
// =============================================================================

/// SuperBlob header: magic + length + count.
pub const SUPERBLOB_HEADER_SIZE: usize = 12;

/// SuperBlob index entry: slot type + offset.
pub const INDEX_ENTRY_SIZE: usize = 8;

/// Generic blob header: magic + length.
pub const BLOB_HEADER_SIZE: usize = 8;

/// CodeDirectory header as decoded by this pipeline.
pub const CODEDIRECTORY_HEADER_SIZE: usize = 44;

// =============================================================================
// Special slots
// =============================================================================

/// Labels for CodeDirectory special slots, assigned by forward index.
/// Indices past the table render as `Special Slot <n>`.
pub const SPECIAL_SLOT_LABELS: [&str; 5] = [
    "Entitlements Blob",
    "Application Specific",
    "Resource Directory",
    "Requirements Blob",
    "Bound Info.plist",
];

/// Label for a special slot index.
pub fn special_slot_label(index: usize) -> String {
    SPECIAL_SLOT_LABELS
        .get(index)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("Special Slot {index}"))
}

/// Rendering of an all-zero (unbound) special-slot hash.
pub const NOT_BOUND: &str = "Not Bound";
