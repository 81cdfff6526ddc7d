//! Minimal DER (Distinguished Encoding Rules) TLV reader.
//!
//! Used by the DER-entitlements key walk and the CMS certificate
//! extraction. The reader is deliberately forgiving: malformed tags or
//! lengths stop the walk instead of failing the file, so callers return
//! whatever they decoded up to that point.

/// ASN.1 tag for INTEGER.
pub const TAG_INTEGER: u8 = 0x02;

/// ASN.1 tag for UTF8String.
pub const TAG_UTF8STRING: u8 = 0x0C;

/// ASN.1 tag for SEQUENCE (constructed).
pub const TAG_SEQUENCE: u8 = 0x30;

/// Constructed bit in a tag byte.
pub const TAG_CONSTRUCTED: u8 = 0x20;

/// One decoded TLV: its tag byte and a borrowed view of the content.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub content: &'a [u8],
}

impl Tlv<'_> {
    pub fn is_constructed(&self) -> bool {
        self.tag & TAG_CONSTRUCTED != 0
    }
}

/// Read the TLV starting at `offset`. Returns the value and the offset of
/// the following TLV, or `None` when the encoding is malformed (multi-byte
/// tag, indefinite or oversized length, truncation).
pub fn read_tlv(data: &[u8], offset: usize) -> Option<(Tlv<'_>, usize)> {
    let tag = *data.get(offset)?;
    if tag & 0x1F == 0x1F {
        // Multi-byte tag numbers never occur in the formats walked here.
        return None;
    }
    let first = *data.get(offset + 1)?;
    let (len, header) = if first < 0x80 {
        (first as usize, 2)
    } else {
        let n = (first & 0x7F) as usize;
        if n == 0 || n > 4 {
            // Indefinite length or absurd width.
            return None;
        }
        let mut len = 0usize;
        for i in 0..n {
            len = (len << 8) | *data.get(offset + 2 + i)? as usize;
        }
        (len, 2 + n)
    };
    let start = offset.checked_add(header)?;
    let end = start.checked_add(len)?;
    if end > data.len() {
        return None;
    }
    Some((
        Tlv {
            tag,
            content: &data[start..end],
        },
        end,
    ))
}

/// Walk DER-encoded entitlements and list the dictionary keys in document
/// order.
///
/// Shape: an application-tagged constructed container holding an INTEGER
/// version followed by a context-tagged dictionary whose members are
/// `SEQUENCE { UTF8String key, value }`. Unknown tags end the walk
/// gracefully.
pub fn der_entitlement_keys(payload: &[u8]) -> Vec<String> {
    let mut keys = Vec::new();

    let Some((outer, _)) = read_tlv(payload, 0) else {
        return keys;
    };
    if !outer.is_constructed() {
        return keys;
    }

    let body = outer.content;
    let mut cursor = 0usize;

    // Leading INTEGER is the format version; skip it when present.
    if let Some((tlv, next)) = read_tlv(body, cursor) {
        if tlv.tag == TAG_INTEGER {
            cursor = next;
        }
    } else {
        return keys;
    }

    let Some((dict, _)) = read_tlv(body, cursor) else {
        return keys;
    };
    if !dict.is_constructed() {
        return keys;
    }

    let members = dict.content;
    let mut m = 0usize;
    while m < members.len() {
        let Some((entry, next)) = read_tlv(members, m) else {
            break;
        };
        if entry.tag != TAG_SEQUENCE {
            break;
        }
        if let Some((key, _)) = read_tlv(entry.content, 0) {
            if key.tag == TAG_UTF8STRING {
                if let Ok(s) = std::str::from_utf8(key.content) {
                    keys.push(s.to_string());
                }
            }
        }
        m = next;
    }
    keys
}
