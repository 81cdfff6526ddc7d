//! XML-plist entitlements decoding.
//!
//! The blob payload (after the 8-byte header) is an XML property list
//! whose root is a dictionary of requested privileges. The pipeline
//! reports the sorted top-level key list.

use crate::{Error, Result};
use plist::Value;

/// Parse the XML plist payload and return its top-level keys, sorted.
///
/// A root that is not a dictionary yields the empty list; a document that
/// does not parse at all is a [`Error::Parsing`] failure.
pub fn xml_entitlement_keys(payload: &[u8]) -> Result<Vec<String>> {
    let value: Value = plist::from_bytes(payload)
        .map_err(|e| Error::Parsing(format!("entitlements plist: {e}")))?;
    let mut keys: Vec<String> = match value {
        Value::Dictionary(dict) => dict.keys().cloned().collect(),
        _ => Vec::new(),
    };
    keys.sort();
    Ok(keys)
}
