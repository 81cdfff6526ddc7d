//! CMS (PKCS#7) wrapper decoding: certificate-chain extraction.
//!
//! The blob payload is a `ContentInfo` carrying `SignedData`. The walk
//! locates the optional `[0] IMPLICIT certificates` set and parses each
//! member with the `x509-certificate` crate, reporting one subject
//! summary per certificate. Signatures are never verified here, and any
//! structural surprise yields the empty list rather than an error.

use crate::codesign::der::{read_tlv, TAG_INTEGER, TAG_SEQUENCE};
use x509_certificate::X509Certificate;

const TAG_SET: u8 = 0x31;
const TAG_CONTEXT_0: u8 = 0xA0;

/// Subject-summary strings for every certificate embedded in a CMS
/// SignedData payload, in storage order. Empty on any parse failure.
pub fn cms_certificate_subjects(payload: &[u8]) -> Vec<String> {
    extract_certificate_ranges(payload)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|der| match X509Certificate::from_der(der) {
            Ok(cert) => Some(subject_summary(&cert)),
            Err(e) => {
                log::debug!("CMS certificate did not parse: {e}");
                None
            }
        })
        .collect()
}

fn subject_summary(cert: &X509Certificate) -> String {
    if let Some(cn) = cert.subject_common_name() {
        return cn;
    }
    cert.subject_name()
        .user_friendly_str()
        .unwrap_or_else(|_| String::from("<unreadable subject>"))
}

/// Walk `ContentInfo -> [0] -> SignedData -> certificates` and return the
/// full DER bytes of each certificate.
fn extract_certificate_ranges(payload: &[u8]) -> Option<Vec<&[u8]>> {
    // ContentInfo ::= SEQUENCE { contentType OID, content [0] EXPLICIT ANY }
    let (content_info, _) = read_tlv(payload, 0)?;
    if content_info.tag != TAG_SEQUENCE {
        return None;
    }
    let body = content_info.content;

    let (oid, after_oid) = read_tlv(body, 0)?;
    if oid.tag != 0x06 {
        return None;
    }
    let (explicit, _) = read_tlv(body, after_oid)?;
    if explicit.tag != TAG_CONTEXT_0 {
        return None;
    }

    // SignedData ::= SEQUENCE { version, digestAlgorithms, encapContentInfo,
    //                           certificates [0] IMPLICIT OPTIONAL, ... }
    let (signed_data, _) = read_tlv(explicit.content, 0)?;
    if signed_data.tag != TAG_SEQUENCE {
        return None;
    }
    let sd = signed_data.content;

    let mut cursor = 0usize;
    let (version, next) = read_tlv(sd, cursor)?;
    if version.tag != TAG_INTEGER {
        return None;
    }
    cursor = next;

    let (digests, next) = read_tlv(sd, cursor)?;
    if digests.tag != TAG_SET {
        return None;
    }
    cursor = next;

    let (encap, next) = read_tlv(sd, cursor)?;
    if encap.tag != TAG_SEQUENCE {
        return None;
    }
    cursor = next;

    let (certs, _) = read_tlv(sd, cursor)?;
    if certs.tag != TAG_CONTEXT_0 {
        // No certificates present; not an error.
        return Some(Vec::new());
    }

    let members = certs.content;
    let mut out = Vec::new();
    let mut m = 0usize;
    while m < members.len() {
        let (cert, next) = read_tlv(members, m)?;
        if cert.tag != TAG_SEQUENCE {
            break;
        }
        out.push(&members[m..next]);
        m = next;
    }
    Some(out)
}
