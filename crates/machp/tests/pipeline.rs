//! End-to-end pipeline tests over synthetic thin and fat images built in
//! memory, covering both byte orders, the fat descent policy and the
//! embedded-signature decoding.

use machp::{inspect_bytes, Error};

const MH_MAGIC_64: u32 = 0xFEEDFACF;
const LC_SEGMENT_64: u32 = 0x19;
const LC_SYMTAB: u32 = 0x2;
const LC_LOAD_DYLIB: u32 = 0xC;
const LC_CODE_SIGNATURE: u32 = 0x1D;
const FAT_MAGIC: u32 = 0xCAFEBABE;
const CPU_ARM64: u32 = 0x0100000C;
const CPU_ARM: u32 = 0x0000000C;

fn w32(buf: &mut Vec<u8>, v: u32, be: bool) {
    buf.extend(if be { v.to_be_bytes() } else { v.to_le_bytes() });
}

fn w64(buf: &mut Vec<u8>, v: u64, be: bool) {
    buf.extend(if be { v.to_be_bytes() } else { v.to_le_bytes() });
}

/// 32-byte header + commands + tail. The magic bytes are laid down so a
/// little-endian build leads with `CF FA ED FE`.
fn thin_image(be: bool, flags: u32, cmds: &[Vec<u8>], tail: &[u8]) -> Vec<u8> {
    let sizeofcmds: usize = cmds.iter().map(Vec::len).sum();
    let mut buf = Vec::new();
    buf.extend(if be {
        MH_MAGIC_64.to_be_bytes()
    } else {
        MH_MAGIC_64.to_le_bytes()
    });
    w32(&mut buf, CPU_ARM64, be);
    w32(&mut buf, 0, be); // cpusubtype
    w32(&mut buf, 2, be); // MH_EXECUTE
    w32(&mut buf, cmds.len() as u32, be);
    w32(&mut buf, sizeofcmds as u32, be);
    w32(&mut buf, flags, be);
    w32(&mut buf, 0, be);
    for c in cmds {
        buf.extend(c);
    }
    buf.extend(tail);
    buf
}

fn seg64_cmd(be: bool, segname: &str, fileoff: u64, filesize: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    w32(&mut buf, LC_SEGMENT_64, be);
    w32(&mut buf, 72, be);
    let mut name = segname.as_bytes().to_vec();
    name.resize(16, 0);
    buf.extend(name);
    w64(&mut buf, 0x100000000, be);
    w64(&mut buf, 0x4000, be);
    w64(&mut buf, fileoff, be);
    w64(&mut buf, filesize, be);
    w32(&mut buf, 5, be);
    w32(&mut buf, 5, be);
    w32(&mut buf, 0, be); // nsects
    w32(&mut buf, 0, be);
    buf
}

fn dylib_cmd(be: bool, name: &str, current: u32, compat: u32) -> Vec<u8> {
    let padded = (24 + name.len() + 8) & !7;
    let mut buf = Vec::new();
    w32(&mut buf, LC_LOAD_DYLIB, be);
    w32(&mut buf, padded as u32, be);
    w32(&mut buf, 24, be);
    w32(&mut buf, 2, be);
    w32(&mut buf, current, be);
    w32(&mut buf, compat, be);
    buf.extend(name.as_bytes());
    buf.resize(padded, 0);
    buf
}

fn symtab_cmd(be: bool, symoff: u32, nsyms: u32, stroff: u32, strsize: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    w32(&mut buf, LC_SYMTAB, be);
    w32(&mut buf, 24, be);
    w32(&mut buf, symoff, be);
    w32(&mut buf, nsyms, be);
    w32(&mut buf, stroff, be);
    w32(&mut buf, strsize, be);
    buf
}

fn codesig_cmd(be: bool, dataoff: u32, datasize: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    w32(&mut buf, LC_CODE_SIGNATURE, be);
    w32(&mut buf, 16, be);
    w32(&mut buf, dataoff, be);
    w32(&mut buf, datasize, be);
    buf
}

fn nlist(be: bool, n_strx: u32, n_type: u8, n_sect: u8, n_value: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    w32(&mut buf, n_strx, be);
    buf.push(n_type);
    buf.push(n_sect);
    buf.extend(if be {
        0u16.to_be_bytes()
    } else {
        0u16.to_le_bytes()
    });
    w64(&mut buf, n_value, be);
    buf
}

/// Blob with its big-endian `(magic, length)` header.
fn cs_blob(magic: u32, payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend(magic.to_be_bytes());
    v.extend(((payload.len() + 8) as u32).to_be_bytes());
    v.extend(payload);
    v
}

fn superblob(entries: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let header = 12 + entries.len() * 8;
    let mut cursor = header;
    let mut offsets = Vec::new();
    for (_, d) in entries {
        offsets.push(cursor);
        cursor += d.len();
    }
    let mut v = Vec::new();
    v.extend(0xFADE0CC0u32.to_be_bytes());
    v.extend((cursor as u32).to_be_bytes());
    v.extend((entries.len() as u32).to_be_bytes());
    for ((slot, _), off) in entries.iter().zip(&offsets) {
        v.extend(slot.to_be_bytes());
        v.extend((*off as u32).to_be_bytes());
    }
    for (_, d) in entries {
        v.extend(d);
    }
    v
}

fn code_directory(ident: &str) -> Vec<u8> {
    let ident_offset = 44u32;
    let ident_len = ident.len() as u32 + 1;
    let hash_offset = ident_offset + ident_len + 3 * 20; // 3 special slots
    let total = hash_offset + 20; // one code slot
    let mut buf = Vec::new();
    buf.extend(0xFADE0C02u32.to_be_bytes());
    buf.extend(total.to_be_bytes());
    buf.extend(0x20400u32.to_be_bytes());
    buf.extend(0x2u32.to_be_bytes());
    buf.extend(hash_offset.to_be_bytes());
    buf.extend(ident_offset.to_be_bytes());
    buf.extend(3u32.to_be_bytes());
    buf.extend(1u32.to_be_bytes());
    buf.extend(0x4000u32.to_be_bytes());
    buf.push(20);
    buf.push(1);
    buf.push(0);
    buf.push(12);
    buf.extend(0u32.to_be_bytes());
    buf.extend(ident.as_bytes());
    buf.push(0);
    buf.extend([0u8; 20]); // special slot 0: unbound
    buf.extend([0x11u8; 20]);
    buf.extend([0x22u8; 20]);
    buf.extend([0x33u8; 20]); // the code slot
    buf
}

const ENTITLEMENTS_XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>get-task-allow</key>
    <true/>
    <key>application-identifier</key>
    <string>TEAM.com.example.demo</string>
</dict>
</plist>"#;

fn der_entitlements() -> Vec<u8> {
    // { "com.apple.security.app-sandbox": true } wrapped as
    // APPLICATION [16] { INTEGER 1, CONTEXT [16] { SEQ { UTF8 key, BOOL } } }
    let key = b"com.apple.security.app-sandbox";
    let mut pair = vec![0x0C, key.len() as u8];
    pair.extend(key);
    pair.extend([0x01, 0x01, 0xFF]);
    let mut member = vec![0x30, pair.len() as u8];
    member.extend(pair);
    let mut dict = vec![0xB0, member.len() as u8];
    dict.extend(member);
    let mut body = vec![0x02, 0x01, 0x01];
    body.extend(dict);
    let mut outer = vec![0x70, body.len() as u8];
    outer.extend(body);
    outer
}

/// A fully-populated little- or big-endian thin image:
/// segment, dylib, symtab (one import + one export), code signature.
fn full_image(be: bool) -> Vec<u8> {
    let strtab = b"\0_printf\0_start\0";
    let cmds_size = 72 + 56 + 24 + 16;
    let content_start = 32 + cmds_size as u32;
    let symoff = content_start;
    let stroff = symoff + 2 * 16;
    let cs_off = stroff + strtab.len() as u32;

    let sig = superblob(&[
        (0, code_directory("com.example.demo")),
        (2, cs_blob(0xFADE0C01, b"\0\0\0\x01com.example.demo\0")),
        (5, cs_blob(0xFADE7171, ENTITLEMENTS_XML)),
        (7, cs_blob(0xFADE7172, &der_entitlements())),
        (0x10000, cs_blob(0xFADE0B01, &[0xFF, 0x00])),
        (0x9999, cs_blob(0xFADE9999, &[0xDE, 0xAD, 0xBE, 0xEF])),
    ]);

    let cmds = vec![
        seg64_cmd(be, "__TEXT", 0, u64::from(content_start)),
        dylib_cmd(be, "/usr/lib/libSystem.B.dylib", 0x05270000, 0x00010000),
        symtab_cmd(be, symoff, 2, stroff, strtab.len() as u32),
        codesig_cmd(be, cs_off, sig.len() as u32),
    ];
    assert_eq!(cmds.iter().map(Vec::len).sum::<usize>(), cmds_size);

    let mut tail = Vec::new();
    tail.extend(nlist(be, 1, 0x01, 0, 0)); // _printf: undefined external
    tail.extend(nlist(be, 9, 0x0F, 1, 0x1000)); // _start: defined external
    tail.extend(strtab);
    tail.extend(&sig);

    thin_image(be, 0x00200085, &cmds, &tail)
}

#[test]
fn test_thin_image_end_to_end() {
    let image = full_image(false);
    let report = inspect_bytes(&image, "demo").unwrap();

    assert!(!report.fat);
    assert!(report.parsed);
    assert_eq!(report.file_size, image.len() as u64);
    assert!(report.entropy > 0.0 && report.entropy < 8.0);

    let slice = report.header_slice.as_ref().expect("thin slice");
    assert_eq!(slice.offset, 0);
    assert_eq!(slice.size, image.len() as u64);
    assert_eq!(slice.cputype, CPU_ARM64);
    assert_eq!(slice.sha256.len(), 64);
    assert!(slice.align.is_none());

    let header = &slice.header;
    assert_eq!(header.ncmds, 4);
    assert!(!header.big_endian);
    assert_eq!(
        header.flags_decoded,
        vec!["MH_NOUNDEFS", "MH_DYLDLINK", "MH_TWOLEVEL", "MH_PIE"]
    );
    assert_eq!(header.load_commands.len(), 4);
    assert_eq!(header.load_commands[0].name, "LC_SEGMENT_64");
    assert_eq!(header.load_commands[3].name, "LC_CODE_SIGNATURE");

    assert_eq!(slice.dylibs.len(), 1);
    assert_eq!(slice.dylibs[0].name, "/usr/lib/libSystem.B.dylib");
    assert_eq!(slice.dylibs[0].current_version, "1319.0.0");
    assert_eq!(slice.dylibs[0].compatibility_version, "1.0.0");

    assert_eq!(slice.imported_symbols, vec!["_printf"]);
    assert_eq!(slice.num_imported_symbols, 1);
    assert_eq!(slice.exports, vec!["_start"]);
    assert_eq!(slice.num_exports, 1);
    assert!(slice.symtab.is_some());
    assert!(slice.dysymtab.is_none());
}

#[test]
fn test_code_signature_end_to_end() {
    let image = full_image(false);
    let report = inspect_bytes(&image, "demo").unwrap();
    let slice = report.header_slice.unwrap();
    let sig = slice.header.code_signature.expect("code signature");

    assert_eq!(sig.magic, 0xFADE0CC0);
    assert_eq!(sig.count, 6);

    let cd = sig.code_directory.expect("code directory");
    assert_eq!(cd.ident, "com.example.demo");
    assert_eq!(cd.version, 0x20400);
    assert_eq!(cd.n_special_slots, 3);
    assert_eq!(cd.n_code_slots, 1);
    assert_eq!(cd.hash_type, 1);
    assert_eq!(cd.cd_hash.len(), 40);
    assert_eq!(cd.special_slots[0].label, "Entitlements Blob");
    assert_eq!(cd.special_slots[0].hash, "Not Bound");
    assert_eq!(cd.special_slots[1].hash, "11".repeat(20));

    assert_eq!(
        sig.entitlements_keys.as_deref(),
        Some(&["application-identifier".to_string(), "get-task-allow".to_string()][..])
    );
    assert_eq!(
        sig.der_entitlements_keys.as_deref(),
        Some(&["com.apple.security.app-sandbox".to_string()][..])
    );
    assert_eq!(sig.requirements.as_deref(), Some("com.example.demo"));
    assert_eq!(sig.certificates.as_deref(), Some(&[][..]));

    let other = sig.other_blobs.get("0xFADE9999").expect("unknown blob");
    // base64 of DE AD BE EF
    assert_eq!(other, "3q2+7w==");
}

#[test]
fn test_endianness_law() {
    let le = inspect_bytes(&full_image(false), "le").unwrap();
    let be = inspect_bytes(&full_image(true), "be").unwrap();

    let le_slice = le.header_slice.unwrap();
    let be_slice = be.header_slice.unwrap();

    assert!(!le_slice.header.big_endian);
    assert!(be_slice.header.big_endian);

    // Field-wise equality of everything but the byte-order markers.
    let mut le_json = serde_json::to_value(&*le_slice).unwrap();
    let mut be_json = serde_json::to_value(&*be_slice).unwrap();
    for v in [&mut le_json, &mut be_json] {
        let obj = v.as_object_mut().unwrap();
        obj.remove("sha256"); // raw bytes differ by construction
        let header = obj.get_mut("header").unwrap().as_object_mut().unwrap();
        header.remove("magic");
        header.remove("big_endian");
    }
    assert_eq!(le_json, be_json);
}

#[test]
fn test_fat_skips_32_bit_slices() {
    let thin = full_image(false);
    let slice_offset = 8 + 2 * 20; // header + two fat32 entries
    let pad_to = 64usize;
    let thin32 = vec![0u8; 16]; // never decoded

    let mut fat = Vec::new();
    fat.extend(FAT_MAGIC.to_be_bytes());
    fat.extend(2u32.to_be_bytes());
    // arm64 slice
    fat.extend(CPU_ARM64.to_be_bytes());
    fat.extend(0u32.to_be_bytes());
    fat.extend((pad_to as u32).to_be_bytes());
    fat.extend((thin.len() as u32).to_be_bytes());
    fat.extend(14u32.to_be_bytes());
    // armv7 slice, enumerated but skipped
    fat.extend(CPU_ARM.to_be_bytes());
    fat.extend(0u32.to_be_bytes());
    fat.extend(((pad_to + thin.len()) as u32).to_be_bytes());
    fat.extend((thin32.len() as u32).to_be_bytes());
    fat.extend(14u32.to_be_bytes());
    assert_eq!(fat.len(), slice_offset);
    fat.resize(pad_to, 0);
    fat.extend(&thin);
    fat.extend(&thin32);

    let report = inspect_bytes(&fat, "universal").unwrap();
    assert!(report.fat);
    assert_eq!(report.nfat_arch, Some(2));
    assert_eq!(report.archs.len(), 2);
    assert!(report.archs[0].decoded);
    assert!(!report.archs[1].decoded);
    assert_eq!(report.slices.len(), 1);
    assert_ne!(report.slices[0].cputype & 0x01000000, 0);

    // Archive-level unions.
    assert_eq!(report.imported_symbols.as_deref(), Some(&["_printf".to_string()][..]));
    assert_eq!(report.exports.as_deref(), Some(&["_start".to_string()][..]));
    assert_eq!(report.dylibs.as_ref().unwrap().len(), 1);
}

#[test]
fn test_slice_independence() {
    let thin = full_image(false);
    let pad_to = 32usize;

    let mut fat = Vec::new();
    fat.extend(FAT_MAGIC.to_be_bytes());
    fat.extend(1u32.to_be_bytes());
    fat.extend(CPU_ARM64.to_be_bytes());
    fat.extend(0u32.to_be_bytes());
    fat.extend((pad_to as u32).to_be_bytes());
    fat.extend((thin.len() as u32).to_be_bytes());
    fat.extend(14u32.to_be_bytes());
    fat.resize(pad_to, 0);
    fat.extend(&thin);

    let alone = inspect_bytes(&thin, "alone").unwrap();
    let within = inspect_bytes(&fat, "within").unwrap();

    let alone_slice = alone.header_slice.unwrap();
    let within_slice = &within.slices[0];

    assert_eq!(alone_slice.sha256, within_slice.sha256);

    let mut a = serde_json::to_value(&*alone_slice).unwrap();
    let mut w = serde_json::to_value(within_slice).unwrap();
    for v in [&mut a, &mut w] {
        let obj = v.as_object_mut().unwrap();
        obj.remove("offset");
        obj.remove("align");
    }
    assert_eq!(a, w);
}

#[test]
fn test_truncated_command_cites_offset_32() {
    // ncmds = 1, cmdsize says 72, only 40 bytes follow the header.
    let mut cmd = Vec::new();
    w32(&mut cmd, LC_SEGMENT_64, false);
    w32(&mut cmd, 72, false);
    cmd.resize(40, 0);
    let image = thin_image(false, 0, &[cmd], &[]);
    let err = inspect_bytes(&image, "trunc").unwrap_err();
    match err {
        Error::Parsing(msg) => assert!(msg.contains("offset 32"), "message: {msg}"),
        other => panic!("expected Parsing, got {other:?}"),
    }
}

#[test]
fn test_bad_superblob_magic_is_invalid_format() {
    let mut sig = Vec::new();
    sig.extend(0xDEADBEEFu32.to_be_bytes());
    sig.extend(12u32.to_be_bytes());
    sig.extend(0u32.to_be_bytes());

    let cs_off = 32 + 16;
    let cmds = vec![codesig_cmd(false, cs_off, sig.len() as u32)];
    let image = thin_image(false, 0, &cmds, &sig);
    let err = inspect_bytes(&image, "badsig").unwrap_err();
    match err {
        Error::InvalidFormat(msg) => assert!(msg.contains("0xDEADBEEF"), "message: {msg}"),
        other => panic!("expected InvalidFormat, got {other:?}"),
    }
}

#[test]
fn test_unknown_top_level_magic() {
    let err = inspect_bytes(&[0x00u8; 64], "zeros").unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
}

#[test]
fn test_inspect_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.bin");
    std::fs::write(&path, full_image(false)).unwrap();

    let report = machp::inspect_file(&path).unwrap();
    assert!(report.parsed);
    assert_eq!(report.slice_count(), 1);
    assert_eq!(report.file_path, path.display().to_string());

    let missing = dir.path().join("absent.bin");
    assert!(matches!(
        machp::inspect_file(&missing),
        Err(Error::FileNotFound(_))
    ));
}

#[test]
fn test_report_json_shape() {
    let report = inspect_bytes(&full_image(false), "demo").unwrap();
    let json = serde_json::to_value(&report).unwrap();
    let obj = json.as_object().unwrap();
    for key in ["file_path", "file_size", "entropy", "fat", "parsed", "header_slice"] {
        assert!(obj.contains_key(key), "missing {key}");
    }
    assert!(!obj.contains_key("slices"));
    assert!(!obj.contains_key("nfat_arch"));

    let slice = &json["header_slice"];
    for key in [
        "offset",
        "size",
        "cputype",
        "sha256",
        "entropy",
        "header",
        "dylibs",
        "imported_symbols",
        "num_imported_symbols",
        "exports",
        "num_exports",
    ] {
        assert!(slice.get(key).is_some(), "missing slice key {key}");
    }
    assert!(slice["header"].get("code_signature").is_some());
}
