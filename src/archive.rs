//! Store-only ZIP container: local headers, central directory, end record.
//!
//! Single disk, no compression, no data descriptors, no comment. Every size and
//! offset is a little-endian `u32`, so the whole archive must stay under 4 GiB.
use crate::crc::crc32;
use crate::types::{ArchiveEntry, WriteError};
use std::collections::HashSet;

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4b50;

const VERSION: u16 = 20;
const METHOD_STORE: u16 = 0;
// General purpose bit 11: file name is UTF-8
const FLAG_UTF8_NAME: u16 = 0x0800;

// 1980-01-01 00:00:00, the earliest MS-DOS timestamp.
const DOS_TIME: u16 = 0x0000;
const DOS_DATE: u16 = 0x0021;

pub const LOCAL_HEADER_LEN: usize = 30;
pub const CENTRAL_HEADER_LEN: usize = 46;
pub const END_RECORD_LEN: usize = 22;

struct CentralRecord<'a> {
    name: &'a [u8],
    flags: u16,
    crc: u32,
    size: u32,
    offset: u32,
}

#[inline(always)]
fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline(always)]
fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn to_u32(n: usize, what: &str, path: &str) -> Result<u32, WriteError> {
    u32::try_from(n).map_err(|_| {
        WriteError::Archive(format!("{} of '{}' exceeds 4 GiB", what, path))
    })
}

/// Check the invariants the byte layout depends on before anything is emitted.
fn check_entries(entries: &[ArchiveEntry]) -> Result<u16, WriteError> {
    let count = u16::try_from(entries.len()).map_err(|_| {
        WriteError::Archive(format!("{} entries exceed the 65535 limit", entries.len()))
    })?;

    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if entry.path.is_empty() {
            return Err(WriteError::Archive("Entry path cannot be empty".to_string()));
        }
        if entry.path.starts_with('/') || entry.path.contains('\\') {
            return Err(WriteError::Archive(format!(
                "Entry path '{}' must be relative and '/'-separated",
                entry.path
            )));
        }
        if entry.path.len() > u16::MAX as usize {
            return Err(WriteError::Archive(format!(
                "Entry path of {} bytes is too long",
                entry.path.len()
            )));
        }
        if !seen.insert(entry.path.as_str()) {
            return Err(WriteError::Archive(format!(
                "Duplicate entry path '{}'",
                entry.path
            )));
        }
    }
    Ok(count)
}

/// Assemble `entries`, in order, into one ZIP byte sequence.
pub fn build_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, WriteError> {
    let count = check_entries(entries)?;

    let payload: usize = entries
        .iter()
        .map(|e| LOCAL_HEADER_LEN + CENTRAL_HEADER_LEN + 2 * e.path.len() + e.bytes.len())
        .sum();
    let mut buf = Vec::with_capacity(payload + END_RECORD_LEN);
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        let name = entry.path.as_bytes();
        let offset = to_u32(buf.len(), "offset", &entry.path)?;
        let size = to_u32(entry.bytes.len(), "size", &entry.path)?;
        let crc = crc32(&entry.bytes);
        let flags = if entry.path.is_ascii() { 0 } else { FLAG_UTF8_NAME };

        put_u32(&mut buf, LOCAL_HEADER_SIG);
        put_u16(&mut buf, VERSION);
        put_u16(&mut buf, flags);
        put_u16(&mut buf, METHOD_STORE);
        put_u16(&mut buf, DOS_TIME);
        put_u16(&mut buf, DOS_DATE);
        put_u32(&mut buf, crc);
        put_u32(&mut buf, size); // compressed
        put_u32(&mut buf, size); // uncompressed
        put_u16(&mut buf, name.len() as u16);
        put_u16(&mut buf, 0); // extra
        buf.extend_from_slice(name);
        buf.extend_from_slice(&entry.bytes);

        records.push(CentralRecord { name, flags, crc, size, offset });
    }

    let cd_offset = to_u32(buf.len(), "central directory offset", "archive")?;

    for rec in &records {
        put_u32(&mut buf, CENTRAL_HEADER_SIG);
        put_u16(&mut buf, VERSION); // made by
        put_u16(&mut buf, VERSION); // needed
        put_u16(&mut buf, rec.flags);
        put_u16(&mut buf, METHOD_STORE);
        put_u16(&mut buf, DOS_TIME);
        put_u16(&mut buf, DOS_DATE);
        put_u32(&mut buf, rec.crc);
        put_u32(&mut buf, rec.size);
        put_u32(&mut buf, rec.size);
        put_u16(&mut buf, rec.name.len() as u16);
        put_u16(&mut buf, 0); // extra
        put_u16(&mut buf, 0); // comment
        put_u16(&mut buf, 0); // disk start
        put_u16(&mut buf, 0); // internal attrs
        put_u32(&mut buf, 0); // external attrs
        put_u32(&mut buf, rec.offset);
        buf.extend_from_slice(rec.name);
    }

    let cd_size = to_u32(buf.len() - cd_offset as usize, "central directory size", "archive")?;

    put_u32(&mut buf, END_OF_CENTRAL_DIR_SIG);
    put_u16(&mut buf, 0); // this disk
    put_u16(&mut buf, 0); // disk with central directory
    put_u16(&mut buf, count);
    put_u16(&mut buf, count);
    put_u32(&mut buf, cd_size);
    put_u32(&mut buf, cd_offset);
    put_u16(&mut buf, 0); // comment length

    log::debug!(
        "built archive: {} entries, {} bytes, central directory {} bytes at {}",
        count,
        buf.len(),
        cd_size,
        cd_offset
    );
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(buf: &[u8], pos: usize) -> u16 {
        u16::from_le_bytes([buf[pos], buf[pos + 1]])
    }

    fn u32_at(buf: &[u8], pos: usize) -> u32 {
        u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
    }

    #[test]
    fn test_empty_archive_is_just_end_record() {
        let buf = build_archive(&[]).unwrap();
        assert_eq!(buf.len(), END_RECORD_LEN);
        assert_eq!(u32_at(&buf, 0), END_OF_CENTRAL_DIR_SIG);
        assert_eq!(u16_at(&buf, 8), 0);
        assert_eq!(u32_at(&buf, 12), 0);
        assert_eq!(u32_at(&buf, 16), 0);
    }

    #[test]
    fn test_single_entry_layout() {
        let entries = vec![ArchiveEntry::new("a.txt", b"hello".to_vec())];
        let buf = build_archive(&entries).unwrap();

        assert_eq!(u32_at(&buf, 0), LOCAL_HEADER_SIG);
        assert_eq!(u16_at(&buf, 4), 20);
        assert_eq!(u16_at(&buf, 8), METHOD_STORE);
        assert_eq!(u32_at(&buf, 14), crc32(b"hello"));
        assert_eq!(u32_at(&buf, 18), 5);
        assert_eq!(u32_at(&buf, 22), 5);
        assert_eq!(u16_at(&buf, 26), 5);
        assert_eq!(&buf[30..35], b"a.txt");
        assert_eq!(&buf[35..40], b"hello");

        let cd = 40;
        assert_eq!(u32_at(&buf, cd), CENTRAL_HEADER_SIG);
        assert_eq!(u32_at(&buf, cd + 16), crc32(b"hello"));
        assert_eq!(u32_at(&buf, cd + 42), 0);
        assert_eq!(&buf[cd + 46..cd + 51], b"a.txt");

        let end = buf.len() - END_RECORD_LEN;
        assert_eq!(u32_at(&buf, end), END_OF_CENTRAL_DIR_SIG);
        assert_eq!(u16_at(&buf, end + 8), 1);
        assert_eq!(u16_at(&buf, end + 10), 1);
        assert_eq!(u32_at(&buf, end + 12), (CENTRAL_HEADER_LEN + 5) as u32);
        assert_eq!(u32_at(&buf, end + 16), cd as u32);
    }

    #[test]
    fn test_central_directory_size_and_offsets() {
        let entries = vec![
            ArchiveEntry::new("one.xml", b"<a/>".to_vec()),
            ArchiveEntry::new("dir/two.bin", vec![0u8; 300]),
            ArchiveEntry::new("empty", Vec::new()),
        ];
        let buf = build_archive(&entries).unwrap();
        let end = buf.len() - END_RECORD_LEN;

        let expected_cd: usize = entries
            .iter()
            .map(|e| CENTRAL_HEADER_LEN + e.path.len())
            .sum();
        assert_eq!(u16_at(&buf, end + 10) as usize, entries.len());
        assert_eq!(u32_at(&buf, end + 12) as usize, expected_cd);

        // Walk the central directory and check every offset points at a local header
        // carrying the same name.
        let mut pos = u32_at(&buf, end + 16) as usize;
        for entry in &entries {
            assert_eq!(u32_at(&buf, pos), CENTRAL_HEADER_SIG);
            let name_len = u16_at(&buf, pos + 28) as usize;
            let local = u32_at(&buf, pos + 42) as usize;
            assert_eq!(&buf[pos + 46..pos + 46 + name_len], entry.path.as_bytes());
            assert_eq!(u32_at(&buf, local), LOCAL_HEADER_SIG);
            assert_eq!(&buf[local + 30..local + 30 + name_len], entry.path.as_bytes());
            pos += CENTRAL_HEADER_LEN + name_len;
        }
        assert_eq!(pos, end);
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let entries = vec![
            ArchiveEntry::new("x.xml", b"1".to_vec()),
            ArchiveEntry::new("x.xml", b"2".to_vec()),
        ];
        match build_archive(&entries) {
            Err(WriteError::Archive(msg)) => assert!(msg.contains("x.xml")),
            other => panic!("expected archive error, got {:?}", other),
        }
    }

    #[test]
    fn test_utf8_flag_only_for_non_ascii_names() {
        let entries = vec![
            ArchiveEntry::new("plain.xml", b"1".to_vec()),
            ArchiveEntry::new("名前.txt", b"2".to_vec()),
        ];
        let buf = build_archive(&entries).unwrap();
        assert_eq!(u16_at(&buf, 6), 0);
        let second = LOCAL_HEADER_LEN + "plain.xml".len() + 1;
        assert_eq!(u32_at(&buf, second), LOCAL_HEADER_SIG);
        assert_eq!(u16_at(&buf, second + 6), FLAG_UTF8_NAME);
    }

    #[test]
    fn test_absolute_path_rejected() {
        let entries = vec![ArchiveEntry::new("/abs.xml", b"1".to_vec())];
        assert!(matches!(build_archive(&entries), Err(WriteError::Archive(_))));
    }
}
