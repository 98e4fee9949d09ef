// Footer: directory round-trips through the fixed tail, and corrupting
// any part of it (markers, directory bytes, checksum) must make the read
// fail so the reader falls back to recovery.

use std::io::Cursor;

use bcsv::file::footer::{
    FileFooter, PacketIndexEntry, FOOTER_MIN_SIZE, FOOTER_TAIL_SIZE, INDEX_ENTRY_SIZE,
};

fn sample_footer() -> FileFooter {
    let mut footer = FileFooter::new();
    footer.entries.push(PacketIndexEntry::new(100, 0));
    footer.entries.push(PacketIndexEntry::new(5000, 1000));
    footer.entries.push(PacketIndexEntry::new(10000, 2000));
    footer.entries.push(PacketIndexEntry::new(15000, 3000));
    footer.total_row_count = 4000;
    footer.last_payload_checksum = 0xFEDC_BA98_7654_3210;
    footer
}

fn read_back(bytes: &[u8]) -> bcsv::Result<FileFooter> {
    FileFooter::read_from_tail(&mut Cursor::new(bytes), bytes.len() as u64)
}

#[test]
fn sizes() {
    assert_eq!(INDEX_ENTRY_SIZE, 16);
    assert_eq!(FOOTER_TAIL_SIZE, 32);
    assert_eq!(FileFooter::new().encoded_size(), FOOTER_MIN_SIZE);
    assert_eq!(FOOTER_MIN_SIZE, 36);

    let mut footer = FileFooter::new();
    footer.entries.push(PacketIndexEntry::new(100, 0));
    assert_eq!(footer.encoded_size(), 52);
    footer.entries.push(PacketIndexEntry::new(5000, 1000));
    footer.entries.push(PacketIndexEntry::new(10000, 2000));
    assert_eq!(footer.encoded_size(), 84);
}

#[test]
fn empty_roundtrip() {
    let footer = FileFooter::new();
    let bytes = footer.encode();
    assert_eq!(bytes.len(), 36);
    let copy = read_back(&bytes).unwrap();
    assert_eq!(copy, footer);
}

#[test]
fn roundtrip_with_entries() {
    let footer = sample_footer();
    let bytes = footer.encode();
    assert_eq!(bytes.len(), footer.encoded_size());

    let copy = read_back(&bytes).unwrap();
    assert_eq!(copy.entries.len(), 4);
    assert_eq!(copy, footer);
}

#[test]
fn roundtrip_behind_leading_data() {
    // footer parsing must work from the tail of a larger stream
    let footer = sample_footer();
    let mut bytes = vec![0xAB_u8; 777];
    bytes.extend_from_slice(&footer.encode());
    let copy = read_back(&bytes).unwrap();
    assert_eq!(copy, footer);
}

#[test]
fn large_directory_roundtrip() {
    let mut footer = FileFooter::new();
    for i in 0..1000u64 {
        footer
            .entries
            .push(PacketIndexEntry::new(i * 10_000, i * 100));
    }
    footer.total_row_count = 100_000;
    footer.last_payload_checksum = 0xABCD_EF12_3456_7890;

    let bytes = footer.encode();
    assert_eq!(bytes.len(), 36 + 1000 * 16);

    let copy = read_back(&bytes).unwrap();
    assert_eq!(copy.entries.len(), 1000);
    assert_eq!(copy.entries[500].byte_offset, 5_000_000);
    assert_eq!(copy.entries[500].first_row, 50_000);
    assert_eq!(copy.entries[999].byte_offset, 9_990_000);
    assert_eq!(copy.total_row_count, 100_000);
}

#[test]
fn corrupt_begin_marker_fails() {
    let mut bytes = sample_footer().encode();
    bytes[0] = b'X';
    assert!(read_back(&bytes).is_err());
}

#[test]
fn corrupt_end_marker_fails() {
    let footer = sample_footer();
    let mut bytes = footer.encode();
    let end_at = 4 + footer.entries.len() * INDEX_ENTRY_SIZE;
    bytes[end_at] = b'X';
    assert!(read_back(&bytes).is_err());
}

#[test]
fn corrupt_directory_byte_fails() {
    let footer = sample_footer();
    for at in (4..4 + footer.entries.len() * INDEX_ENTRY_SIZE).step_by(5) {
        let mut bytes = footer.encode();
        bytes[at] ^= 0xFF;
        assert!(read_back(&bytes).is_err(), "corrupt byte {at} must fail");
    }
}

#[test]
fn corrupt_tail_checksum_fails() {
    let mut bytes = sample_footer().encode();
    let len = bytes.len();
    bytes[len - 1] ^= 0xFF;
    assert!(read_back(&bytes).is_err());
}

#[test]
fn corrupt_totals_fail() {
    // total_row_count is covered by the directory checksum
    let mut bytes = sample_footer().encode();
    let len = bytes.len();
    bytes[len - 9] ^= 0x01;
    assert!(read_back(&bytes).is_err());
}

#[test]
fn garbage_is_rejected() {
    let bytes = b"some random data without an index, long enough to hold a tail";
    assert!(read_back(bytes).is_err());
}

#[test]
fn short_stream_is_rejected() {
    assert!(read_back(&[0u8; 10]).is_err());
}

#[test]
fn non_monotonic_directory_is_rejected() {
    let mut footer = FileFooter::new();
    footer.entries.push(PacketIndexEntry::new(100, 0));
    footer.entries.push(PacketIndexEntry::new(90, 50)); // offsets regress
    footer.total_row_count = 100;
    let bytes = footer.encode();
    assert!(read_back(&bytes).is_err());
}

#[test]
fn first_entry_must_start_at_row_zero() {
    let mut footer = FileFooter::new();
    footer.entries.push(PacketIndexEntry::new(100, 5));
    footer.total_row_count = 100;
    let bytes = footer.encode();
    assert!(read_back(&bytes).is_err());
}

#[test]
fn locate_binary_search() {
    let footer = sample_footer();
    assert_eq!(footer.locate(0), Some(0));
    assert_eq!(footer.locate(999), Some(0));
    assert_eq!(footer.locate(1000), Some(1));
    assert_eq!(footer.locate(2500), Some(2));
    assert_eq!(footer.locate(3999), Some(3));
    assert_eq!(footer.locate(u64::MAX), Some(3));
    assert_eq!(FileFooter::new().locate(0), None);
}

#[test]
fn rows_in_packet_uses_neighbours_and_total() {
    let footer = sample_footer();
    assert_eq!(footer.rows_in_packet(0), 1000);
    assert_eq!(footer.rows_in_packet(2), 1000);
    assert_eq!(footer.rows_in_packet(3), 1000);
}

#[test]
fn clear_resets_everything() {
    let mut footer = sample_footer();
    footer.clear();
    assert!(footer.entries.is_empty());
    assert_eq!(footer.total_row_count, 0);
    assert_eq!(footer.last_payload_checksum, 0);
    assert_eq!(footer.encoded_size(), FOOTER_MIN_SIZE);
}

#[test]
fn extreme_offsets_roundtrip() {
    let mut footer = FileFooter::new();
    footer.entries.push(PacketIndexEntry::new(u64::MAX, 0));
    footer.total_row_count = u64::MAX;
    footer.last_payload_checksum = u64::MAX;
    let bytes = footer.encode();
    let copy = read_back(&bytes).unwrap();
    assert_eq!(copy, footer);
}
