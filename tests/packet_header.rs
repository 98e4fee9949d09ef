// Packet header: fixed 24-byte wire form, self checksum, and the
// chain-link field that ties each packet to its predecessor's payload.

use std::io::Cursor;

use bcsv::file::packet::{PacketHeader, PACKET_HEADER_SIZE, PACKET_MAGIC};

#[test]
fn encoded_size_is_24_bytes() {
    assert_eq!(PACKET_HEADER_SIZE, 24);
    let header = PacketHeader::new(0, 0);
    assert_eq!(header.encode().len(), 24);
}

#[test]
fn field_offsets() {
    let header = PacketHeader::new(0x1122_3344_5566_7788, 0x99AA_BBCC_DDEE_FF00);
    let bytes = header.encode();
    assert_eq!(&bytes[0..4], &PACKET_MAGIC);
    assert_eq!(
        u64::from_le_bytes(bytes[4..12].try_into().unwrap()),
        0x1122_3344_5566_7788
    );
    assert_eq!(
        u64::from_le_bytes(bytes[12..20].try_into().unwrap()),
        0x99AA_BBCC_DDEE_FF00
    );
}

#[test]
fn binary_io_roundtrip() {
    let original = PacketHeader::new(12345, 0xFEDC_BA98_7654_3210);
    let mut buf = Vec::new();
    original.write_to(&mut buf).unwrap();
    assert_eq!(buf.len(), PACKET_HEADER_SIZE);

    let copy = PacketHeader::read_from(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(copy, original);
}

#[test]
fn decode_rejects_bad_magic() {
    let mut bytes = PacketHeader::new(100, 0).encode();
    bytes[0] = b'X';
    assert!(PacketHeader::decode(&bytes).is_err());
}

#[test]
fn decode_rejects_bad_checksum() {
    let mut bytes = PacketHeader::new(100, 0).encode();
    bytes[20] ^= 0xFF;
    assert!(PacketHeader::decode(&bytes).is_err());
}

#[test]
fn decode_rejects_corrupted_field() {
    let mut bytes = PacketHeader::new(100, 7).encode();
    bytes[5] ^= 0x01; // first_row_index no longer matches the checksum
    assert!(PacketHeader::decode(&bytes).is_err());
}

#[test]
fn checksum_chain_simulation() {
    let packet1_payload_checksum = 0xAAAA_AAAA_AAAA_AAAA_u64;
    let packet2_payload_checksum = 0xBBBB_BBBB_BBBB_BBBB_u64;

    let packet1 = PacketHeader::new(0, 0);
    let packet2 = PacketHeader::new(1000, packet1_payload_checksum);
    let packet3 = PacketHeader::new(2000, packet2_payload_checksum);

    assert_eq!(packet1.prev_payload_checksum, 0);
    assert_eq!(packet2.prev_payload_checksum, packet1_payload_checksum);
    assert_eq!(packet3.prev_payload_checksum, packet2_payload_checksum);

    for header in [packet1, packet2, packet3] {
        let bytes = header.encode();
        assert_eq!(PacketHeader::decode(&bytes).unwrap(), header);
    }
}

#[test]
fn extreme_values_roundtrip() {
    for header in [
        PacketHeader::new(0, 0),
        PacketHeader::new(u64::MAX, u64::MAX),
    ] {
        let bytes = header.encode();
        assert_eq!(PacketHeader::decode(&bytes).unwrap(), header);
    }
}
