// Checksum contracts: known reference vectors, determinism, and the
// streaming-equals-one-shot property both widths must satisfy.

use bcsv::checksum::{checksum32, checksum64, Checksum32State, Checksum64State};

/// Canonical XXH32 value for empty input, seed 0.
#[test]
fn checksum32_empty_known_vector() {
    assert_eq!(checksum32(b""), 0x02CC5D05);
}

/// Canonical XXH64 value for empty input, seed 0.
#[test]
fn checksum64_empty_known_vector() {
    assert_eq!(checksum64(b""), 0xEF46_DB37_51D8_E999);
}

#[test]
fn deterministic_and_input_sensitive() {
    let data = b"binary columnar telemetry";
    assert_eq!(checksum32(data), checksum32(data));
    assert_eq!(checksum64(data), checksum64(data));
    assert_ne!(checksum32(data), checksum32(b"binary columnar telemetrz"));
    assert_ne!(checksum64(data), checksum64(b"binary columnar telemetrz"));
}

#[test]
fn streaming32_equals_oneshot() {
    let data: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
    for chunk_size in [1usize, 3, 16, 17, 64, 1000, 10_000] {
        let mut state = Checksum32State::new(0);
        for chunk in data.chunks(chunk_size) {
            state.update(chunk);
        }
        assert_eq!(
            state.digest(),
            checksum32(&data),
            "chunk size {chunk_size} must match one-shot"
        );
    }
}

#[test]
fn streaming64_equals_oneshot() {
    let data: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
    for chunk_size in [1usize, 7, 32, 33, 4096, 10_000] {
        let mut state = Checksum64State::new(0);
        for chunk in data.chunks(chunk_size) {
            state.update(chunk);
        }
        assert_eq!(
            state.digest(),
            checksum64(&data),
            "chunk size {chunk_size} must match one-shot"
        );
    }
}

#[test]
fn streaming_over_uneven_boundaries() {
    let a = b"packet payload ";
    let b = b"split across ";
    let c = b"three updates";
    let whole: Vec<u8> = [a.as_slice(), b, c].concat();

    let mut state = Checksum64State::new(0);
    state.update(a);
    state.update(b);
    state.update(c);
    assert_eq!(state.digest(), checksum64(&whole));
}
