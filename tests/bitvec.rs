// Bit-vector parity tests: every operation must match a per-bit reference
// implementation across a sweep of sizes, fill patterns, and shift
// amounts, including all word-boundary alignments.

use bcsv::bitvec::{BitVec, Bits, FixedBitVec};

const SIZES: &[usize] = &[
    1, 2, 3, 4, 5, 6, 7, 8, 32, 63, 64, 65, 127, 128, 255, 1024, 8192, 65536,
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pattern {
    AllZero,
    AllOne,
    Alternating,
    EveryThird,
    SingleMid,
}

const PATTERNS: &[Pattern] = &[
    Pattern::AllZero,
    Pattern::AllOne,
    Pattern::Alternating,
    Pattern::EveryThird,
    Pattern::SingleMid,
];

fn pattern_bit(p: Pattern, i: usize, n: usize) -> bool {
    match p {
        Pattern::AllZero => false,
        Pattern::AllOne => true,
        Pattern::Alternating => i % 2 == 0,
        Pattern::EveryThird => i % 3 == 0,
        Pattern::SingleMid => i == n / 2,
    }
}

/// Per-bit reference model.
#[derive(Debug, Clone, PartialEq)]
struct RefBits(Vec<bool>);

impl RefBits {
    fn new(n: usize, p: Pattern) -> Self {
        RefBits((0..n).map(|i| pattern_bit(p, i, n)).collect())
    }

    fn count(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }

    fn shifted_left(&self, k: usize) -> Self {
        let n = self.0.len();
        RefBits(
            (0..n)
                .map(|i| i >= k && self.0[i - k])
                .collect(),
        )
    }

    fn shifted_right(&self, k: usize) -> Self {
        let n = self.0.len();
        RefBits(
            (0..n)
                .map(|i| i + k < n && self.0[i + k])
                .collect(),
        )
    }

    fn zip(&self, other: &Self, f: impl Fn(bool, bool) -> bool) -> Self {
        RefBits(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        )
    }

    fn not(&self) -> Self {
        RefBits(self.0.iter().map(|&b| !b).collect())
    }
}

fn make(n: usize, p: Pattern) -> BitVec {
    let mut v = BitVec::new(n);
    for i in 0..n {
        if pattern_bit(p, i, n) {
            v.set(i);
        }
    }
    v
}

fn assert_parity(actual: &impl Bits, expected: &RefBits, context: &str) {
    assert_eq!(actual.bit_len(), expected.0.len(), "{context}: length");
    for (i, &want) in expected.0.iter().enumerate() {
        assert_eq!(actual.test(i), want, "{context}: bit {i}");
    }
    assert_eq!(actual.count(), expected.count(), "{context}: count");
    assert_eq!(actual.any(), expected.count() > 0, "{context}: any");
    assert_eq!(
        actual.all(),
        expected.count() == expected.0.len(),
        "{context}: all"
    );
    assert_eq!(actual.none(), expected.count() == 0, "{context}: none");
}

fn shift_amounts(n: usize) -> Vec<usize> {
    let mut v = vec![0, 1, 2, 3, 7, 8, 15, 31, 63, 64, 65, n.saturating_sub(1), n, n + 1];
    v.sort_unstable();
    v.dedup();
    v
}

#[test]
fn pattern_construction_matches_reference() {
    for &n in SIZES {
        for &p in PATTERNS {
            let v = make(n, p);
            let r = RefBits::new(n, p);
            assert_parity(&v, &r, &format!("construct n={n} p={p:?}"));
        }
    }
}

#[test]
fn bitwise_ops_match_reference() {
    for &n in SIZES {
        for &pa in PATTERNS {
            for &pb in PATTERNS {
                let ra = RefBits::new(n, pa);
                let rb = RefBits::new(n, pb);

                let mut v = make(n, pa);
                v.and_assign(&make(n, pb));
                assert_parity(&v, &ra.zip(&rb, |a, b| a & b), &format!("and n={n}"));

                let mut v = make(n, pa);
                v.or_assign(&make(n, pb));
                assert_parity(&v, &ra.zip(&rb, |a, b| a | b), &format!("or n={n}"));

                let mut v = make(n, pa);
                v.xor_assign(&make(n, pb));
                assert_parity(&v, &ra.zip(&rb, |a, b| a ^ b), &format!("xor n={n}"));
            }

            let mut v = make(n, pa);
            v.not_assign();
            assert_parity(&v, &RefBits::new(n, pa).not(), &format!("not n={n}"));
        }
    }
}

#[test]
fn shifts_match_reference() {
    for &n in SIZES {
        for &p in PATTERNS {
            let r = RefBits::new(n, p);
            for k in shift_amounts(n) {
                let mut v = make(n, p);
                v.shift_left(k);
                assert_parity(&v, &r.shifted_left(k), &format!("shl n={n} k={k}"));

                let mut v = make(n, p);
                v.shift_right(k);
                assert_parity(&v, &r.shifted_right(k), &format!("shr n={n} k={k}"));
            }
        }
    }
}

fn ranges(n: usize) -> Vec<(usize, usize)> {
    let mut v = vec![
        (0, 0),
        (0, n),
        (0, 1.min(n)),
        (n / 3, 2 * n / 3),
        (n.saturating_sub(1), n),
    ];
    if n >= 65 {
        v.push((63, 65));
        v.push((64, n));
        v.push((1, 64));
    }
    if n >= 129 {
        v.push((64, 128));
        v.push((65, 127));
    }
    v
}

#[test]
fn equal_range_matches_reference() {
    for &n in SIZES {
        for &pa in PATTERNS {
            for &pb in PATTERNS {
                let a = make(n, pa);
                let b = make(n, pb);
                let ra = RefBits::new(n, pa);
                let rb = RefBits::new(n, pb);
                for (lo, hi) in ranges(n) {
                    let want = ra.0[lo..hi] == rb.0[lo..hi];
                    assert_eq!(
                        a.equal_range(&b, lo, hi),
                        want,
                        "equal_range n={n} [{lo},{hi}) {pa:?} vs {pb:?}"
                    );
                }
            }
        }
    }
}

#[test]
fn assign_range_matches_reference() {
    for &n in SIZES {
        for &pa in PATTERNS {
            for &pb in PATTERNS {
                for (lo, hi) in ranges(n) {
                    let mut a = make(n, pa);
                    let b = make(n, pb);
                    a.assign_range(&b, lo, hi);
                    let mut want = RefBits::new(n, pa);
                    let src = RefBits::new(n, pb);
                    want.0[lo..hi].copy_from_slice(&src.0[lo..hi]);
                    assert_parity(&a, &want, &format!("assign_range n={n} [{lo},{hi})"));
                }
            }
        }
    }
}

#[test]
fn fixed_flavor_matches_dynamic() {
    for &n in &[1usize, 7, 8, 63, 64, 65, 127, 128] {
        for &p in PATTERNS {
            let mut fixed = FixedBitVec::<2>::new(n);
            for i in 0..n {
                if pattern_bit(p, i, n) {
                    fixed.set(i);
                }
            }
            let r = RefBits::new(n, p);
            assert_parity(&fixed, &r, &format!("fixed n={n} p={p:?}"));

            let mut shifted = fixed;
            shifted.shift_left(7);
            assert_parity(&shifted, &r.shifted_left(7), &format!("fixed shl n={n}"));

            assert_eq!(fixed.format_bits(), make(n, p).format_bits());
        }
    }

    let mut large = FixedBitVec::<16>::new(1024);
    large.set(0);
    large.set(1023);
    assert_eq!(large.count(), 2);
    large.shift_right(1023);
    assert!(large.test(0));
    assert_eq!(large.count(), 1);
}

#[test]
fn display_is_msb_first() {
    let mut v = BitVec::new(4);
    v.set(0);
    // bit 0 prints last
    assert_eq!(v.to_string(), "0001");
    v.set(3);
    assert_eq!(v.to_string(), "1001");
}

#[test]
fn flip_set_reset_roundtrip() {
    let mut v = BitVec::new(130);
    v.flip(129);
    assert!(v.test(129));
    v.flip(129);
    assert!(v.none());
    v.set_all();
    assert!(v.all());
    assert_eq!(v.count(), 130);
    v.reset(64);
    assert!(!v.all());
    assert_eq!(v.count(), 129);
    v.reset_all();
    assert!(v.none());
}

#[test]
fn resize_preserves_low_bits() {
    let mut v = BitVec::new(70);
    v.set(0);
    v.set(69);
    v.resize(40);
    assert!(v.test(0));
    assert_eq!(v.count(), 1);
    v.resize(200);
    assert!(v.test(0));
    assert_eq!(v.count(), 1);
    assert!(!v.test(69));
}
