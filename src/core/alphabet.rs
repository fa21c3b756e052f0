//! Positional integer codec over the two on-disk alphabets.
//!
//! Values are written most-significant digit first. The legacy alphabet has
//! 93 symbols and accumulates with `value * 93 + digit`; the current alphabet
//! has 64 symbols and accumulates with `(value << 6) | digit`. Both decode
//! tables are built once and never mutated, so they can be shared freely
//! across threads.
//!
//! Bytes outside the active alphabet decode as digit 0. Callers hand this
//! layer tokens that came out of a record stream; it does not validate them.
use std::sync::LazyLock;

use serde::Serialize;

const LEGACY_SYMBOLS: &[u8; 93] = b"0123456789\
ABCDEFGHIJKLMNOPQRSTUVWXYZ\
abcdefghijklmnopqrstuvwxyz\
!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}";

const CURRENT_SYMBOLS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Longest encoding of `u64::MAX`: the current alphabet needs 11 digits; legacy needs 10.
pub const MAX_ENCODED_LEN: usize = 11;

static LEGACY_DECODE: LazyLock<[u8; 256]> = LazyLock::new(|| decode_table(LEGACY_SYMBOLS));
static CURRENT_DECODE: LazyLock<[u8; 256]> = LazyLock::new(|| decode_table(CURRENT_SYMBOLS));

fn decode_table(symbols: &[u8]) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (index, &symbol) in symbols.iter().enumerate() {
        table[symbol as usize] = index as u8;
    }
    table
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alphabet {
    Legacy,
    Current,
}

/// Separator written after an encoded value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Sep {
    Space,
    Newline,
}

impl Sep {
    pub fn byte(self) -> u8 {
        match self {
            Sep::Space => b' ',
            Sep::Newline => b'\n',
        }
    }
}

impl Alphabet {
    pub fn symbols(self) -> &'static [u8] {
        match self {
            Alphabet::Legacy => LEGACY_SYMBOLS,
            Alphabet::Current => CURRENT_SYMBOLS,
        }
    }

    pub fn radix(self) -> u64 {
        self.symbols().len() as u64
    }

    /// Encode `value` into `out` (most significant digit first) and return the digit count.
    pub fn encode_into(self, mut value: u64, out: &mut [u8; MAX_ENCODED_LEN]) -> usize {
        let symbols = self.symbols();
        let radix = self.radix();
        let mut pos = MAX_ENCODED_LEN;
        loop {
            pos -= 1;
            out[pos] = symbols[(value % radix) as usize];
            value /= radix;
            if value == 0 {
                break;
            }
        }
        let len = MAX_ENCODED_LEN - pos;
        out.copy_within(pos.., 0);
        len
    }

    pub fn encode(self, value: u64) -> String {
        let mut buf = [0u8; MAX_ENCODED_LEN];
        let len = self.encode_into(value, &mut buf);
        buf[..len].iter().map(|&b| b as char).collect()
    }

    pub fn decode(self, token: &[u8]) -> u64 {
        match self {
            Alphabet::Legacy => {
                let table = &*LEGACY_DECODE;
                token.iter().fold(0u64, |value, &byte| {
                    value
                        .wrapping_mul(93)
                        .wrapping_add(u64::from(table[byte as usize]))
                })
            }
            Alphabet::Current => {
                let table = &*CURRENT_DECODE;
                token.iter().fold(0u64, |value, &byte| {
                    (value << 6) | u64::from(table[byte as usize])
                })
            }
        }
    }
}

/// Integer widths that can be stored through the codec.
///
/// Reads narrow the decoded `u64` with `as` semantics (silent truncation), and
/// writes widen with sign extension, so a negative `i32` written and read back
/// as `i32` survives unchanged.
pub trait Narrow: Copy {
    fn from_wide(value: u64) -> Self;
    fn to_wide(self) -> u64;
}

macro_rules! impl_narrow {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Narrow for $ty {
                fn from_wide(value: u64) -> Self {
                    value as $ty
                }

                fn to_wide(self) -> u64 {
                    self as u64
                }
            }
        )*
    };
}

impl_narrow!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

#[cfg(test)]
mod tests {
    use super::{Alphabet, MAX_ENCODED_LEN, Narrow, Sep};
    use proptest::prelude::*;

    const SAMPLES: [u64; 7] = [0, 1, 63, 64, 4095, (1 << 32) - 1, u64::MAX];

    #[test]
    fn alphabets_have_expected_radix_and_unique_symbols() {
        for (alphabet, radix) in [(Alphabet::Legacy, 93), (Alphabet::Current, 64)] {
            assert_eq!(alphabet.radix(), radix);
            let mut seen = std::collections::HashSet::new();
            for &symbol in alphabet.symbols() {
                assert!(symbol.is_ascii_graphic(), "{symbol} is not printable");
                assert!(seen.insert(symbol), "duplicate symbol {}", symbol as char);
            }
        }
    }

    #[test]
    fn legacy_alphabet_never_uses_tilde() {
        assert!(!Alphabet::Legacy.symbols().contains(&b'~'));
    }

    #[test]
    fn zero_encodes_as_single_digit() {
        assert_eq!(Alphabet::Current.encode(0), "A");
        assert_eq!(Alphabet::Legacy.encode(0), "0");
    }

    #[test]
    fn current_encoding_matches_base64_digits() {
        assert_eq!(Alphabet::Current.encode(63), "/");
        assert_eq!(Alphabet::Current.encode(64), "BA");
        assert_eq!(Alphabet::Current.encode(4095), "//");
        assert_eq!(Alphabet::Current.encode(u64::MAX), "P//////////");
    }

    #[test]
    fn legacy_encoding_uses_radix_93() {
        assert_eq!(Alphabet::Legacy.encode(92), "}");
        assert_eq!(Alphabet::Legacy.encode(93), "10");
        assert_eq!(Alphabet::Legacy.decode(b"10"), 93);
    }

    #[test]
    fn sample_values_round_trip_in_both_alphabets() {
        for alphabet in [Alphabet::Legacy, Alphabet::Current] {
            for value in SAMPLES {
                let encoded = alphabet.encode(value);
                assert_eq!(alphabet.decode(encoded.as_bytes()), value, "{alphabet:?} {value}");
            }
        }
    }

    #[test]
    fn encodings_fit_the_fixed_buffer() {
        let mut buf = [0u8; MAX_ENCODED_LEN];
        assert_eq!(Alphabet::Current.encode_into(u64::MAX, &mut buf), MAX_ENCODED_LEN);
        assert_eq!(Alphabet::Legacy.encode_into(u64::MAX, &mut buf), 10);
    }

    #[test]
    fn unknown_bytes_decode_as_zero_digit() {
        assert_eq!(Alphabet::Current.decode(b"~"), 0);
        assert_eq!(Alphabet::Current.decode(b"B~"), 64);
        assert_eq!(Alphabet::Legacy.decode(b"1~"), 93);
    }

    #[test]
    fn separators_map_to_bytes() {
        assert_eq!(Sep::Space.byte(), b' ');
        assert_eq!(Sep::Newline.byte(), b'\n');
    }

    #[test]
    fn narrowing_truncates_silently() {
        assert_eq!(u8::from_wide(0x1_02), 0x02);
        assert_eq!(u16::from_wide(0xdead_beef), 0xbeef);
        assert_eq!(i32::from_wide((-5i32).to_wide()), -5);
        assert_eq!(i8::from_wide(0xff), -1);
        assert_eq!((-1i64).to_wide(), u64::MAX);
    }

    proptest! {
        #[test]
        fn current_round_trips_any_u64(value in any::<u64>()) {
            let encoded = Alphabet::Current.encode(value);
            prop_assert_eq!(Alphabet::Current.decode(encoded.as_bytes()), value);
        }

        #[test]
        fn legacy_round_trips_any_u64(value in any::<u64>()) {
            let encoded = Alphabet::Legacy.encode(value);
            prop_assert_eq!(Alphabet::Legacy.decode(encoded.as_bytes()), value);
        }
    }
}
