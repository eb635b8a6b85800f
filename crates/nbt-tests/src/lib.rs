//! Hex-literal based round-trip testing helpers, used by every codec crate's
//! `#[cfg(test)] mod tests`.

/// Parse a hex string (no separators, even length) into bytes.
pub fn hex(s: &str) -> Vec<u8> {
    assert!(s.len() % 2 == 0, "hex literal must have an even length");
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("invalid hex literal"))
        .collect()
}

/// Render bytes as a lowercase hex string, for comparison against a hex literal.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").unwrap();
    }
    out
}

/// Assert that writing `$val` produces exactly `$hex`, and that reading
/// `$hex` back produces a value equal to `$val`.
///
/// ```ignore
/// test_binrw! {
///     Header => logoff: Header { command: Command::Logoff, .. } => "fe534d42..."
/// }
/// ```
#[macro_export]
macro_rules! test_binrw {
    ($ty:ty => $name:ident : $val:expr => $hex:expr) => {
        #[test]
        fn $name() {
            let expected = $crate::hex($hex);
            let val: $ty = $val;

            let mut buf = ::binrw::io::Cursor::new(Vec::new());
            ::binrw::BinWrite::write_le(&val, &mut buf).expect("compose failed");
            assert_eq!(
                $crate::to_hex(buf.get_ref()),
                $crate::to_hex(&expected),
                "composed bytes did not match expected hex"
            );

            let mut cur = ::binrw::io::Cursor::new(expected);
            let parsed: $ty = ::binrw::BinRead::read_le(&mut cur).expect("parse failed");
            assert_eq!(parsed, val, "parsed value did not match expected value");
        }
    };
    (struct $ty:ident {} => $hex:expr) => {
        $crate::test_binrw! { $ty => default: <$ty>::default() => $hex }
    };
}

/// Like [`test_binrw`], but only asserts the write direction (for types that
/// intentionally don't round-trip, e.g. a composer with caller-supplied
/// defaults that a generic parser can't reconstruct).
#[macro_export]
macro_rules! test_binrw_write {
    ($ty:ty : $val:expr => $hex:expr) => {
        #[test]
        fn test_compose() {
            let expected = $crate::hex($hex);
            let val: $ty = $val;
            let mut buf = ::binrw::io::Cursor::new(Vec::new());
            ::binrw::BinWrite::write_le(&val, &mut buf).expect("compose failed");
            assert_eq!($crate::to_hex(buf.get_ref()), $crate::to_hex(&expected));
        }
    };
}
