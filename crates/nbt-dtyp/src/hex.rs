//! Bytes <-> hex rendering used by `Display`/`Debug` impls, doctests and
//! pernicious-message construction in tests.

/// Render `bytes` as a lowercase, unseparated hex string (`"feff"`-style).
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").unwrap();
    }
    out
}

/// Parse a hex string (no separators, even length) into bytes. Intended for
/// test fixtures, not for parsing attacker-controlled input.
pub fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Round a length up to the next multiple of 8, matching the 8-byte
/// alignment padding used by several SMB2 variable-length fields.
pub fn align8(len: usize) -> usize {
    len.div_ceil(8) * 8
}

/// A classic 16-octets-per-line hex dump: offset, hex bytes, ASCII gutter.
pub fn hexdump(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    for (line_no, chunk) in bytes.chunks(16).enumerate() {
        write!(out, "{:08x}  ", line_no * 16).unwrap();
        for (i, b) in chunk.iter().enumerate() {
            write!(out, "{b:02x} ").unwrap();
            if i == 7 {
                out.push(' ');
            }
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push_str(" |");
        for b in chunk {
            let c = if b.is_ascii_graphic() || *b == b' ' {
                *b as char
            } else {
                '.'
            };
            out.push(c);
        }
        out.push_str("|\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let bytes = [0xfe, 0x53, 0x4d, 0x42, 0x00];
        assert_eq!(from_hex(&to_hex(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn align8_rounds_up() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(9), 16);
    }

    #[test]
    fn hexdump_wraps_at_16() {
        let dump = hexdump(b"0123456789abcdefgh");
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.lines().next().unwrap().ends_with("|0123456789abcdef|"));
    }
}
