//! Checksums, packet framing and the number syntax used inside packet bodies.

use bytes::{BufMut, Bytes, BytesMut};

/// Modulo-256 sum of the packet body.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Frame a body as `$<body>#<checksum>` with a lowercase two digit checksum.
pub fn frame(body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(body.len() + 4);
    out.put_u8(b'$');
    out.put_slice(body);
    out.put_u8(b'#');
    out.put_slice(format!("{:02x}", checksum(body)).as_bytes());
    out.freeze()
}

/// Parse an unprefixed hex number as used for addresses, lengths and ids.
pub fn parse_hex(text: &[u8]) -> Option<u64> {
    if text.is_empty() || text.len() > 16 {
        return None;
    }
    text.iter()
        .try_fold(0u64, |acc, &c| Some((acc << 4) | u64::from(hex_digit(c)?)))
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Undo the `0x7d` escaping used for binary payloads (`X` packets).
pub fn unescape_binary(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut escaped = false;
    for &b in data {
        if escaped {
            out.push(b ^ 0x20);
            escaped = false;
        } else if b == 0x7d {
            escaped = true;
        } else {
            out.push(b);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(b"OK"), 0x9a);
        assert_eq!(checksum(&[0xff, 0x02]), 0x01);
    }

    #[test]
    fn frame_uses_lowercase_hex() {
        assert_eq!(&frame(b"qSupported")[..], b"$qSupported#37");
        assert_eq!(&frame(b"")[..], b"$#00");
    }

    #[test]
    fn hex_numbers() {
        assert_eq!(parse_hex(b"1000"), Some(0x1000));
        assert_eq!(parse_hex(b"DEadBEEF"), Some(0xdead_beef));
        assert_eq!(parse_hex(b""), None);
        assert_eq!(parse_hex(b"-1"), None);
    }

    #[test]
    fn binary_escapes() {
        assert_eq!(unescape_binary(&[0x01, 0x7d, 0x5d, 0x02]), vec![0x01, 0x7d, 0x02]);
        assert_eq!(unescape_binary(&[0x7d, 0x03]), vec![0x23]);
    }
}
