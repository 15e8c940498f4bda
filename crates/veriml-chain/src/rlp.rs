//! Minimal recursive-length-prefix encoding for typed transaction envelopes.

/// Encode a byte string.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        return data.to_vec();
    }
    let mut out = length_prefix(0x80, data.len());
    out.extend_from_slice(data);
    out
}

/// Encode an unsigned integer given in big-endian bytes (leading zeros are stripped).
pub fn encode_uint_be(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    encode_bytes(&bytes[first..])
}

/// Encode an unsigned integer.
pub fn encode_u128(value: u128) -> Vec<u8> {
    encode_uint_be(&value.to_be_bytes())
}

/// Encode a list whose items are already encoded.
pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(Vec::len).sum();
    let mut out = length_prefix(0xc0, payload_len);
    out.reserve(payload_len);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn length_prefix(offset: u8, len: usize) -> Vec<u8> {
    if len <= 55 {
        return vec![offset + len as u8];
    }
    let len_bytes = len.to_be_bytes();
    let first = len_bytes.iter().position(|b| *b != 0).unwrap_or(len_bytes.len() - 1);
    let len_bytes = &len_bytes[first..];
    let mut out = Vec::with_capacity(1 + len_bytes.len());
    out.push(offset + 55 + len_bytes.len() as u8);
    out.extend_from_slice(len_bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_string() {
        assert_eq!(encode_bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);
    }

    #[test]
    fn empty_string_and_zero() {
        assert_eq!(encode_bytes(b""), vec![0x80]);
        assert_eq!(encode_u128(0), vec![0x80]);
    }

    #[test]
    fn single_low_byte_is_its_own_encoding() {
        assert_eq!(encode_u128(15), vec![0x0f]);
        assert_eq!(encode_bytes(&[0x7f]), vec![0x7f]);
        assert_eq!(encode_bytes(&[0x80]), vec![0x81, 0x80]);
    }

    #[test]
    fn multi_byte_integer() {
        assert_eq!(encode_u128(1024), vec![0x82, 0x04, 0x00]);
    }

    #[test]
    fn list_of_strings() {
        let list = encode_list(&[encode_bytes(b"cat"), encode_bytes(b"dog")]);
        assert_eq!(
            list,
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
        assert_eq!(encode_list(&[]), vec![0xc0]);
    }

    #[test]
    fn long_string_uses_length_of_length() {
        let data = vec![b'a'; 56];
        let encoded = encode_bytes(&data);
        assert_eq!(&encoded[..2], &[0xb8, 56]);
        assert_eq!(encoded.len(), 58);

        let data = vec![0u8; 1024];
        let encoded = encode_bytes(&data);
        assert_eq!(&encoded[..3], &[0xb9, 0x04, 0x00]);
    }

    #[test]
    fn long_list_prefix() {
        let items: Vec<Vec<u8>> = (0..20).map(|_| encode_bytes(b"abc")).collect();
        let encoded = encode_list(&items);
        assert_eq!(&encoded[..2], &[0xf8, 80]);
    }
}
