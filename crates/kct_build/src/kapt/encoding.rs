//! kapt の `apoptions` / `javacArguments` 値のエンコード。
//!
//! レイアウトは `java.io.DataOutputStream` の `writeInt` / `writeUTF` と互換:
//! big-endian i32 のエントリ数に続けて、キーと値を `writeUTF` 形式
//! (u16 長 + modified UTF-8) で並べ、改行なしの base64 にする。

use crate::BuildError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::BTreeMap;

const MAX_UTF_LENGTH: usize = u16::MAX as usize;

/// Encode `options` into the single string value kapt expects.
pub fn encode_options(options: &BTreeMap<String, String>) -> Result<String, BuildError> {
    let count = i32::try_from(options.len()).map_err(|_| BuildError::OptionEncoding {
        key: String::new(),
        reason: format!("{} entries exceed the record count range", options.len()),
    })?;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&count.to_be_bytes());
    for (key, value) in options {
        write_utf(&mut bytes, key, key)?;
        write_utf(&mut bytes, value, key)?;
    }

    Ok(STANDARD.encode(bytes))
}

/// Inverse of [`encode_options`].
pub fn decode_options(encoded: &str) -> Result<BTreeMap<String, String>, BuildError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|error| decode_error(format!("invalid base64: {error}")))?;

    let mut reader = Reader { bytes: &bytes, offset: 0 };
    let count = i32::from_be_bytes(reader.take_array()?);
    if count < 0 {
        return Err(decode_error(format!("negative entry count {count}")));
    }

    let mut options = BTreeMap::new();
    for _ in 0..count {
        let key = reader.read_utf()?;
        let value = reader.read_utf()?;
        options.insert(key, value);
    }

    if reader.offset != bytes.len() {
        return Err(decode_error(format!(
            "{} trailing bytes after {count} entries",
            bytes.len() - reader.offset
        )));
    }
    Ok(options)
}

fn write_utf(out: &mut Vec<u8>, value: &str, key: &str) -> Result<(), BuildError> {
    let mut encoded = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => encoded.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                encoded.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                encoded.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                encoded.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                encoded.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                encoded.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }

    if encoded.len() > MAX_UTF_LENGTH {
        return Err(BuildError::OptionEncoding {
            key: key.to_string(),
            reason: format!(
                "encoded length {} exceeds {MAX_UTF_LENGTH} bytes",
                encoded.len()
            ),
        });
    }

    out.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
    out.extend_from_slice(&encoded);
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], BuildError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| decode_error(format!("truncated record at byte {}", self.offset)))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], BuildError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn read_utf(&mut self) -> Result<String, BuildError> {
        let len = u16::from_be_bytes(self.take_array()?) as usize;
        let data = self.take(len)?;

        let mut units = Vec::with_capacity(len);
        let mut index = 0;
        while index < data.len() {
            let first = data[index] as u16;
            let (unit, width) = match first >> 4 {
                0x0..=0x7 => (first, 1),
                0xC | 0xD => {
                    let second = continuation(data, index + 1)?;
                    (((first & 0x1F) << 6) | second, 2)
                }
                0xE => {
                    let second = continuation(data, index + 1)?;
                    let third = continuation(data, index + 2)?;
                    (((first & 0x0F) << 12) | (second << 6) | third, 3)
                }
                _ => return Err(decode_error(format!("malformed UTF byte {first:#04x}"))),
            };
            units.push(unit);
            index += width;
        }

        String::from_utf16(&units).map_err(|error| decode_error(error.to_string()))
    }
}

fn continuation(data: &[u8], index: usize) -> Result<u16, BuildError> {
    match data.get(index) {
        Some(byte) if byte & 0xC0 == 0x80 => Ok((byte & 0x3F) as u16),
        _ => Err(decode_error("malformed UTF continuation byte".to_string())),
    }
}

fn decode_error(reason: String) -> BuildError {
    BuildError::OptionEncoding {
        key: String::new(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn empty_mapping_is_a_bare_zero_count() {
        let encoded = encode_options(&BTreeMap::new()).unwrap();
        assert_eq!(STANDARD.decode(&encoded).unwrap(), vec![0, 0, 0, 0]);
        assert!(decode_options(&encoded).unwrap().is_empty());
    }

    #[test]
    fn matches_data_output_stream_layout() {
        let encoded = encode_options(&options(&[("key1", "val1"), ("key2", "val2")])).unwrap();
        let mut expected = vec![0, 0, 0, 2];
        for text in ["key1", "val1", "key2", "val2"] {
            expected.extend_from_slice(&[0, 4]);
            expected.extend_from_slice(text.as_bytes());
        }
        assert_eq!(STANDARD.decode(&encoded).unwrap(), expected);
        assert!(!encoded.contains('\n'));
    }

    #[test]
    fn decoding_restores_the_mapping() {
        let original = options(&[("key1", "val1"), ("key2", "val2")]);
        let decoded = decode_options(&encode_options(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn uses_modified_utf8_for_nul_and_supplementary_characters() {
        let original = options(&[("nul", "a\0b"), ("emoji", "\u{1F600}"), ("kana", "カプト")]);
        let encoded = encode_options(&original).unwrap();
        let bytes = STANDARD.decode(&encoded).unwrap();

        // NUL is the two-byte form, never a raw zero inside a string.
        let nul_value: [u8; 6] = [0x00, 0x04, b'a', 0xC0, 0x80, b'b'];
        assert!(bytes.windows(nul_value.len()).any(|window| window == nul_value));
        // A supplementary character is two three-byte surrogates.
        let emoji_value: [u8; 8] = [0x00, 0x06, 0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert!(bytes.windows(emoji_value.len()).any(|window| window == emoji_value));

        assert_eq!(decode_options(&encoded).unwrap(), original);
    }

    #[test]
    fn oversized_values_are_rejected() {
        let oversized = "x".repeat(MAX_UTF_LENGTH + 1);
        let original = options(&[("big", oversized.as_str())]);
        match encode_options(&original) {
            Err(BuildError::OptionEncoding { key, .. }) => assert_eq!(key, "big"),
            other => panic!("expected OptionEncoding error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let encoded = STANDARD.encode([0, 0, 0, 1, 0, 4, b'k']);
        assert!(decode_options(&encoded).is_err());
    }
}
