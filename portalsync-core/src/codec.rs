//! At-rest credential obfuscation.
//!
//! This is **obfuscation, not encryption**. Each character is shifted by the
//! code point of the key character at the same position (key repeated),
//! modulo 256. It only keeps the portal password from being readable at a
//! glance in `settings.config`; anyone with this source can reverse it.
//!
//! Changing the algorithm or [`OBFUSCATION_KEY`] changes the on-disk format
//! and breaks every existing `encrypted: true` settings file.

use crate::error::CodecError;

/// Fixed key used for the settings document password.
pub const OBFUSCATION_KEY: &str = "portalsync-settings-obfuscation";

/// Shift every character of `plaintext` forward by the repeating key.
pub fn encode(key: &str, plaintext: &str) -> Result<String, CodecError> {
    shift(key, plaintext, Direction::Forward)
}

/// Reverse [`encode`].
pub fn decode(key: &str, ciphertext: &str) -> Result<String, CodecError> {
    shift(key, ciphertext, Direction::Backward)
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

fn shift(key: &str, input: &str, direction: Direction) -> Result<String, CodecError> {
    let key = key_bytes(key)?;
    input
        .chars()
        .enumerate()
        .map(|(position, ch)| {
            let code = u8::try_from(u32::from(ch))
                .map_err(|_| CodecError::Unrepresentable { ch, position })?;
            let k = key[position % key.len()];
            let shifted = match direction {
                Direction::Forward => code.wrapping_add(k),
                Direction::Backward => code.wrapping_sub(k),
            };
            Ok(char::from(shifted))
        })
        .collect()
}

fn key_bytes(key: &str) -> Result<Vec<u8>, CodecError> {
    if key.is_empty() {
        return Err(CodecError::EmptyKey);
    }
    key.chars()
        .enumerate()
        .map(|(position, ch)| {
            u8::try_from(u32::from(ch)).map_err(|_| CodecError::Unrepresentable { ch, position })
        })
        .collect()
}
