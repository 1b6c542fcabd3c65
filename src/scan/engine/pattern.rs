//! Byte pattern parsing and anchored search.
//!
//! Patterns are hex byte tokens with nibble wildcards, e.g. `"1A ?B D? ??"`.
//! Each byte compiles to a `(value, mask)` pair; a `?` nibble zeroes the
//! corresponding mask nibble. The search anchors on the first fully fixed
//! non-zero byte and memchr-skips to its occurrences.

use crate::scan::encoder::RunLengthEncoder;
use anyhow::{Result, anyhow};
use memchr::memchr_iter;

/// Parse a pattern string into `(value, mask)` byte pairs.
pub fn parse_pattern(text: &str) -> Result<Vec<(u8, u8)>> {
    let mut pattern = Vec::new();
    for token in text.split_whitespace() {
        if token.len() != 2 {
            return Err(anyhow!("pattern byte '{token}' must be two hex digits or '?'"));
        }
        let mut value = 0u8;
        let mut mask = 0u8;
        for ch in token.chars() {
            value <<= 4;
            mask <<= 4;
            match ch {
                '?' => {},
                _ => {
                    let nibble = ch
                        .to_digit(16)
                        .ok_or_else(|| anyhow!("invalid hex digit '{ch}' in pattern byte '{token}'"))?;
                    value |= nibble as u8;
                    mask |= 0x0F;
                },
            }
        }
        pattern.push((value, mask));
    }
    if pattern.is_empty() {
        return Err(anyhow!("empty pattern"));
    }
    Ok(pattern)
}

#[inline]
fn matches_at(pattern: &[(u8, u8)], window: &[u8]) -> bool {
    pattern
        .iter()
        .zip(window.iter())
        .all(|(&(value, mask), &byte)| byte & mask == value & mask)
}

/// Index and value of the first fixed non-zero pattern byte, if any. Zero
/// anchors occur on nearly every offset of zeroed pages, so they are not
/// worth the skip machinery.
fn anchor(pattern: &[(u8, u8)]) -> Option<(usize, u8)> {
    pattern
        .iter()
        .position(|&(value, mask)| mask == 0xFF && value != 0)
        .map(|i| (i, pattern[i].0))
}

pub(super) fn scan(
    encoder: &mut RunLengthEncoder,
    pattern: &[(u8, u8)],
    current: &[u8],
    stride: usize,
    valid_length: usize,
) {
    let len = pattern.len();
    let haystack = &current[..valid_length];

    match anchor(pattern) {
        Some((anchor_index, anchor_byte)) => {
            for position in memchr_iter(anchor_byte, haystack) {
                let Some(start) = position.checked_sub(anchor_index) else {
                    continue;
                };
                if start % stride != 0 || start + len > valid_length {
                    continue;
                }
                if start < encoder.read_offset() {
                    continue;
                }
                encoder.skip_to(start);
                if matches_at(pattern, &current[start..start + len]) {
                    encoder.encode_match();
                } else {
                    encoder.encode_miss();
                }
            }
        },
        None => {
            while encoder.read_offset() + len <= valid_length {
                let start = encoder.read_offset();
                if matches_at(pattern, &current[start..start + len]) {
                    encoder.encode_match();
                } else {
                    encoder.encode_miss();
                }
            }
        },
    }
}
