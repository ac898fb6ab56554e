//! Leading-codepoint decoding for raw argv bytes.
//!
//! Tokens reach the parser as bytes (an `OsString` is not guaranteed to be
//! UTF-8), so every place that needs a codepoint decodes it explicitly and
//! handles the failure.

/// Why a byte sequence has no valid leading codepoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,
    #[error("invalid UTF-8 lead byte 0x{0:02x}")]
    InvalidLead(u8),
    #[error("truncated UTF-8 sequence")]
    Truncated,
    #[error("malformed UTF-8 sequence")]
    Malformed,
}

/// Byte length of the UTF-8 sequence introduced by `lead`.
fn sequence_len(lead: u8) -> Result<usize, DecodeError> {
    match lead {
        0x00..=0x7f => Ok(1),
        0xc2..=0xdf => Ok(2),
        0xe0..=0xef => Ok(3),
        0xf0..=0xf4 => Ok(4),
        other => Err(DecodeError::InvalidLead(other)),
    }
}

/// Decode the first codepoint of `bytes`.
///
/// Returns the scalar value and the number of bytes it occupies.
pub fn decode_leading(bytes: &[u8]) -> Result<(char, usize), DecodeError> {
    let &lead = bytes.first().ok_or(DecodeError::Empty)?;
    let len = sequence_len(lead)?;
    let seq = bytes.get(..len).ok_or(DecodeError::Truncated)?;
    // Overlong forms and surrogates are rejected by the std validator.
    let s = std::str::from_utf8(seq).map_err(|_| DecodeError::Malformed)?;
    let ch = s.chars().next().ok_or(DecodeError::Malformed)?;
    Ok((ch, len))
}

/// Iterate over the codepoints of `bytes`, yielding each with its byte offset.
///
/// Iteration stops after the first decode failure.
pub fn codepoints(bytes: &[u8]) -> Codepoints<'_> {
    Codepoints {
        bytes,
        offset: 0,
        failed: false,
    }
}

#[derive(Debug, Clone)]
pub struct Codepoints<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

impl Iterator for Codepoints<'_> {
    type Item = Result<(usize, char), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bytes.len() {
            return None;
        }
        match decode_leading(&self.bytes[self.offset..]) {
            Ok((ch, len)) => {
                let at = self.offset;
                self.offset += len;
                Some(Ok((at, ch)))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
