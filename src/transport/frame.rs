//! Style-sheet update framing: a big-endian `u16` path length, the UTF-8
//! path, then the style-sheet text filling the rest of the body.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("path is {0} bytes, longer than a frame can carry")]
    PathTooLong(usize),
    #[error("frame is truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("frame is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

pub fn encode(path: &str, css: &str) -> Result<Vec<u8>, FrameError> {
    let len = u16::try_from(path.len()).map_err(|_| FrameError::PathTooLong(path.len()))?;
    let mut out = Vec::with_capacity(2 + path.len() + css.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(path.as_bytes());
    out.extend_from_slice(css.as_bytes());
    Ok(out)
}

pub fn decode(frame: &[u8]) -> Result<(String, String), FrameError> {
    let [hi, lo, rest @ ..] = frame else {
        return Err(FrameError::Truncated { needed: 2, actual: frame.len() });
    };
    let len = u16::from_be_bytes([*hi, *lo]) as usize;
    if rest.len() < len {
        return Err(FrameError::Truncated { needed: 2 + len, actual: frame.len() });
    }
    let (path, css) = rest.split_at(len);
    Ok((std::str::from_utf8(path)?.to_string(), std::str::from_utf8(css)?.to_string()))
}
