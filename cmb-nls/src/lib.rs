//! Text decoding for strings stored inside CMB containers.
//!
//! Scene names and string literals are raw NUL-terminated byte runs. The
//! container does not say which code page they use, so callers pick one.

use anyhow::{anyhow, Result};
use encoding_rs::{Encoding as RsEncoding, GB18030, SHIFT_JIS, UTF_8};
use std::borrow::Cow;
use std::str::FromStr;

pub trait TextDecoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str>;

    /// Decode C-style string: stop at the first NUL (0x00).
    fn decode_cstr<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.decode(&bytes[..end])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    #[default]
    ShiftJis,
    /// Treat GBK as GB18030 (superset).
    Gbk,
    Gb18030,
}

impl Encoding {
    #[inline]
    pub fn as_encoding_rs(self) -> &'static RsEncoding {
        match self {
            Encoding::Utf8 => UTF_8,
            Encoding::ShiftJis => SHIFT_JIS,
            Encoding::Gbk => GB18030,
            Encoding::Gb18030 => GB18030,
        }
    }
}

impl FromStr for Encoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sjis" | "shift_jis" => Ok(Encoding::ShiftJis),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "gbk" => Ok(Encoding::Gbk),
            "gb18030" => Ok(Encoding::Gb18030),
            _ => Err(anyhow!("unknown NLS: {}", s)),
        }
    }
}

/// A simple decoder bound to one encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    enc: Encoding,
}

impl Decoder {
    #[inline]
    pub fn new(enc: Encoding) -> Self {
        Self { enc }
    }
}

impl TextDecoder for Decoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self.enc {
            Encoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => Cow::Borrowed(s),
                Err(_) => {
                    log::warn!("UTF-8 decode error");
                    Cow::Owned(String::from_utf8_lossy(bytes).into_owned())
                }
            },
            Encoding::ShiftJis | Encoding::Gbk | Encoding::Gb18030 => {
                let enc = self.enc.as_encoding_rs();
                let (cow, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    log::warn!("{} decode error", enc.name());
                }
                cow
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_decode_cstr() {
        let d = Decoder::new(Encoding::Utf8);
        let bytes = b"hello\0world";
        assert_eq!(d.decode_cstr(bytes), "hello");
    }

    #[test]
    fn shiftjis_decodes_kana() {
        let d = Decoder::new(Encoding::ShiftJis);
        // "アイク" in Shift-JIS
        let bytes = [0x83, 0x41, 0x83, 0x43, 0x83, 0x4E, 0x00, 0x41];
        assert_eq!(d.decode_cstr(&bytes), "アイク");
    }

    #[test]
    fn ascii_is_identical_in_every_encoding() {
        for enc in [Encoding::Utf8, Encoding::ShiftJis, Encoding::Gbk, Encoding::Gb18030] {
            assert_eq!(Decoder::new(enc).decode(b"EV_Start"), "EV_Start");
        }
    }

    #[test]
    fn parses_command_line_names() {
        assert_eq!("SJIS".parse::<Encoding>().unwrap(), Encoding::ShiftJis);
        assert_eq!("utf8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert!("latin1".parse::<Encoding>().is_err());
    }
}
