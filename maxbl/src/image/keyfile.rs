//! AES key file reader.
//!
//! The key file is plain text:
//!
//! ```text
//! aes_key_start
//! 0x00, 0x01, 0x02, ...
//! aes_key_end
//! aes_aad_start
//! 0x10, 0x11, ...
//! aes_aad_end
//! ```
//!
//! Older tools close the AAD block with `aes_key_end`; both terminators are
//! accepted.

use {
    crate::error::{Error, Result},
    log::debug,
    std::{fs, path::Path},
};

const KEY_START: &str = "aes_key_start";
const KEY_END: &str = "aes_key_end";
const AAD_START: &str = "aes_aad_start";
const AAD_END: &str = "aes_aad_end";

/// AES key and additional authenticated data.
#[derive(Clone, PartialEq, Eq)]
pub struct AesKeyFile {
    /// Key bytes.
    pub key: Vec<u8>,
    /// AAD bytes.
    pub aad: Vec<u8>,
}

impl std::fmt::Debug for AesKeyFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesKeyFile")
            .field("key_len", &self.key.len())
            .field("aad_len", &self.aad.len())
            .finish()
    }
}

fn decode_hex_line(line: &str, lineno: usize) -> Result<Vec<u8>> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.is_empty()
                || digits.len() > 2
                || !digits
                    .bytes()
                    .all(|b| b.is_ascii_hexdigit())
            {
                return None;
            }
            u8::from_str_radix(digits, 16).ok()
        })
        .map(|byte| {
            byte.ok_or_else(|| {
                Error::InvalidKeyFile(format!("line {lineno}: malformed hex '{line}'"))
            })
        })
        .collect()
}

fn expect_marker<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    marker: &str,
) -> Result<()> {
    match lines.next() {
        Some((_, l)) if l == marker => Ok(()),
        Some((n, l)) => Err(Error::InvalidKeyFile(format!(
            "line {n}: expected '{marker}', found '{l}'"
        ))),
        None => Err(Error::InvalidKeyFile(format!("missing '{marker}'"))),
    }
}

fn read_block<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    terminators: &[&str],
) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for (n, line) in lines {
        if terminators.contains(&line) {
            return Ok(bytes);
        }
        bytes.extend(decode_hex_line(line, n)?);
    }
    Err(Error::InvalidKeyFile(format!("missing '{}'", terminators[0])))
}

impl AesKeyFile {
    /// Load a key file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading AES key file from: {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse key file text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        expect_marker(&mut lines, KEY_START)?;
        let key = read_block(&mut lines, &[KEY_END])?;
        expect_marker(&mut lines, AAD_START)?;
        let aad = read_block(&mut lines, &[AAD_END, KEY_END])?;

        debug!("AES key file: {}-byte key, {}-byte AAD", key.len(), aad.len());
        Ok(Self { key, aad })
    }
}
