//! MSBL firmware container.
//!
//! An MSBL file is produced by Maxim's signing tool and holds an encrypted,
//! authenticated application split into flash pages.
//!
//! ## Layout
//!
//! ```text
//! +------------------------+
//! |   Header (76 bytes)    |
//! +------------------------+
//! |  Page[0]               |  page_size + crc_size bytes
//! +------------------------+
//! |  ...                   |
//! +------------------------+
//! |  Page[num_pages - 1]   |
//! +------------------------+
//! |  CRC32 (4 bytes, LE)   |
//! +------------------------+
//! ```
//!
//! ## Header (little-endian)
//!
//! ```text
//! offset  size  field
//!      0     4  magic
//!      4     4  format version
//!      8    16  target name (NUL padded)
//!     24    16  encryption type (NUL padded)
//!     40    11  nonce
//!     51     1  reserved
//!     52    16  auth tag
//!     68     2  page count
//!     70     2  page size
//!     72     1  CRC size
//!     73     3  reserved
//! ```

use {
    crate::{
        connection::format_hex,
        error::{Error, Result},
    },
    byteorder::{ByteOrder, LittleEndian, ReadBytesExt},
    crc::{CRC_32_ISO_HDLC, Crc},
    log::{debug, warn},
    std::{
        fmt,
        fs,
        io::{Cursor, Read},
        path::Path,
    },
};

/// Header size in bytes.
pub const MSBL_HEADER_SIZE: usize = 76;

/// Trailer (CRC32) size in bytes.
pub const MSBL_TRAILER_SIZE: usize = 4;

/// Magic written by the signing tool.
pub const MSBL_MAGIC: [u8; 4] = *b"msbl";

/// Required file extension.
pub const MSBL_EXTENSION: &str = "msbl";

const MSBL_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// MSBL header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsblHeader {
    /// File magic.
    pub magic: [u8; 4],
    /// Container format version.
    pub format_version: u32,
    /// Target name, NUL padded.
    pub target: [u8; 16],
    /// Encryption type, NUL padded.
    pub enc_type: [u8; 16],
    /// AES nonce loaded with `SET_IV`.
    pub nonce: [u8; 11],
    /// Reserved.
    pub reserved0: u8,
    /// Authentication tag loaded with `SET_AUTH`.
    pub auth: [u8; 16],
    /// Number of pages.
    pub num_pages: u16,
    /// Payload bytes per page.
    pub page_size: u16,
    /// Checksum bytes appended to each page.
    pub crc_size: u8,
    /// Reserved.
    pub reserved1: [u8; 3],
}

fn padded_str(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
        .trim()
        .to_string()
}

impl MsblHeader {
    /// Read a header from a reader (76 bytes).
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        let format_version = reader.read_u32::<LittleEndian>()?;
        let mut target = [0u8; 16];
        reader.read_exact(&mut target)?;
        let mut enc_type = [0u8; 16];
        reader.read_exact(&mut enc_type)?;
        let mut nonce = [0u8; 11];
        reader.read_exact(&mut nonce)?;
        let reserved0 = reader.read_u8()?;
        let mut auth = [0u8; 16];
        reader.read_exact(&mut auth)?;
        let num_pages = reader.read_u16::<LittleEndian>()?;
        let page_size = reader.read_u16::<LittleEndian>()?;
        let crc_size = reader.read_u8()?;
        let mut reserved1 = [0u8; 3];
        reader.read_exact(&mut reserved1)?;

        Ok(Self {
            magic,
            format_version,
            target,
            enc_type,
            nonce,
            reserved0,
            auth,
            num_pages,
            page_size,
            crc_size,
            reserved1,
        })
    }

    /// Magic as text.
    pub fn magic_str(&self) -> String {
        padded_str(&self.magic)
    }

    /// Target name without padding.
    pub fn target_name(&self) -> String {
        padded_str(&self.target)
    }

    /// Encryption type without padding.
    pub fn encryption_type(&self) -> String {
        padded_str(&self.enc_type)
    }

    /// Bytes per page on disk (payload and checksum).
    pub fn page_len(&self) -> usize {
        usize::from(self.page_size) + usize::from(self.crc_size)
    }

    /// File size implied by the header.
    pub fn expected_file_len(&self) -> usize {
        MSBL_HEADER_SIZE + usize::from(self.num_pages) * self.page_len() + MSBL_TRAILER_SIZE
    }
}

/// Parsed MSBL file.
#[derive(Clone)]
pub struct Msbl {
    header: MsblHeader,
    crc32: u32,
    /// Raw file data.
    data: Vec<u8>,
}

impl Msbl {
    /// Load an MSBL file. The extension must be `.msbl`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if ext != MSBL_EXTENSION {
            return Err(Error::InvalidImage(format!(
                "invalid file extension '.{ext}' (expected .{MSBL_EXTENSION})"
            )));
        }
        debug!("Loading MSBL from: {}", path.display());

        Self::from_bytes(fs::read(path)?)
    }

    /// Parse an MSBL image from raw bytes.
    ///
    /// The header's page count is authoritative: the body must hold exactly
    /// that many whole pages followed by the CRC32 trailer.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < MSBL_HEADER_SIZE {
            return Err(Error::InvalidImage(format!(
                "file too small for header ({} of {MSBL_HEADER_SIZE} bytes)",
                data.len()
            )));
        }

        let header = MsblHeader::read_from(&mut Cursor::new(&data))?;
        if header.magic != MSBL_MAGIC {
            warn!("Unexpected MSBL magic [{}]", format_hex(&header.magic));
        }
        if header.num_pages > 0 && header.page_len() == 0 {
            return Err(Error::InvalidImage("page size is zero".into()));
        }

        let expected = header.expected_file_len();
        if data.len() != expected {
            return Err(Error::InvalidImage(format!(
                "header declares {} pages of {} bytes ({expected} bytes total), file has {} bytes",
                header.num_pages,
                header.page_len(),
                data.len()
            )));
        }

        let crc32 = LittleEndian::read_u32(&data[data.len() - MSBL_TRAILER_SIZE..]);

        debug!(
            "MSBL '{}' ({}): {} pages x {} + {} bytes, CRC32 {crc32:#010X}",
            header.target_name(),
            header.encryption_type(),
            header.num_pages,
            header.page_size,
            header.crc_size
        );

        Ok(Self {
            header,
            crc32,
            data,
        })
    }

    /// File header.
    pub fn header(&self) -> &MsblHeader {
        &self.header
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        usize::from(self.header.num_pages)
    }

    /// Page `index` including its checksum bytes.
    pub fn page(&self, index: usize) -> Option<&[u8]> {
        if index >= self.page_count() {
            return None;
        }
        let len = self
            .header
            .page_len();
        let start = MSBL_HEADER_SIZE + index * len;
        Some(&self.data[start..start + len])
    }

    /// All pages in order.
    pub fn pages(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.page_count()).filter_map(|i| self.page(i))
    }

    /// CRC32 stored in the trailer.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// CRC32 computed over every byte before the trailer.
    pub fn computed_crc32(&self) -> u32 {
        MSBL_CRC.checksum(&self.data[..self.data.len() - MSBL_TRAILER_SIZE])
    }

    /// Check the trailer against the file contents.
    pub fn verify_crc(&self) -> Result<()> {
        let actual = self.computed_crc32();
        if actual != self.crc32 {
            return Err(Error::CrcMismatch {
                expected: self.crc32,
                actual,
            });
        }
        debug!("MSBL CRC32 verified: {actual:#010X}");
        Ok(())
    }

    /// File size in bytes.
    pub fn file_len(&self) -> usize {
        self.data
            .len()
    }

    /// Whether the image has no pages.
    pub fn is_empty(&self) -> bool {
        self.page_count() == 0
    }
}

impl fmt::Debug for Msbl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Msbl")
            .field("header", &self.header)
            .field("crc32", &self.crc32)
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl fmt::Display for Msbl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        writeln!(f, "{:<15}: {}", "magic", h.magic_str())?;
        writeln!(f, "{:<15}: {}", "formatVersion", h.format_version)?;
        writeln!(f, "{:<15}: {}", "target", h.target_name())?;
        writeln!(f, "{:<15}: {}", "encType", h.encryption_type())?;
        writeln!(f, "{:<15}: {}", "numPages", h.num_pages)?;
        writeln!(f, "{:<15}: {}", "pageSize", h.page_size)?;
        writeln!(f, "{:<15}: {}", "crcSize", h.crc_size)?;
        writeln!(f, "{:<15}: {}", "nonce", format_hex(&h.nonce))?;
        writeln!(f, "{:<15}: {}", "auth", format_hex(&h.auth))?;
        writeln!(f, "{:<15}: {} bytes", "file size", self.file_len())?;
        write!(f, "{:<15}: 0x{:08X}", "CRC32", self.crc32)
    }
}
