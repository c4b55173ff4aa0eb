//! Firmware image and key file formats.

pub mod keyfile;
pub mod msbl;

pub use keyfile::AesKeyFile;
pub use msbl::{MSBL_HEADER_SIZE, Msbl, MsblHeader};
