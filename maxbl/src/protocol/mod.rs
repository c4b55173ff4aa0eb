//! Wire protocols: bridge adapter framing and bootloader command codes.

pub mod bridge;
pub mod command;

pub use bridge::{BRIDGE_MAGIC, Bridge};
pub use command::{Command, Status};
