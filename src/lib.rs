//! `smbus-dev` issues SMBus (System Management Bus) transactions to slave
//! devices on a Linux I2C bus, through the kernel's `i2cdev` interface.
//!
//! The crate consists of two layers. [`i2c::I2c`] owns an open `/dev/i2c-N`
//! descriptor and handles per-bus configuration: the slave address, 10-bit
//! addressing and Packet Error Checking. [`smbus::Smbus`] builds the
//! transaction descriptors the kernel expects for each SMBus protocol (Quick
//! Command, Send/Receive Byte, Read/Write Byte and Word, Process Call, Block
//! Read/Write, Block Process Call and I2C Block Read/Write), dispatches them
//! through a single control operation, and decodes the results.
//!
//! ```no_run
//! use smbus_dev::Smbus;
//!
//! # fn main() -> smbus_dev::Result<()> {
//! let mut smbus = Smbus::open(1)?;
//! smbus.set_slave_address(0x50, false)?;
//!
//! let status = smbus.read_byte_data(0x00)?;
//! smbus.write_word_data(0x10, 0x1234)?;
//!
//! let mut block = [0u8; 32];
//! let length = smbus.read_block_data(0x20, &mut block)?;
//! # let _ = (status, length);
//! # Ok(())
//! # }
//! ```
//!
//! All calls block until the kernel driver completes the bus cycle. Nothing
//! is retried, and no locking is done internally. Logging goes through the
//! `log` facade.
//!
//! The `embedded-hal` v1.0.0 `I2c` trait implementation for [`i2c::I2c`] can
//! be enabled with the optional `hal` feature.

// Used by rustdoc to link other crates to smbus-dev's docs
#![doc(html_root_url = "https://docs.rs/smbus-dev/0.1.0")]

#[macro_use]
mod macros;

pub mod i2c;
pub mod smbus;

pub use crate::i2c::{Error, Result};
pub use crate::smbus::Smbus;
