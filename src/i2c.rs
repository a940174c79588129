// Copyright (c) 2017-2024 Rene van der Meer
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
// THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Bus handle for a Linux I2C character device.
//!
//! [`I2c`] owns one open `/dev/i2c-N` descriptor and exposes the per-handle
//! configuration i2cdev offers: the slave address, 10-bit addressing, SMBus
//! Packet Error Checking, and the adapter's timeout and retry counts. It
//! carries no SMBus protocol knowledge. SMBus transactions are built by
//! [`Smbus`], which hands them to the handle through the [`Control`] trait.
//!
//! ## Slave address
//!
//! The slave address, 10-bit mode and PEC are stored by the kernel per open
//! descriptor, not per transaction. Select the slave address before issuing any
//! transactions, and keep the configuration and the transactions that depend on
//! it under a single lock when a handle is shared between threads.
//!
//! ## Troubleshooting
//!
//! ### Permission denied
//!
//! If [`with_bus`] returns an [`Error::Open`] wrapping
//! `io::ErrorKind::PermissionDenied`, make sure the file permissions for
//! `/dev/i2c-N` are correct, and the current user is a member of the `i2c`
//! group.
//!
//! ### Device or resource busy
//!
//! `set_slave_address` fails with `EBUSY` when a kernel driver is bound to the
//! address. Pass `force = true` to claim it anyway.
//!
//! [`Smbus`]: ../smbus/struct.Smbus.html
//! [`Control`]: trait.Control.html
//! [`with_bus`]: struct.I2c.html#method.with_bus
//! [`Error::Open`]: enum.Error.html#variant.Open

use std::fs::{File, OpenOptions};
use std::io;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::result;

use libc::{c_int, c_ulong, c_void};

#[cfg(feature = "hal")]
mod hal;
mod ioctl;

pub use self::ioctl::Capabilities;

/// Errors that can occur when accessing an I2C bus or an SMBus device.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The i2cdev node couldn't be opened.
    ///
    /// This usually means the bus doesn't exist, the `i2c-dev` kernel module
    /// isn't loaded, or the current user lacks permission.
    #[error("Can't open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// I/O error.
    ///
    /// Returned when a control operation fails. The OS error code is preserved,
    /// so `raw_os_error()` on the inner error reports `ENXIO`, `EIO`, `EBUSY`,
    /// `EINVAL` and so on exactly as the kernel returned them.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The device declared a block length exceeding 32 bytes.
    ///
    /// SMBus limits block transfers to 32 bytes. A larger byte count means the
    /// slave device is misbehaving, and none of the returned data should be trusted.
    #[error("Invalid block length: {0} (maximum is 32)")]
    InvalidBlockLength(u8),
    /// Invalid slave address.
    ///
    /// I2C supports 7-bit and 10-bit addresses. Several 7-bit addresses
    /// are reserved, and can't be used as slave addresses unless forced.
    /// A list of those reserved addresses can be found [here].
    ///
    /// [here]: https://en.wikipedia.org/wiki/I%C2%B2C#Reserved_addresses_in_7-bit_address_space
    #[error("Invalid slave address: {0}")]
    InvalidSlaveAddress(u16),
    /// I2C/SMBus feature not supported.
    ///
    /// The underlying drivers don't support the selected I2C feature or SMBus protocol.
    #[error("I2C/SMBus feature not supported")]
    FeatureNotSupported,
}

/// Result type returned from methods that can have `i2c::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Generic control operation on an open device.
///
/// This is the only primitive the SMBus transaction layer needs from a bus.
/// [`I2c`] implements it with `ioctl()`. Test doubles can implement it to
/// observe and answer the [`Message`]s passed by [`Smbus::dispatch`].
///
/// [`I2c`]: struct.I2c.html
/// [`Message`]: ../smbus/struct.Message.html
/// [`Smbus::dispatch`]: ../smbus/struct.Smbus.html#method.dispatch
pub trait Control {
    /// Performs control operation `request` with `argument`.
    ///
    /// Returns the non-negative value reported by the operation, or the OS
    /// error it failed with.
    ///
    /// # Safety
    ///
    /// `argument` must either be a plain integer value `request` accepts, or
    /// point to a value with the layout `request` expects that remains valid
    /// and unmoved until the call returns.
    unsafe fn control(&self, request: c_ulong, argument: *mut c_void) -> io::Result<c_int>;
}

/// Part of a combined I2C transfer issued by [`I2c::transfer`].
///
/// [`I2c::transfer`]: struct.I2c.html#method.transfer
#[derive(Debug)]
pub enum Segment<'a> {
    /// Send all bytes in the buffer.
    Write(&'a [u8]),
    /// Fill the buffer with incoming bytes.
    Read(&'a mut [u8]),
}

/// An open i2cdev descriptor for one I2C bus.
///
/// The descriptor is closed when `I2c` goes out of scope, or earlier through
/// [`close`]. Every operation on a closed handle fails with an `EBADF` I/O error.
///
/// `I2c` is `Send` but not `Sync`. To share a bus between threads, wrap it
/// (or the [`Smbus`] that owns it) in a `Mutex`.
///
/// [`close`]: #method.close
/// [`Smbus`]: ../smbus/struct.Smbus.html
#[derive(Debug)]
pub struct I2c {
    bus: Option<u8>,
    i2cdev: Option<File>,
    addr_10bit: bool,
    pec: bool,
    address: u16,
    // The not_sync field is a workaround to force !Sync. I2c isn't safe for
    // Sync because the slave address and the transactions that use it are
    // separate ioctl() calls.
    not_sync: PhantomData<*const ()>,
}

impl I2c {
    /// Opens `/dev/i2c-<bus>` for reading and writing.
    pub fn with_bus(bus: u8) -> Result<I2c> {
        let mut i2c = I2c::with_path(format!("/dev/i2c-{}", bus))?;
        i2c.bus = Some(bus);

        Ok(i2c)
    }

    /// Opens the i2cdev node at `path` for reading and writing.
    ///
    /// Useful when the node is named or numbered differently, for instance
    /// through a udev symlink.
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<I2c> {
        let path = path.as_ref();
        let i2cdev = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::Open {
                path: path.to_path_buf(),
                source,
            })?;

        log::debug!("Opened {} (fd {})", path.display(), i2cdev.as_raw_fd());

        Ok(I2c {
            bus: None,
            i2cdev: Some(i2cdev),
            addr_10bit: false,
            pec: false,
            address: 0,
            not_sync: PhantomData,
        })
    }

    fn fd(&self) -> io::Result<RawFd> {
        self.i2cdev
            .as_ref()
            .map(|i2cdev| i2cdev.as_raw_fd())
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.i2cdev
            .as_mut()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))
    }

    /// Returns the bus number, if the handle was opened with [`with_bus`].
    ///
    /// [`with_bus`]: #method.with_bus
    pub fn bus(&self) -> Option<u8> {
        self.bus
    }

    /// Returns `true` until [`close`] is called.
    ///
    /// [`close`]: #method.close
    pub fn is_open(&self) -> bool {
        self.i2cdev.is_some()
    }

    /// Closes the descriptor.
    ///
    /// Any error reported by `close()` is returned, but the descriptor is
    /// released either way. Calling `close` on a closed handle does nothing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(i2cdev) = self.i2cdev.take() {
            let fd = i2cdev.into_raw_fd();
            log::debug!("Closing fd {}", fd);

            parse_retval!(unsafe { libc::close(fd) })?;
        }

        Ok(())
    }

    /// Queries the functionality supported by the underlying drivers.
    pub fn capabilities(&self) -> Result<Capabilities> {
        Ok(unsafe { ioctl::funcs(self.fd()?) }?)
    }

    /// Returns the currently selected slave address.
    pub fn slave_address(&self) -> u16 {
        self.address
    }

    /// Sets a 7-bit or 10-bit slave address.
    ///
    /// `slave_address` refers to the slave device you're communicating with.
    /// The specified address shouldn't include the R/W bit.
    ///
    /// By default, 10-bit addressing is disabled, which means
    /// `set_slave_address` only accepts 7-bit addresses, and rejects the
    /// reserved 0x00-0x07 and 0x78-0x7F ranges. Setting `force` allows
    /// reserved addresses, and selects the address even if a kernel driver
    /// has already claimed it.
    pub fn set_slave_address(&mut self, slave_address: u16, force: bool) -> Result<()> {
        let out_of_range = if self.addr_10bit {
            slave_address > 0x03FF
        } else {
            slave_address > 0x7F
        };
        let reserved = !self.addr_10bit && (slave_address < 8 || (slave_address >> 3) == 0b1111);

        if out_of_range || (reserved && !force) {
            return Err(Error::InvalidSlaveAddress(slave_address));
        }

        unsafe { ioctl::set_slave_address(self.fd()?, c_ulong::from(slave_address), force)? };

        log::debug!("Slave address set to {:#04x} (force: {})", slave_address, force);
        self.address = slave_address;

        Ok(())
    }

    /// Returns `true` if 10-bit addressing is enabled.
    pub fn addr_10bit(&self) -> bool {
        self.addr_10bit
    }

    /// Enables or disables 10-bit addressing.
    ///
    /// Returns `Err(`[`Error::FeatureNotSupported`]`)` if the adapter doesn't
    /// support 10-bit addresses. Select the slave address afterwards, since the
    /// valid address range depends on this setting.
    ///
    /// By default, `addr_10bit` is set to `false`.
    ///
    /// [`Error::FeatureNotSupported`]: enum.Error.html#variant.FeatureNotSupported
    pub fn set_addr_10bit(&mut self, addr_10bit: bool) -> Result<()> {
        if addr_10bit && !self.capabilities()?.addr_10bit() {
            return Err(Error::FeatureNotSupported);
        }

        unsafe { ioctl::set_addr_10bit(self.fd()?, addr_10bit as c_ulong)? };

        log::debug!("10-bit addressing {}", if addr_10bit { "enabled" } else { "disabled" });
        self.addr_10bit = addr_10bit;

        Ok(())
    }

    /// Returns `true` if SMBus Packet Error Checking is enabled.
    pub fn pec(&self) -> bool {
        self.pec
    }

    /// Enables or disables SMBus Packet Error Checking.
    ///
    /// Packet Error Checking inserts a CRC-8 Packet Error Code (PEC) byte before each STOP
    /// condition for all SMBus protocols, except Quick Command and Host Notify.
    ///
    /// The PEC is calculated on all message bytes except the START, STOP, ACK and NACK bits.
    ///
    /// By default, `pec` is set to `false`.
    pub fn set_pec(&mut self, pec: bool) -> Result<()> {
        unsafe { ioctl::set_pec(self.fd()?, pec as c_ulong)? };

        log::debug!("PEC {}", if pec { "enabled" } else { "disabled" });
        self.pec = pec;

        Ok(())
    }

    /// Sets the maximum duration of a transaction in milliseconds (ms).
    ///
    /// `timeout` has a resolution of 10ms. Not every adapter driver honors it.
    pub fn set_timeout(&self, timeout: u32) -> Result<()> {
        unsafe { ioctl::set_timeout(self.fd()?, c_ulong::from(timeout / 10))? };

        Ok(())
    }

    /// Sets how many times the adapter retries a transfer that wasn't acknowledged.
    pub fn set_retries(&self, retries: u32) -> Result<()> {
        unsafe { ioctl::set_retries(self.fd()?, c_ulong::from(retries))? };

        Ok(())
    }

    /// Receives incoming data from the slave device and writes it to `buffer`.
    ///
    /// `read` reads as many bytes as can fit in `buffer`.
    ///
    /// Sequence: START → Address + Read Bit → Incoming Bytes → STOP
    ///
    /// Returns how many bytes were read.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        Ok(self.file()?.read(buffer)?)
    }

    /// Sends the outgoing data contained in `buffer` to the slave device.
    ///
    /// Sequence: START → Address + Write Bit → Outgoing Bytes → STOP
    ///
    /// Returns how many bytes were written.
    pub fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        Ok(self.file()?.write(buffer)?)
    }

    /// Sends the outgoing data contained in `write_buffer` to the slave device, and
    /// then fills `read_buffer` with incoming data.
    ///
    /// Compared to calling [`write`] and [`read`] separately, `write_read` doesn't
    /// issue a STOP condition in between the write and read operation. A repeated
    /// START is sent instead.
    ///
    /// Sequence: START → Address + Write Bit → Outgoing Bytes → Repeated START →
    /// Address + Read Bit → Incoming Bytes → STOP
    ///
    /// [`write`]: #method.write
    /// [`read`]: #method.read
    pub fn write_read(&self, write_buffer: &[u8], read_buffer: &mut [u8]) -> Result<()> {
        self.transfer(&mut [
            Segment::Write(write_buffer),
            Segment::Read(read_buffer),
        ])
    }

    /// Performs all `segments` as one combined transfer to the current slave
    /// address, with a repeated START between segments and a single STOP at the end.
    ///
    /// At most 42 segments are accepted, and each can hold up to 8192 bytes.
    /// Larger requests fail with an `EINVAL` I/O error before reaching the bus.
    pub fn transfer(&self, segments: &mut [Segment<'_>]) -> Result<()> {
        unsafe { ioctl::i2c_transfer(self.fd()?, self.address, self.addr_10bit, segments)? };

        Ok(())
    }
}

impl Control for I2c {
    unsafe fn control(&self, request: c_ulong, argument: *mut c_void) -> io::Result<c_int> {
        ioctl::control(self.fd()?, request, argument)
    }
}

// Send is safe for I2c, but we're marked !Send because of the dummy pointer that's
// needed to force !Sync.
unsafe impl Send for I2c {}

#[cfg(test)]
mod tests {
    use super::*;

    fn null_device() -> I2c {
        I2c::with_path("/dev/null").unwrap()
    }

    #[test]
    fn open_missing_node() {
        match I2c::with_path("/dev/i2c-does-not-exist") {
            Err(Error::Open { path, source }) => {
                assert_eq!(path, PathBuf::from("/dev/i2c-does-not-exist"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn reserved_addresses_need_force() {
        let mut i2c = null_device();

        for address in [0x00, 0x07, 0x78, 0x7F] {
            assert!(matches!(
                i2c.set_slave_address(address, false),
                Err(Error::InvalidSlaveAddress(a)) if a == address
            ));
        }

        assert!(matches!(
            i2c.set_slave_address(0x80, true),
            Err(Error::InvalidSlaveAddress(0x80))
        ));
    }

    #[test]
    fn forced_reserved_address_reaches_the_driver() {
        let mut i2c = null_device();

        // /dev/null accepts the open, but not the i2cdev request
        match i2c.set_slave_address(0x00, true) {
            Err(Error::Io(err)) => assert_eq!(err.raw_os_error(), Some(libc::ENOTTY)),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(i2c.slave_address(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let mut i2c = null_device();

        assert!(i2c.is_open());
        i2c.close().unwrap();
        assert!(!i2c.is_open());
        i2c.close().unwrap();

        match i2c.set_pec(true) {
            Err(Error::Io(err)) => assert_eq!(err.raw_os_error(), Some(libc::EBADF)),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!i2c.pec());
    }
}
