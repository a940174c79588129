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

//! SMBus transactions over a [`Control`] provider.
//!
//! SMBus (System Management Bus) is based on I2C, and defines more structured
//! message transactions through its various protocols. More details can be
//! found in the latest SMBus [specification].
//!
//! Every method on [`Smbus`] builds one [`Message`] around a stack-local
//! [`Data`] buffer, hands it to the device with a single `I2C_SMBUS`
//! control operation through [`dispatch`], and decodes the buffer afterwards.
//! Nothing is retained between calls, and failed transactions are never retried.
//!
//! ## Block transfers
//!
//! Block transactions carry at most 32 data bytes. Outgoing payloads that are
//! longer are truncated to 32 bytes, and the methods return how many bytes were
//! actually sent. Incoming blocks are copied into the caller's buffer up to its
//! length. A device that reports more than 32 bytes causes an
//! [`Error::InvalidBlockLength`].
//!
//! ## Sequences
//!
//! The transaction sequences listed for each method use the notation below.
//! Bytes sent by the slave device are enclosed in brackets.
//!
//! * S: START condition, P: STOP condition
//! * Rd/Wr: the R/W bit, A/NA: ACK/NACK
//! * Comm: the command byte, usually a register on the device
//! * Count: the byte count of a block transfer
//!
//! [specification]: http://smbus.org/specs/SMBus_3_1_20180319.pdf
//! [`Control`]: ../i2c/trait.Control.html
//! [`Smbus`]: struct.Smbus.html
//! [`Message`]: struct.Message.html
//! [`Data`]: struct.Data.html
//! [`dispatch`]: struct.Smbus.html#method.dispatch
//! [`Error::InvalidBlockLength`]: ../i2c/enum.Error.html#variant.InvalidBlockLength

use libc::{c_ulong, c_void};

use crate::i2c::{Control, I2c, Result};

mod message;

pub use self::message::{Data, Message, ReadWrite, TransactionType, BLOCK_MAX};

/// `ioctl()` request that performs an SMBus transfer (`I2C_SMBUS`).
pub const REQ_SMBUS: c_ulong = 0x0720;

/// Issues SMBus transactions to the slave device selected on a bus.
///
/// `Smbus` is generic over the [`Control`] primitive, which is [`I2c`] by default.
/// The slave address and any other per-bus configuration must be set before
/// issuing transactions. For `Smbus<I2c>` the configuration methods are
/// available directly on `Smbus`.
///
/// [`Control`]: ../i2c/trait.Control.html
/// [`I2c`]: ../i2c/struct.I2c.html
#[derive(Debug)]
pub struct Smbus<D = I2c> {
    device: D,
}

impl Smbus<I2c> {
    /// Opens `/dev/i2c-<bus>`.
    pub fn open(bus: u8) -> Result<Smbus<I2c>> {
        Ok(Smbus::new(I2c::with_bus(bus)?))
    }

    /// Closes the underlying bus descriptor.
    ///
    /// Transactions issued after `close` fail with an `EBADF` I/O error.
    pub fn close(&mut self) -> Result<()> {
        self.device.close()
    }

    /// Selects the slave device. See [`I2c::set_slave_address`].
    ///
    /// [`I2c::set_slave_address`]: ../i2c/struct.I2c.html#method.set_slave_address
    pub fn set_slave_address(&mut self, slave_address: u16, force: bool) -> Result<()> {
        self.device.set_slave_address(slave_address, force)
    }

    /// Enables or disables 10-bit addressing. See [`I2c::set_addr_10bit`].
    ///
    /// [`I2c::set_addr_10bit`]: ../i2c/struct.I2c.html#method.set_addr_10bit
    pub fn set_addr_10bit(&mut self, addr_10bit: bool) -> Result<()> {
        self.device.set_addr_10bit(addr_10bit)
    }

    /// Enables or disables Packet Error Checking. See [`I2c::set_pec`].
    ///
    /// [`I2c::set_pec`]: ../i2c/struct.I2c.html#method.set_pec
    pub fn set_pec(&mut self, pec: bool) -> Result<()> {
        self.device.set_pec(pec)
    }
}

impl<D: Control> Smbus<D> {
    /// Constructs a new `Smbus` on top of `device`.
    pub fn new(device: D) -> Smbus<D> {
        Smbus { device }
    }

    /// Returns a reference to the underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Returns a mutable reference to the underlying device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Consumes the `Smbus`, returning the underlying device.
    pub fn into_inner(self) -> D {
        self.device
    }

    /// Hands `message` to the device with a single `I2C_SMBUS` control operation.
    ///
    /// `dispatch` doesn't interpret the transaction type. Any data the device
    /// returns is written to the buffer referenced by `message`.
    pub fn dispatch(&self, message: &mut Message<'_>) -> Result<()> {
        log::trace!(
            "SMBus {:?} {:?} command {:#04x}",
            message.transaction_type(),
            message.read_write(),
            message.command()
        );

        // message and the data it borrows outlive the call
        unsafe {
            self.device
                .control(REQ_SMBUS, message as *mut Message<'_> as *mut c_void)?;
        }

        Ok(())
    }

    fn transfer(
        &self,
        read_write: ReadWrite,
        command: u8,
        transaction_type: TransactionType,
        data: Option<&mut Data>,
    ) -> Result<()> {
        self.dispatch(&mut Message::new(
            read_write,
            command,
            transaction_type,
            data,
        ))
    }

    /// Sends a single bit to the device, in place of the R/W bit.
    ///
    /// Sequence: S Addr Rd/Wr \[A\] P
    pub fn write_quick(&self, read_write: ReadWrite) -> Result<()> {
        self.transfer(read_write, 0, TransactionType::Quick, None)
    }

    /// Receives an 8-bit value, without specifying a register.
    ///
    /// Sequence: S Addr Rd \[A\] \[Data\] NA P
    pub fn read_byte(&self) -> Result<u8> {
        let mut data = Data::new();
        self.transfer(ReadWrite::Read, 0, TransactionType::Byte, Some(&mut data))?;

        Ok(data.byte())
    }

    /// Sends an 8-bit `value`, without specifying a register.
    ///
    /// Sequence: S Addr Wr \[A\] Data \[A\] P
    pub fn write_byte(&self, value: u8) -> Result<()> {
        self.transfer(ReadWrite::Write, value, TransactionType::Byte, None)
    }

    /// Sends an 8-bit `command`, and receives an 8-bit value.
    ///
    /// Sequence: S Addr Wr \[A\] Comm \[A\] S Addr Rd \[A\] \[Data\] NA P
    pub fn read_byte_data(&self, command: u8) -> Result<u8> {
        let mut data = Data::new();
        self.transfer(
            ReadWrite::Read,
            command,
            TransactionType::ByteData,
            Some(&mut data),
        )?;

        Ok(data.byte())
    }

    /// Sends an 8-bit `command` and an 8-bit `value`.
    ///
    /// Sequence: S Addr Wr \[A\] Comm \[A\] Data \[A\] P
    pub fn write_byte_data(&self, command: u8, value: u8) -> Result<()> {
        let mut data = Data::with_byte(value);
        self.transfer(
            ReadWrite::Write,
            command,
            TransactionType::ByteData,
            Some(&mut data),
        )
    }

    /// Sends an 8-bit `command`, and receives a 16-bit value.
    ///
    /// Based on the SMBus protocol definition, the first byte received is
    /// stored as the low byte of the 16-bit value, and the second byte as
    /// the high byte. Some devices may require you to swap these bytes. In those
    /// cases you can use [`read_word_data_swapped`] instead.
    ///
    /// Sequence: S Addr Wr \[A\] Comm \[A\] S Addr Rd \[A\] \[DataLow\] A \[DataHigh\] NA P
    ///
    /// [`read_word_data_swapped`]: #method.read_word_data_swapped
    pub fn read_word_data(&self, command: u8) -> Result<u16> {
        let mut data = Data::new();
        self.transfer(
            ReadWrite::Read,
            command,
            TransactionType::WordData,
            Some(&mut data),
        )?;

        Ok(data.word())
    }

    /// Works like [`read_word_data`], but with the high byte received first.
    ///
    /// [`read_word_data`]: #method.read_word_data
    pub fn read_word_data_swapped(&self, command: u8) -> Result<u16> {
        Ok(self.read_word_data(command)?.swap_bytes())
    }

    /// Sends an 8-bit `command` and a 16-bit `value`, low byte first.
    ///
    /// Sequence: S Addr Wr \[A\] Comm \[A\] DataLow \[A\] DataHigh \[A\] P
    pub fn write_word_data(&self, command: u8, value: u16) -> Result<()> {
        let mut data = Data::with_word(value);
        self.transfer(
            ReadWrite::Write,
            command,
            TransactionType::WordData,
            Some(&mut data),
        )
    }

    /// Works like [`write_word_data`], but with the high byte sent first.
    ///
    /// [`write_word_data`]: #method.write_word_data
    pub fn write_word_data_swapped(&self, command: u8, value: u16) -> Result<()> {
        self.write_word_data(command, value.swap_bytes())
    }

    /// Sends an 8-bit `command` and a 16-bit `value`, and then receives a 16-bit value in response.
    ///
    /// Both words are transferred low byte first. The same buffer carries the
    /// outgoing and the incoming value.
    ///
    /// Sequence: S Addr Wr \[A\] Comm \[A\] DataLow \[A\] DataHigh \[A\]
    /// S Addr Rd \[A\] \[DataLow\] A \[DataHigh\] NA P
    pub fn process_call(&self, command: u8, value: u16) -> Result<u16> {
        let mut data = Data::with_word(value);
        self.transfer(
            ReadWrite::Write,
            command,
            TransactionType::ProcessCall,
            Some(&mut data),
        )?;

        Ok(data.word())
    }

    /// Works like [`process_call`], but with the high byte transferred first,
    /// for both the outgoing and incoming value.
    ///
    /// [`process_call`]: #method.process_call
    pub fn process_call_swapped(&self, command: u8, value: u16) -> Result<u16> {
        Ok(self.process_call(command, value.swap_bytes())?.swap_bytes())
    }

    /// Sends an 8-bit `command`, and then receives a byte count along with up
    /// to 32 bytes, which are copied to `buffer`.
    ///
    /// Returns how many bytes were copied, which is the byte count reported by
    /// the device, limited to the length of `buffer`.
    ///
    /// Sequence: S Addr Wr \[A\] Comm \[A\] S Addr Rd \[A\] \[Count\] A \[Data\] A ... A \[Data\] NA P
    pub fn read_block_data(&self, command: u8, buffer: &mut [u8]) -> Result<usize> {
        let mut data = Data::new();
        self.transfer(
            ReadWrite::Read,
            command,
            TransactionType::BlockData,
            Some(&mut data),
        )?;

        Ok(copy_block(&data, buffer)?.min(buffer.len()))
    }

    /// Sends an 8-bit `command` and a byte count along with up to 32 bytes
    /// from `buffer`. Any additional data contained in `buffer` is ignored.
    ///
    /// Returns how many bytes were sent.
    ///
    /// Sequence: S Addr Wr \[A\] Comm \[A\] Count \[A\] Data \[A\] ... \[A\] Data \[A\] P
    pub fn write_block_data(&self, command: u8, buffer: &[u8]) -> Result<usize> {
        let mut data = Data::new();
        let length = data.set_payload(buffer);

        self.transfer(
            ReadWrite::Write,
            command,
            TransactionType::BlockData,
            Some(&mut data),
        )?;

        Ok(length)
    }

    /// Sends an 8-bit `command` and a byte count along with up to 32 bytes from
    /// `buffer`, and then receives a byte count and a block of data in response,
    /// which replaces the contents of `buffer`.
    ///
    /// Returns the byte count of the response. If the response is longer than
    /// `buffer`, only the first `buffer.len()` bytes are copied, and the
    /// returned count exceeds the buffer length. If it's shorter, bytes past
    /// the count keep their outgoing value.
    ///
    /// Sequence: S Addr Wr \[A\] Comm \[A\] Count \[A\] Data \[A\] ...
    /// S Addr Rd \[A\] \[Count\] A \[Data\] ... A P
    pub fn block_process_call(&self, command: u8, buffer: &mut [u8]) -> Result<usize> {
        let mut data = Data::new();
        data.set_payload(buffer);

        self.transfer(
            ReadWrite::Write,
            command,
            TransactionType::BlockProcessCall,
            Some(&mut data),
        )?;

        copy_block(&data, buffer)
    }

    /// Sends an 8-bit `command`, and then fills `buffer` with up to 32
    /// incoming bytes. Unlike [`read_block_data`], the device doesn't send a
    /// byte count.
    ///
    /// Reading exactly 32 bytes is requested with the legacy
    /// `I2C_SMBUS_I2C_BLOCK_BROKEN` transaction type, since some devices only
    /// respond correctly to that encoding. Shorter reads use `I2C_SMBUS_I2C_BLOCK_DATA`.
    ///
    /// Returns how many bytes were read.
    ///
    /// Sequence: S Addr Wr \[A\] Comm \[A\] S Addr Rd \[A\] \[Data\] A \[Data\] A ... A \[Data\] NA P
    ///
    /// [`read_block_data`]: #method.read_block_data
    pub fn read_i2c_block_data(&self, command: u8, buffer: &mut [u8]) -> Result<usize> {
        let length = buffer.len().min(BLOCK_MAX);
        let transaction_type = if length == BLOCK_MAX {
            TransactionType::I2cBlockBroken
        } else {
            TransactionType::I2cBlockData
        };

        let mut data = Data::new();
        data.set_length(length as u8);

        self.transfer(ReadWrite::Read, command, transaction_type, Some(&mut data))?;

        Ok(copy_block(&data, buffer)?.min(buffer.len()))
    }

    /// Sends an 8-bit `command` followed by up to 32 bytes from `buffer`,
    /// without a byte count. Any additional data contained in `buffer` is ignored.
    ///
    /// Returns how many bytes were sent.
    ///
    /// Sequence: S Addr Wr \[A\] Comm \[A\] Data \[A\] Data \[A\] ... \[A\] Data \[A\] P
    pub fn write_i2c_block_data(&self, command: u8, buffer: &[u8]) -> Result<usize> {
        let mut data = Data::new();
        let length = data.set_payload(buffer);

        self.transfer(
            ReadWrite::Write,
            command,
            TransactionType::I2cBlockBroken,
            Some(&mut data),
        )?;

        Ok(length)
    }
}

// Copies the returned block into buffer, up to its length. Returns the
// block length reported by the device.
fn copy_block(data: &Data, buffer: &mut [u8]) -> Result<usize> {
    let payload = data
        .payload()
        .inspect_err(|_| log::warn!("Device returned an invalid block length ({})", data.length()))?;

    let length = payload.len().min(buffer.len());
    buffer[..length].copy_from_slice(&payload[..length]);

    Ok(payload.len())
}
