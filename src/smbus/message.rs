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

use std::fmt;

use crate::i2c::{Error, Result};

/// Maximum number of data bytes in an SMBus block transfer.
pub const BLOCK_MAX: usize = 32;

/// SMBus Rd/Wr bit.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum ReadWrite {
    Write = 0,
    Read = 1,
}

/// Shape of an SMBus transaction.
///
/// The discriminants are the `I2C_SMBUS_*` size values defined by the kernel.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u32)]
pub enum TransactionType {
    Quick = 0,
    Byte = 1,
    ByteData = 2,
    WordData = 3,
    ProcessCall = 4,
    BlockData = 5,
    /// Legacy I2C block transfer, always 32 bytes when reading.
    I2cBlockBroken = 6,
    /// SMBus 2.0
    BlockProcessCall = 7,
    I2cBlockData = 8,
}

/// Data exchanged with the kernel for a single SMBus transaction.
///
/// Mirrors `union i2c_smbus_data`. Depending on the transaction type, the
/// buffer holds a single byte, a 16-bit word in native byte order, or a block,
/// where the first byte contains the length, followed by up to 32 bytes of data,
/// with the final byte used as padding.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C, align(2))]
pub struct Data {
    block: [u8; BLOCK_MAX + 2],
}

impl Data {
    pub fn new() -> Data {
        Data {
            block: [0u8; BLOCK_MAX + 2],
        }
    }

    pub fn with_byte(value: u8) -> Data {
        let mut data = Data::new();
        data.set_byte(value);

        data
    }

    pub fn with_word(value: u16) -> Data {
        let mut data = Data::new();
        data.set_word(value);

        data
    }

    pub fn byte(&self) -> u8 {
        self.block[0]
    }

    pub fn set_byte(&mut self, value: u8) {
        self.block[0] = value;
    }

    // The kernel converts between the wire order (low byte first) and
    // the native u16 representation.
    pub fn word(&self) -> u16 {
        u16::from_ne_bytes([self.block[0], self.block[1]])
    }

    pub fn set_word(&mut self, value: u16) {
        self.block[..2].copy_from_slice(&value.to_ne_bytes());
    }

    /// Returns the block length byte, as stored. It isn't checked against
    /// [`BLOCK_MAX`].
    ///
    /// [`BLOCK_MAX`]: constant.BLOCK_MAX.html
    pub fn length(&self) -> u8 {
        self.block[0]
    }

    pub fn set_length(&mut self, length: u8) {
        self.block[0] = length;
    }

    /// Returns the block payload described by the length byte.
    ///
    /// Fails with [`Error::InvalidBlockLength`] if the length byte exceeds 32.
    ///
    /// [`Error::InvalidBlockLength`]: ../i2c/enum.Error.html#variant.InvalidBlockLength
    pub fn payload(&self) -> Result<&[u8]> {
        let length = self.length();
        if usize::from(length) > BLOCK_MAX {
            return Err(Error::InvalidBlockLength(length));
        }

        Ok(&self.block[1..=usize::from(length)])
    }

    /// Copies up to 32 bytes of `payload` into the block, and stores the
    /// number of bytes copied in the length byte.
    ///
    /// Returns the number of bytes copied.
    pub fn set_payload(&mut self, payload: &[u8]) -> usize {
        let length = payload.len().min(BLOCK_MAX);

        self.block[1..=length].copy_from_slice(&payload[..length]);
        self.block[length + 1..].fill(0);
        self.set_length(length as u8);

        length
    }

    /// Returns the raw buffer, including the length byte and padding.
    pub fn as_bytes(&self) -> &[u8; BLOCK_MAX + 2] {
        &self.block
    }
}

impl Default for Data {
    fn default() -> Data {
        Data::new()
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("length", &self.length())
            .field("block", &&self.block[1..])
            .finish()
    }
}

/// Transaction descriptor handed to the kernel by [`Smbus::dispatch`].
///
/// Mirrors `struct i2c_smbus_ioctl_data`. `data` is absent for Quick
/// Command and for Send Byte, where the value travels in `command`.
///
/// [`Smbus::dispatch`]: struct.Smbus.html#method.dispatch
#[derive(Debug)]
#[repr(C)]
pub struct Message<'a> {
    read_write: ReadWrite,
    command: u8,
    _pad: [u8; 2],
    size: TransactionType,
    // Same layout as a nullable pointer
    data: Option<&'a mut Data>,
}

impl<'a> Message<'a> {
    pub fn new(
        read_write: ReadWrite,
        command: u8,
        transaction_type: TransactionType,
        data: Option<&'a mut Data>,
    ) -> Message<'a> {
        Message {
            read_write,
            command,
            _pad: [0u8; 2],
            size: transaction_type,
            data,
        }
    }

    pub fn read_write(&self) -> ReadWrite {
        self.read_write
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.size
    }

    pub fn data(&self) -> Option<&Data> {
        self.data.as_deref()
    }

    pub fn data_mut(&mut self) -> Option<&mut Data> {
        self.data.as_deref_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, offset_of, size_of};

    #[test]
    fn message_layout() {
        assert_eq!(offset_of!(Message<'static>, read_write), 0);
        assert_eq!(offset_of!(Message<'static>, command), 1);
        assert_eq!(offset_of!(Message<'static>, size), 4);
        assert_eq!(offset_of!(Message<'static>, data), 8);
        assert_eq!(
            size_of::<Message<'static>>(),
            8 + size_of::<*mut Data>().max(align_of::<*mut Data>())
        );
        assert_eq!(size_of::<ReadWrite>(), 1);
        assert_eq!(size_of::<TransactionType>(), 4);
    }

    #[test]
    fn data_layout() {
        assert_eq!(size_of::<Data>(), 34);
        assert_eq!(align_of::<Data>(), 2);
    }

    #[test]
    fn tags_match_kernel_values() {
        assert_eq!(ReadWrite::Write as u8, 0);
        assert_eq!(ReadWrite::Read as u8, 1);
        assert_eq!(TransactionType::Quick as u32, 0);
        assert_eq!(TransactionType::BlockData as u32, 5);
        assert_eq!(TransactionType::I2cBlockBroken as u32, 6);
        assert_eq!(TransactionType::BlockProcessCall as u32, 7);
        assert_eq!(TransactionType::I2cBlockData as u32, 8);
    }

    #[test]
    fn word_uses_native_order() {
        let data = Data::with_word(0x1234);
        let expected = 0x1234u16.to_ne_bytes();

        assert_eq!(&data.as_bytes()[..2], &expected);
        assert_eq!(data.word(), 0x1234);
    }

    #[test]
    fn set_payload_truncates() {
        let mut data = Data::new();
        let payload: Vec<u8> = (0..40).collect();

        assert_eq!(data.set_payload(&payload), 32);
        assert_eq!(data.length(), 32);
        assert_eq!(data.payload().unwrap(), &payload[..32]);
        assert_eq!(data.as_bytes()[33], 0);
    }

    #[test]
    fn set_payload_clears_stale_bytes() {
        let mut data = Data::new();
        data.set_payload(&[0xAA; 10]);
        data.set_payload(&[0x55; 2]);

        assert_eq!(data.payload().unwrap(), &[0x55, 0x55]);
        assert!(data.as_bytes()[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut data = Data::new();
        data.set_length(40);

        assert!(matches!(data.payload(), Err(Error::InvalidBlockLength(40))));
    }

    #[test]
    fn empty_payload() {
        let data = Data::new();

        assert_eq!(data.payload().unwrap(), &[] as &[u8]);
    }
}
