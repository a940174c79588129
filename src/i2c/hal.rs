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

use embedded_hal::i2c::{self, ErrorType, I2c as I2cHal, Operation as I2cOperation};

use super::{Error, I2c, Segment};

impl ErrorType for I2c {
    type Error = Error;
}

impl i2c::Error for Error {
    fn kind(&self) -> i2c::ErrorKind {
        if let Error::Io(e) = self {
            match e.raw_os_error() {
                Some(libc::ENXIO) | Some(libc::EREMOTEIO) => {
                    i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Unknown)
                }
                Some(libc::EAGAIN) => i2c::ErrorKind::ArbitrationLoss,
                Some(libc::EIO) | Some(libc::EPROTO) => i2c::ErrorKind::Bus,
                _ => i2c::ErrorKind::Other,
            }
        } else {
            i2c::ErrorKind::Other
        }
    }
}

/// `I2c` trait implementation for `embedded-hal` v1.0.0.
///
/// Each call selects `address` with [`set_slave_address`] before transferring.
/// All operations of a transaction are sent as a single combined transfer.
///
/// [`set_slave_address`]: struct.I2c.html#method.set_slave_address
impl I2cHal for I2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [I2cOperation<'_>],
    ) -> Result<(), Self::Error> {
        self.set_slave_address(u16::from(address), false)?;

        if operations.is_empty() {
            return Ok(());
        }

        let mut segments: Vec<Segment<'_>> = operations
            .iter_mut()
            .map(|op| match op {
                I2cOperation::Read(buffer) => Segment::Read(&mut buffer[..]),
                I2cOperation::Write(buffer) => Segment::Write(&buffer[..]),
            })
            .collect();

        I2c::transfer(self, &mut segments)
    }
}

#[cfg(all(test, feature = "hal"))]
mod tests {
    use super::*;

    use std::io;

    fn kind(errno: i32) -> i2c::ErrorKind {
        i2c::Error::kind(&Error::Io(io::Error::from_raw_os_error(errno)))
    }

    #[test]
    fn error_kinds() {
        let no_ack = i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Unknown);

        assert_eq!(kind(libc::ENXIO), no_ack);
        assert_eq!(kind(libc::EREMOTEIO), no_ack);
        assert_eq!(kind(libc::EAGAIN), i2c::ErrorKind::ArbitrationLoss);
        assert_eq!(kind(libc::EIO), i2c::ErrorKind::Bus);
        assert_eq!(kind(libc::EPROTO), i2c::ErrorKind::Bus);
        assert_eq!(kind(libc::EINVAL), i2c::ErrorKind::Other);
        assert_eq!(
            i2c::Error::kind(&Error::InvalidBlockLength(40)),
            i2c::ErrorKind::Other
        );
    }

    #[test]
    fn transaction_selects_address_first() {
        let mut i2c = I2c::with_path("/dev/null").unwrap();

        assert!(matches!(
            I2cHal::write(&mut i2c, 0x05, &[0x01]),
            Err(Error::InvalidSlaveAddress(0x05))
        ));

        match I2cHal::write_read(&mut i2c, 0x50, &[0x00], &mut [0u8; 2]) {
            Err(Error::Io(err)) => assert_eq!(err.raw_os_error(), Some(libc::ENOTTY)),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
