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

use std::io;
use std::result;

use libc::{c_int, c_ulong, c_void, ioctl};

use super::Segment;

pub type Result<T> = result::Result<T, io::Error>;

#[cfg(target_env = "musl")]
type IoctlLong = libc::c_int;
#[cfg(not(target_env = "musl"))]
type IoctlLong = libc::c_ulong;

// Based on i2c.h, i2c-dev.h and the documentation at https://www.kernel.org/doc/Documentation/i2c
// and http://smbus.org/specs/SMBus_3_1_20180319.pdf

// Capabilities returned by REQ_FUNCS
const FUNC_I2C: c_ulong = 0x01;
const FUNC_10BIT_ADDR: c_ulong = 0x02;
const FUNC_PROTOCOL_MANGLING: c_ulong = 0x04;
const FUNC_SMBUS_PEC: c_ulong = 0x08;
const FUNC_NOSTART: c_ulong = 0x10;
const FUNC_SLAVE: c_ulong = 0x20;
const FUNC_SMBUS_BLOCK_PROC_CALL: c_ulong = 0x8000;
const FUNC_SMBUS_QUICK: c_ulong = 0x01_0000;
const FUNC_SMBUS_READ_BYTE: c_ulong = 0x02_0000;
const FUNC_SMBUS_WRITE_BYTE: c_ulong = 0x04_0000;
const FUNC_SMBUS_READ_BYTE_DATA: c_ulong = 0x08_0000;
const FUNC_SMBUS_WRITE_BYTE_DATA: c_ulong = 0x10_0000;
const FUNC_SMBUS_READ_WORD_DATA: c_ulong = 0x20_0000;
const FUNC_SMBUS_WRITE_WORD_DATA: c_ulong = 0x40_0000;
const FUNC_SMBUS_PROC_CALL: c_ulong = 0x80_0000;
const FUNC_SMBUS_READ_BLOCK_DATA: c_ulong = 0x0100_0000;
const FUNC_SMBUS_WRITE_BLOCK_DATA: c_ulong = 0x0200_0000;
const FUNC_SMBUS_READ_I2C_BLOCK: c_ulong = 0x0400_0000;
const FUNC_SMBUS_WRITE_I2C_BLOCK: c_ulong = 0x0800_0000;
const FUNC_SMBUS_HOST_NOTIFY: c_ulong = 0x1000_0000;

/// Functionality reported by the adapter driver behind an i2cdev node.
///
/// Each method checks a single `I2C_FUNC_*` bit. SMBus transactions the
/// adapter doesn't list may still be emulated by the kernel on top of plain
/// I2C transfers, in which case [`i2c`] is set.
///
/// [`i2c`]: #method.i2c
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Capabilities {
    funcs: c_ulong,
}

impl Capabilities {
    pub(crate) fn new(funcs: c_ulong) -> Capabilities {
        Capabilities { funcs }
    }

    fn has(&self, func: c_ulong) -> bool {
        (self.funcs & func) > 0
    }

    /// Plain I2C transfers (`I2C_RDWR`, `read`, `write`).
    pub fn i2c(&self) -> bool {
        self.has(FUNC_I2C)
    }

    /// 10-bit slave addresses.
    pub fn addr_10bit(&self) -> bool {
        self.has(FUNC_10BIT_ADDR)
    }

    pub fn protocol_mangling(&self) -> bool {
        self.has(FUNC_PROTOCOL_MANGLING)
    }

    /// SMBus Packet Error Checking.
    pub fn pec(&self) -> bool {
        self.has(FUNC_SMBUS_PEC)
    }

    pub fn nostart(&self) -> bool {
        self.has(FUNC_NOSTART)
    }

    pub fn slave(&self) -> bool {
        self.has(FUNC_SLAVE)
    }

    pub fn quick(&self) -> bool {
        self.has(FUNC_SMBUS_QUICK)
    }

    pub fn read_byte(&self) -> bool {
        self.has(FUNC_SMBUS_READ_BYTE)
    }

    pub fn write_byte(&self) -> bool {
        self.has(FUNC_SMBUS_WRITE_BYTE)
    }

    pub fn read_byte_data(&self) -> bool {
        self.has(FUNC_SMBUS_READ_BYTE_DATA)
    }

    pub fn write_byte_data(&self) -> bool {
        self.has(FUNC_SMBUS_WRITE_BYTE_DATA)
    }

    pub fn read_word_data(&self) -> bool {
        self.has(FUNC_SMBUS_READ_WORD_DATA)
    }

    pub fn write_word_data(&self) -> bool {
        self.has(FUNC_SMBUS_WRITE_WORD_DATA)
    }

    pub fn process_call(&self) -> bool {
        self.has(FUNC_SMBUS_PROC_CALL)
    }

    pub fn read_block_data(&self) -> bool {
        self.has(FUNC_SMBUS_READ_BLOCK_DATA)
    }

    pub fn write_block_data(&self) -> bool {
        self.has(FUNC_SMBUS_WRITE_BLOCK_DATA)
    }

    /// SMBus 2.0 Block Write - Block Read Process Call.
    pub fn block_process_call(&self) -> bool {
        self.has(FUNC_SMBUS_BLOCK_PROC_CALL)
    }

    pub fn read_i2c_block_data(&self) -> bool {
        self.has(FUNC_SMBUS_READ_I2C_BLOCK)
    }

    pub fn write_i2c_block_data(&self) -> bool {
        self.has(FUNC_SMBUS_WRITE_I2C_BLOCK)
    }

    pub fn host_notify(&self) -> bool {
        self.has(FUNC_SMBUS_HOST_NOTIFY)
    }
}

// ioctl() requests supported by i2cdev
const REQ_RETRIES: c_ulong = 0x0701; // How many retries when waiting for an ACK
const REQ_TIMEOUT: c_ulong = 0x0702; // Timeout in 10ms units
const REQ_SLAVE: c_ulong = 0x0703; // Set slave address
const REQ_TENBIT: c_ulong = 0x0704; // Use 10-bit slave addresses
const REQ_FUNCS: c_ulong = 0x0705; // Read I2C bus capabilities
const REQ_SLAVE_FORCE: c_ulong = 0x0706; // Set slave address, even if it's already in use by a driver
const REQ_RDWR: c_ulong = 0x0707; // Combined read/write transfer with a single STOP
const REQ_PEC: c_ulong = 0x0708; // SMBus: Use Packet Error Checking

// i2c_msg flags
const MSG_RD: u16 = 0x0001;
const MSG_TEN: u16 = 0x0010;

// I2C_RDWR_IOCTL_MAX_MSGS
const RDWR_SEGMENTS_MAX: usize = 42;
// i2cdev rejects longer messages
const RDWR_SEGMENT_LEN_MAX: usize = 8192;

// Mirrors struct i2c_msg
#[repr(C)]
struct RdwrSegment {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

// Mirrors struct i2c_rdwr_ioctl_data
#[repr(C)]
struct RdwrRequest {
    segments: *mut RdwrSegment,
    nmsgs: u32,
}

fn invalid_argument() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

/// Issues control operation `request` on `fd`, passing `argument` through untouched.
pub unsafe fn control(fd: c_int, request: c_ulong, argument: *mut c_void) -> Result<i32> {
    parse_retval!(ioctl(fd, request as IoctlLong, argument))
}

// All remaining requests take an unsigned long parameter, except for
// REQ_FUNCS and REQ_RDWR

pub unsafe fn set_slave_address(fd: c_int, value: c_ulong, force: bool) -> Result<i32> {
    let request = if force { REQ_SLAVE_FORCE } else { REQ_SLAVE };

    parse_retval!(ioctl(fd, request as IoctlLong, value))
}

pub unsafe fn set_addr_10bit(fd: c_int, value: c_ulong) -> Result<i32> {
    parse_retval!(ioctl(fd, REQ_TENBIT as IoctlLong, value))
}

pub unsafe fn set_pec(fd: c_int, value: c_ulong) -> Result<i32> {
    parse_retval!(ioctl(fd, REQ_PEC as IoctlLong, value))
}

pub unsafe fn set_timeout(fd: c_int, value: c_ulong) -> Result<i32> {
    parse_retval!(ioctl(fd, REQ_TIMEOUT as IoctlLong, value))
}

pub unsafe fn set_retries(fd: c_int, value: c_ulong) -> Result<i32> {
    parse_retval!(ioctl(fd, REQ_RETRIES as IoctlLong, value))
}

pub unsafe fn funcs(fd: c_int) -> Result<Capabilities> {
    let mut funcs: c_ulong = 0;

    parse_retval!(ioctl(fd, REQ_FUNCS as IoctlLong, &mut funcs))?;

    Ok(Capabilities::new(funcs))
}

pub unsafe fn i2c_transfer(
    fd: c_int,
    address: u16,
    addr_10bit: bool,
    segments: &mut [Segment<'_>],
) -> Result<i32> {
    if segments.is_empty() || segments.len() > RDWR_SEGMENTS_MAX {
        return Err(invalid_argument());
    }

    let flags = if addr_10bit { MSG_TEN } else { 0 };

    // The buffers stay borrowed through `segments` until ioctl() returns
    let mut rdwr_segments = Vec::with_capacity(segments.len());
    for segment in segments.iter_mut() {
        let (flags, len, buf) = match segment {
            Segment::Write(buffer) => (flags, buffer.len(), buffer.as_ptr() as *mut u8),
            Segment::Read(buffer) => (flags | MSG_RD, buffer.len(), buffer.as_mut_ptr()),
        };

        if len > RDWR_SEGMENT_LEN_MAX {
            return Err(invalid_argument());
        }

        rdwr_segments.push(RdwrSegment {
            addr: address,
            flags,
            len: len as u16,
            buf,
        });
    }

    let mut request = RdwrRequest {
        segments: rdwr_segments.as_mut_ptr(),
        nmsgs: rdwr_segments.len() as u32,
    };

    parse_retval!(ioctl(fd, REQ_RDWR as IoctlLong, &mut request))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_bits() {
        let caps = Capabilities::new(
            FUNC_I2C | FUNC_SMBUS_PEC | FUNC_SMBUS_READ_BLOCK_DATA | FUNC_SMBUS_READ_I2C_BLOCK,
        );

        assert!(caps.i2c());
        assert!(caps.pec());
        assert!(caps.read_block_data());
        assert!(caps.read_i2c_block_data());
        assert!(!caps.write_block_data());
        assert!(!caps.addr_10bit());
        assert!(!caps.block_process_call());
    }

    #[test]
    fn rdwr_segment_layout() {
        assert_eq!(std::mem::offset_of!(RdwrSegment, addr), 0);
        assert_eq!(std::mem::offset_of!(RdwrSegment, flags), 2);
        assert_eq!(std::mem::offset_of!(RdwrSegment, len), 4);
        assert_eq!(std::mem::offset_of!(RdwrSegment, buf), 8);
    }

    #[test]
    fn transfer_rejects_oversized_segments() {
        let write_buffer = vec![0u8; RDWR_SEGMENT_LEN_MAX + 1];
        let err = unsafe { i2c_transfer(-1, 0x50, false, &mut [Segment::Write(&write_buffer[..])]) }
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));

        let mut read_buffer = vec![0u8; RDWR_SEGMENT_LEN_MAX + 1];
        let err = unsafe { i2c_transfer(-1, 0x50, false, &mut [Segment::Read(&mut read_buffer[..])]) }
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }

    #[test]
    fn transfer_rejects_too_many_segments() {
        let buffer = [0u8; 1];
        let mut segments: Vec<Segment<'_>> = (0..=RDWR_SEGMENTS_MAX)
            .map(|_| Segment::Write(&buffer[..]))
            .collect();

        let err = unsafe { i2c_transfer(-1, 0x50, false, &mut segments) }.unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }

    #[test]
    fn transfer_rejects_empty_segment_list() {
        let err = unsafe { i2c_transfer(-1, 0x50, false, &mut []) }.unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }
}
