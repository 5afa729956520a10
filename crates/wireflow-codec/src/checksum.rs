/*!
 * Checksum algorithms for checksum fields.
 */
use crate::byte_order::ByteOrder;

/// Algorithm computing a checksum field over a covered byte range
pub trait Checksum: Send + Sync {
    /// Width of the checksum field in bits
    fn bits(&self) -> u8;

    /// Compute the checksum of `data`
    fn compute(&self, data: &[u8]) -> u64;

    /// Byte order of the checksum field on the wire
    fn byte_order(&self) -> ByteOrder {
        ByteOrder::BigEndian
    }
}

/// Sum of all bytes modulo 256 (DL/T 645, many serial protocols)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum8;

impl Checksum for Sum8 {
    fn bits(&self) -> u8 {
        8
    }

    fn compute(&self, data: &[u8]) -> u64 {
        u64::from(data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)))
    }
}

/// Exclusive-or of all bytes (BCC)
#[derive(Debug, Clone, Copy, Default)]
pub struct Xor8;

impl Checksum for Xor8 {
    fn bits(&self) -> u8 {
        8
    }

    fn compute(&self, data: &[u8]) -> u64 {
        u64::from(data.iter().fold(0u8, |acc, b| acc ^ *b))
    }
}

/// CRC-16/MODBUS: reflected polynomial 0xA001, initial value 0xFFFF, low byte first
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc16Modbus;

impl Checksum for Crc16Modbus {
    fn bits(&self) -> u8 {
        16
    }

    fn compute(&self, data: &[u8]) -> u64 {
        let mut crc: u16 = 0xFFFF;
        for byte in data {
            crc ^= u16::from(*byte);
            for _ in 0..8 {
                if crc & 1 == 1 {
                    crc = (crc >> 1) ^ 0xA001;
                } else {
                    crc >>= 1;
                }
            }
        }
        u64::from(crc)
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::LittleEndian
    }
}
