/*!
 * Byte order of multi-byte fields.
 */

/// Order in which the bytes of a multi-byte field appear on the wire
///
/// Bits inside a byte are always most-significant first. Byte order only
/// affects fields whose width is a whole number of bytes greater than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Most significant byte first (network order)
    #[default]
    BigEndian,
    /// Least significant byte first
    LittleEndian,
}

impl ByteOrder {
    /// Convert a value between big-endian and this order, for a field `bits` wide
    pub(crate) fn arrange(self, bits: usize, value: u64) -> u64 {
        match self {
            ByteOrder::LittleEndian if bits > 8 && bits % 8 == 0 => {
                value.swap_bytes() >> (64 - bits)
            }
            _ => value,
        }
    }
}
