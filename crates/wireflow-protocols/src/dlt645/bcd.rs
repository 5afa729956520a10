/*!
 * Packed BCD numbers as DL/T 645 meters transmit them: least significant
 * byte first, two digits per byte. Signed formats use the top bit of the
 * most significant byte as the sign.
 */

/// Decode `bytes` into an integer; `None` on a nibble above 9
pub fn decode(bytes: &[u8], signed: bool) -> Option<i64> {
    let (last, rest) = bytes.split_last()?;
    if bytes.len() > 9 {
        return None;
    }

    let mut value: i64 = 0;
    let mut negative = false;
    let mut top = *last;
    if signed && top & 0x80 != 0 {
        negative = true;
        top &= 0x7F;
    }
    for byte in std::iter::once(&top).chain(rest.iter().rev()) {
        let (hi, lo) = (byte >> 4, byte & 0x0F);
        if hi > 9 || lo > 9 {
            return None;
        }
        value = value * 100 + i64::from(hi) * 10 + i64::from(lo);
    }
    Some(if negative { -value } else { value })
}

/// Encode `value` into exactly `width` bytes; `None` when it does not fit
pub fn encode(value: i64, width: usize, signed: bool) -> Option<Vec<u8>> {
    if width == 0 || width > 9 || (value < 0 && !signed) {
        return None;
    }
    let mut remaining = value.unsigned_abs();
    let mut bytes = Vec::with_capacity(width);
    for _ in 0..width {
        let lo = (remaining % 10) as u8;
        remaining /= 10;
        let hi = (remaining % 10) as u8;
        remaining /= 10;
        bytes.push((hi << 4) | lo);
    }
    if remaining != 0 {
        return None;
    }
    if signed {
        let top = bytes.last_mut()?;
        if *top & 0x80 != 0 {
            return None;
        }
        if value < 0 {
            *top |= 0x80;
        }
    }
    Some(bytes)
}
