/// Reflected CRC16 with polynomial 0xA001, the variant Modbus RTU uses.
/// The shift is masked to 15 bits before the conditional xor, the same way the
/// firmware on the devices computes it.
pub fn calc_crc16(data: &[u8], start: Option<u16>) -> u16 {
    let mut crc = start.unwrap_or(0xffff);
    for &b in data {
        crc ^= b as u16;
        for _ in 0..8 {
            let mask = if crc & 0x0001 != 0 { 0xA001 } else { 0x0000 };
            crc = ((crc >> 1) & 0x7FFF) ^ mask;
        }
    }

    crc
}

pub fn calc_crc16_default(data: &[u8]) -> u16 {
    calc_crc16(data, None)
}
