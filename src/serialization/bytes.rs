//! Fixed-width little-endian primitives.
//!
//! Every function writes or reads at an arbitrary offset of a pre-sized
//! buffer. Callers guarantee `offset + width <= buf.len()`; anything else
//! panics on the slice index.

pub fn write_i16(buf: &mut [u8], offset: usize, value: i16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn write_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn write_f32(buf: &mut [u8], offset: usize, value: f32) {
    write_i32(buf, offset, value.to_bits() as i32);
}

pub fn read_i16(buf: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([buf[offset], buf[offset + 1]])
}

pub fn read_i32(buf: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(raw)
}

pub fn read_i64(buf: &[u8], offset: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_le_bytes(raw)
}

pub fn read_f32(buf: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_i32(buf, offset) as u32)
}
