/// Write a u16 to a buffer in little endian format.
pub fn write_u16_le(buffer: &mut [u8], value: u16) {
	buffer[..2].copy_from_slice(&value.to_le_bytes());
}

/// Read a u16 in little endian format from a buffer.
pub fn read_u16_le(buffer: &[u8]) -> u16 {
	u16::from_le_bytes([buffer[0], buffer[1]])
}

/// Write a u32 to a buffer in little endian format.
pub fn write_u32_le(buffer: &mut [u8], value: u32) {
	buffer[..4].copy_from_slice(&value.to_le_bytes());
}

/// Read a u32 in little endian format from a buffer.
pub fn read_u32_le(buffer: &[u8]) -> u32 {
	u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]])
}
