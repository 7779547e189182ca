//! CRC-32 helpers for record names and payloads

/// Name checksum: CRC-32 over the UTF-8 bytes of the lowercased name
pub fn name_checksum(name: &str) -> u32 {
    crc32fast::hash(name.to_lowercase().as_bytes())
}

/// Content checksum: CRC-32 over raw payload bytes
pub fn data_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
