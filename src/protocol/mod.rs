use uuid::Uuid;

use crate::core::error::TransferError;

/// Service UUID both peers use to find the file-transfer endpoint
/// (the well-known serial-port profile identifier).
pub const SERVICE_UUID: Uuid = uuid::uuid!("00001101-0000-1000-8000-00805f9b34fb");

/// Fixed service channel; there is no negotiation or versioning.
pub const SERVICE_CHANNEL: u8 = 6;

/// Default base port the TCP-bridged transport maps channels onto.
pub const DEFAULT_PORT_BASE: u16 = 42000;

/// The handshake header is exactly this many bytes: the decimal file size
/// as ASCII, left-justified and space-padded, no terminator.
pub const HEADER_LEN: usize = 20;

/// Transfer chunk size for both the send and receive loops.
pub const CHUNK_SIZE: usize = 1024;

/// Render a file size as the fixed-width handshake header.
pub fn encode_size_header(size: u64) -> [u8; HEADER_LEN] {
    let mut header = [b' '; HEADER_LEN];
    let digits = size.to_string();
    // u64 never exceeds 20 decimal digits, so this always fits.
    header[..digits.len()].copy_from_slice(digits.as_bytes());
    header
}

/// Parse a received handshake header into a declared size.
///
/// Anything that is not a positive decimal integer is rejected: all-space
/// payloads, negative numbers, trailing garbage, non-ASCII bytes.
pub fn parse_size_header(raw: &[u8; HEADER_LEN]) -> Result<u64, TransferError> {
    let text = std::str::from_utf8(raw).map_err(|_| TransferError::InvalidSizeHeader)?;
    let value: u64 = text
        .trim()
        .parse()
        .map_err(|_| TransferError::InvalidSizeHeader)?;
    if value == 0 {
        return Err(TransferError::InvalidSizeHeader);
    }
    Ok(value)
}
