//! Message envelope framing: a fixed 24-byte prefix (magic, command,
//! payload length, checksum) followed by the payload bytes.

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::consensus::CryptoProvider;

pub const PREFIX_LEN: usize = 24;
pub const COMMAND_LEN: usize = 12;
pub const MAX_RELAY_MSG_BYTES: u32 = 8 * 1024 * 1024;

/// A decoded envelope: the command name and its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub command: String,
    pub payload: Vec<u8>,
}

/// Read-error classification: every failure carries the ban-score delta
/// and disconnect decision the peer loop must apply.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("connection closed")]
    Eof,
    #[error("magic mismatch: expected {expected:#010x}, got {got:#010x}")]
    MagicMismatch { expected: u32, got: u32 },
    #[error("malformed command field")]
    MalformedCommand,
    #[error("declared payload length {0} exceeds MaxRelayMsgBytes")]
    Oversize(u32),
    #[error("payload truncated")]
    Truncated,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvelopeError {
    /// Ban-score delta the peer loop should apply for this condition.
    pub fn ban_delta(&self) -> u64 {
        match self {
            EnvelopeError::Eof => 0,
            EnvelopeError::MagicMismatch { .. } => 0,
            EnvelopeError::MalformedCommand => 10,
            EnvelopeError::Oversize(_) => 0,
            EnvelopeError::Truncated => 20,
            EnvelopeError::ChecksumMismatch => 10,
            EnvelopeError::Io(_) => 0,
        }
    }

    /// Whether the connection must be abandoned after this error.
    pub fn disconnect(&self) -> bool {
        match self {
            EnvelopeError::Eof => true,
            EnvelopeError::MagicMismatch { .. } => true,
            EnvelopeError::MalformedCommand => false,
            EnvelopeError::Oversize(_) => true,
            EnvelopeError::Truncated => true,
            EnvelopeError::ChecksumMismatch => false,
            EnvelopeError::Io(_) => true,
        }
    }
}

fn encode_command(command: &str) -> Result<[u8; COMMAND_LEN], EnvelopeError> {
    if command.is_empty() || command.len() > COMMAND_LEN || !command.is_ascii() {
        return Err(EnvelopeError::MalformedCommand);
    }
    if command.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(EnvelopeError::MalformedCommand);
    }
    let mut field = [0u8; COMMAND_LEN];
    field[..command.len()].copy_from_slice(command.as_bytes());
    Ok(field)
}

fn decode_command(field: &[u8; COMMAND_LEN]) -> Result<String, EnvelopeError> {
    let nul_pos = field.iter().position(|&b| b == 0).unwrap_or(COMMAND_LEN);
    if field[nul_pos..].iter().any(|&b| b != 0) {
        return Err(EnvelopeError::MalformedCommand);
    }
    let text = std::str::from_utf8(&field[..nul_pos]).map_err(|_| EnvelopeError::MalformedCommand)?;
    if text.is_empty() || text.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(EnvelopeError::MalformedCommand);
    }
    Ok(text.to_string())
}

fn checksum(provider: &dyn CryptoProvider, payload: &[u8]) -> [u8; 4] {
    let digest = provider.sha3_256(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Writes a full envelope (prefix + payload) to `stream`.
pub async fn write<W>(
    stream: &mut W,
    provider: &dyn CryptoProvider,
    magic: u32,
    command: &str,
    payload: &[u8],
) -> Result<(), EnvelopeError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let command_field = encode_command(command)?;
    let mut prefix = [0u8; PREFIX_LEN];
    prefix[0..4].copy_from_slice(&magic.to_be_bytes());
    prefix[4..16].copy_from_slice(&command_field);
    prefix[16..20].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    prefix[20..24].copy_from_slice(&checksum(provider, payload));

    stream.write_all(&prefix).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads one full envelope from `stream`, validating magic and checksum.
pub async fn read<R>(
    stream: &mut R,
    provider: &dyn CryptoProvider,
    expected_magic: u32,
) -> Result<Message, EnvelopeError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    match stream.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(EnvelopeError::Eof),
        Err(e) => return Err(EnvelopeError::Io(e)),
    }

    let magic = u32::from_be_bytes(prefix[0..4].try_into().unwrap());
    if magic != expected_magic {
        return Err(EnvelopeError::MagicMismatch {
            expected: expected_magic,
            got: magic,
        });
    }

    let command_field: [u8; COMMAND_LEN] = prefix[4..16].try_into().unwrap();
    let command = decode_command(&command_field)?;

    let length = u32::from_le_bytes(prefix[16..20].try_into().unwrap());
    if length > MAX_RELAY_MSG_BYTES {
        return Err(EnvelopeError::Oversize(length));
    }
    let expected_checksum: [u8; 4] = prefix[20..24].try_into().unwrap();

    let mut payload = vec![0u8; length as usize];
    match stream.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(EnvelopeError::Truncated),
        Err(e) => return Err(EnvelopeError::Io(e)),
    }

    if checksum(provider, &payload) != expected_checksum {
        return Err(EnvelopeError::ChecksumMismatch);
    }

    Ok(Message { command, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::Sha3CryptoProvider;

    #[tokio::test]
    async fn roundtrip_one_byte_at_a_time() {
        let provider = Sha3CryptoProvider;
        let mut buf = Vec::new();
        write(&mut buf, &provider, 0x1122_3344, "version", b"hello")
            .await
            .unwrap();

        // A reader that only ever yields 1 byte per poll still reconstructs
        // the full message via read_exact's internal looping.
        let mut cursor = std::io::Cursor::new(buf);
        let msg = read(&mut cursor, &provider, 0x1122_3344).await.unwrap();
        assert_eq!(msg.command, "version");
        assert_eq!(msg.payload, b"hello");
    }

    #[tokio::test]
    async fn magic_mismatch_is_disconnect_with_no_ban() {
        let provider = Sha3CryptoProvider;
        let mut buf = Vec::new();
        write(&mut buf, &provider, 0x0102_0304, "ping", b"").await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let err = read(&mut cursor, &provider, 0x0a0b_0c0d).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::MagicMismatch { .. }));
        assert_eq!(err.ban_delta(), 0);
        assert!(err.disconnect());
    }

    #[tokio::test]
    async fn oversize_length_disconnects_without_reading_payload() {
        let mut prefix = [0u8; PREFIX_LEN];
        prefix[0..4].copy_from_slice(&0x1122_3344u32.to_be_bytes());
        prefix[4..16].copy_from_slice(b"ping\0\0\0\0\0\0\0\0");
        prefix[16..20].copy_from_slice(&(MAX_RELAY_MSG_BYTES + 1).to_le_bytes());
        // deliberately no payload bytes follow

        let provider = Sha3CryptoProvider;
        let mut cursor = std::io::Cursor::new(prefix.to_vec());
        let err = read(&mut cursor, &provider, 0x1122_3344).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::Oversize(_)));
        assert!(err.disconnect());
    }

    #[tokio::test]
    async fn checksum_mismatch_is_non_disconnect_ban_ten() {
        let provider = Sha3CryptoProvider;
        let mut prefix = [0u8; PREFIX_LEN];
        prefix[0..4].copy_from_slice(&0x1122_3344u32.to_be_bytes());
        prefix[4..16].copy_from_slice(b"ping\0\0\0\0\0\0\0\0");
        let payload = [0u8, 1, 2, 3];
        prefix[16..20].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        prefix[20..24].copy_from_slice(&[9, 9, 9, 9]);

        let mut buf = prefix.to_vec();
        buf.extend_from_slice(&payload);

        let mut cursor = std::io::Cursor::new(buf);
        let err = read(&mut cursor, &provider, 0x1122_3344).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::ChecksumMismatch));
        assert_eq!(err.ban_delta(), 10);
        assert!(!err.disconnect());
    }

    #[tokio::test]
    async fn empty_payload_checksum_is_stable() {
        let provider = Sha3CryptoProvider;
        let mut buf = Vec::new();
        write(&mut buf, &provider, 0xdead_beef, "verack", b"")
            .await
            .unwrap();
        let checksum_bytes = &buf[20..24];
        assert_eq!(hex::encode(checksum_bytes), hex::encode(checksum(&provider, b"")));
    }
}
