use byteorder::{ByteOrder, LittleEndian};

use crate::SgError;

/// Marks the start of every SG file.
pub const SG_SYNC_WORD: u32 = 0xFEED_6666;
/// SG file format version written and accepted by this layer.
pub const SG_FILE_VERSION: u32 = 2;
/// Packet format selector for VDIF payloads.
pub const PACKET_FORMAT_VDIF: u32 = 0;

/// Byte length of the file header tag.
pub const FHT_BYTES: usize = 20;
/// Byte length of a write-block header tag.
pub const WBHT_BYTES: usize = 8;

/// The per-file header tag. Sync word, version, and packet format are fixed
/// by this layer; only the stream-dependent fields are carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeaderTag {
    /// VDIF packet size in bytes.
    pub packet_size: u32,
    /// Nominal write-block size in bytes (tag included).
    pub block_size: u32,
}

impl FileHeaderTag {
    /// Encodes the tag as it appears at byte 0 of an SG file.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FHT_BYTES] {
        let mut buf = [0u8; FHT_BYTES];
        LittleEndian::write_u32(&mut buf[0..4], SG_SYNC_WORD);
        LittleEndian::write_u32(&mut buf[4..8], SG_FILE_VERSION);
        LittleEndian::write_u32(&mut buf[8..12], PACKET_FORMAT_VDIF);
        LittleEndian::write_u32(&mut buf[12..16], self.packet_size);
        LittleEndian::write_u32(&mut buf[16..20], self.block_size);
        buf
    }

    /// Decodes and validates a file header tag.
    ///
    /// # Errors
    ///
    /// Rejects a wrong sync word, an unknown version, a non-VDIF packet
    /// format, a packet size too small to hold a VDIF header, and a block
    /// size too small to hold a block tag plus one packet.
    pub fn parse(buf: &[u8]) -> Result<Self, SgError> {
        debug_assert!(buf.len() >= FHT_BYTES);
        let sync = LittleEndian::read_u32(&buf[0..4]);
        if sync != SG_SYNC_WORD {
            return Err(SgError::BadSync(sync));
        }
        let version = LittleEndian::read_u32(&buf[4..8]);
        if version != SG_FILE_VERSION {
            return Err(SgError::UnsupportedVersion(version));
        }
        let format = LittleEndian::read_u32(&buf[8..12]);
        if format != PACKET_FORMAT_VDIF {
            return Err(SgError::UnsupportedFormat(format));
        }
        let packet_size = LittleEndian::read_u32(&buf[12..16]);
        if (packet_size as usize) < vdif::VDIF_HEADER_BYTES || packet_size % 8 != 0 {
            return Err(SgError::BadPacketSize(packet_size));
        }
        let block_size = LittleEndian::read_u32(&buf[16..20]);
        if block_size < WBHT_BYTES as u32 + packet_size {
            return Err(SgError::BadBlockSize(block_size));
        }
        Ok(Self {
            packet_size,
            block_size,
        })
    }
}

/// The header tag preceding each write block's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTag {
    /// Index of this block within its file.
    pub block_index: u32,
    /// Total block byte size, tag included.
    pub wb_size: u32,
}

impl BlockTag {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; WBHT_BYTES] {
        let mut buf = [0u8; WBHT_BYTES];
        LittleEndian::write_u32(&mut buf[0..4], self.block_index);
        LittleEndian::write_u32(&mut buf[4..8], self.wb_size);
        buf
    }

    #[must_use]
    pub fn parse(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= WBHT_BYTES);
        Self {
            block_index: LittleEndian::read_u32(&buf[0..4]),
            wb_size: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}
