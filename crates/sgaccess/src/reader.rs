use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

use vdif::{FrameTime, VdifHeader};

use crate::format::{FileHeaderTag, FHT_BYTES, WBHT_BYTES};
use crate::SgError;

/// One indexed write block: payload byte offset and packet count.
#[derive(Debug, Clone, Copy)]
struct BlockEntry {
    payload: usize,
    n_pkts: u32,
}

/// Read-side accessor for a single SG file.
///
/// [`open`](SgFile::open) maps the whole file read-only and walks the block
/// chain once, building an in-memory index of `(payload offset, packet
/// count)` per block. After that, [`block`](SgFile::block) is a bounds check
/// plus a slice — packet bytes are served straight from the mapping.
///
/// The first packet's header is decoded during `open` so that a group of
/// files can be time-ordered without touching their data again.
pub struct SgFile {
    path: PathBuf,
    map: Mmap,
    packet_size: u32,
    pkts_per_block: u32,
    blocks: Vec<BlockEntry>,
    first: FrameTime,
    ref_epoch: u8,
}

impl SgFile {
    /// Opens and indexes an SG file.
    ///
    /// # Validation
    ///
    /// - The file header tag must carry the SG sync word, a supported
    ///   version, the VDIF packet format, and sane packet/block sizes.
    /// - Every block tag must declare a payload that is a non-zero whole
    ///   number of packets and must lie entirely within the file.
    /// - At least one complete block must be present.
    ///
    /// # Errors
    ///
    /// Returns [`SgError`] if the file cannot be opened or mapped, or if any
    /// validation above fails. Callers building a multi-file plan treat any
    /// such failure as "this candidate does not participate".
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SgError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let map = unsafe { Mmap::map(&file)? };

        if map.len() < FHT_BYTES + WBHT_BYTES {
            return Err(SgError::Empty);
        }
        let fht = FileHeaderTag::parse(&map[..FHT_BYTES])?;
        let packet_size = fht.packet_size;
        let pkts_per_block = (fht.block_size - WBHT_BYTES as u32) / packet_size;

        // Walk the block chain to the end of the file.
        let mut blocks = Vec::new();
        let mut offset = FHT_BYTES;
        while offset < map.len() {
            if offset + WBHT_BYTES > map.len() {
                return Err(SgError::BadBlock {
                    offset,
                    wb_size: 0,
                });
            }
            let tag = crate::format::BlockTag::parse(&map[offset..offset + WBHT_BYTES]);
            let payload_len = (tag.wb_size as usize).saturating_sub(WBHT_BYTES);
            let bad = payload_len == 0
                || payload_len % packet_size as usize != 0
                || offset + tag.wb_size as usize > map.len();
            if bad {
                return Err(SgError::BadBlock {
                    offset,
                    wb_size: tag.wb_size,
                });
            }
            blocks.push(BlockEntry {
                payload: offset + WBHT_BYTES,
                n_pkts: (payload_len / packet_size as usize) as u32,
            });
            offset += tag.wb_size as usize;
        }
        if blocks.is_empty() {
            return Err(SgError::Empty);
        }

        let first_header = VdifHeader::parse(&map[blocks[0].payload..])?;
        Ok(Self {
            path,
            map,
            packet_size,
            pkts_per_block,
            blocks,
            first: first_header.time(),
            ref_epoch: first_header.ref_epoch,
        })
    }

    /// Packet payload of block `index` and its packet count, or `None` past
    /// the last block. The slice borrows from the file mapping.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<(&[u8], u32)> {
        let entry = self.blocks.get(index)?;
        let len = entry.n_pkts as usize * self.packet_size as usize;
        Some((&self.map[entry.payload..entry.payload + len], entry.n_pkts))
    }

    /// Number of write blocks in the file.
    #[must_use]
    pub fn total_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// VDIF packet size in bytes.
    #[must_use]
    pub fn packet_size(&self) -> u32 {
        self.packet_size
    }

    /// Nominal packet count of a full write block.
    #[must_use]
    pub fn pkts_per_block(&self) -> u32 {
        self.pkts_per_block
    }

    /// Timestamp of the first frame in the file.
    #[must_use]
    pub fn first_time(&self) -> FrameTime {
        self.first
    }

    /// Reference epoch selector of the first frame.
    #[must_use]
    pub fn ref_epoch(&self) -> u8 {
        self.ref_epoch
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SgFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SgFile")
            .field("path", &self.path)
            .field("packet_size", &self.packet_size)
            .field("pkts_per_block", &self.pkts_per_block)
            .field("total_blocks", &self.blocks.len())
            .field("first", &self.first)
            .finish()
    }
}
