//! Per-file shard state and the worker bodies run on reader/writer threads.

use sgaccess::{BlockTag, FileHeaderTag, SgError, SgFile, SgWriter, WBHT_BYTES};
use vdif::{FrameSpan, FrameTime, VdifHeader};

/// One fetched-but-unconsumed block of frames, owned by its shard until the
/// merger emits it. Present implies `n_frames > 0`.
#[derive(Debug)]
pub(crate) struct Staging {
    pub buf: Vec<u8>,
    pub n_frames: u32,
    /// First and last frame timestamps, decoded once at fetch time.
    pub span: FrameSpan,
}

/// Read-mode shard: an open SG file plus the read cursor and staging buffer.
#[derive(Debug)]
pub(crate) struct ReadShard {
    pub sg: SgFile,
    /// Index of the next block to fetch.
    pub next_block: usize,
    pub staging: Option<Staging>,
}

impl ReadShard {
    pub fn new(sg: SgFile) -> Self {
        Self {
            sg,
            next_block: 0,
            staging: None,
        }
    }

    /// The time extent of the staged block, if one is held.
    pub fn staged_span(&self) -> Option<FrameSpan> {
        self.staging.as_ref().map(|s| s.span)
    }

    /// `true` once every block has been fetched and the staging buffer has
    /// been drained.
    pub fn is_exhausted(&self) -> bool {
        self.staging.is_none() && self.next_block >= self.sg.total_blocks()
    }

    /// Reader worker body: copies the next block into staging and advances
    /// the cursor. Caller ensures staging is empty and a block remains.
    pub fn fetch_next(&mut self) -> Result<(), SgError> {
        debug_assert!(self.staging.is_none());
        let Some((payload, n_pkts)) = self.sg.block(self.next_block) else {
            return Ok(());
        };
        self.staging = Some(stage(payload, n_pkts, self.sg.packet_size())?);
        self.next_block += 1;
        Ok(())
    }

    /// Copies block `index` into a fresh buffer, leaving the cursor and any
    /// staged data untouched. Used by the single-shot random-access read.
    pub fn fetch_at(&self, index: usize) -> Result<Option<Staging>, SgError> {
        match self.sg.block(index) {
            Some((payload, n_pkts)) => Ok(Some(stage(payload, n_pkts, self.sg.packet_size())?)),
            None => Ok(None),
        }
    }
}

/// Builds an owned [`Staging`] from a mapped block payload, decoding the
/// first and last frame headers.
fn stage(payload: &[u8], n_pkts: u32, packet_size: u32) -> Result<Staging, SgError> {
    debug_assert!(n_pkts > 0);
    let first = VdifHeader::parse(payload)?.time();
    let last_off = (n_pkts as usize - 1) * packet_size as usize;
    let last = VdifHeader::parse(&payload[last_off..])?.time();
    Ok(Staging {
        buf: payload.to_vec(),
        n_frames: n_pkts,
        span: FrameSpan::new(first, last),
    })
}

/// Stream-wide parameters captured from the first header of the first
/// write call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamParams {
    pub packet_size: u32,
    pub ref_epoch: u8,
    pub first: FrameTime,
}

/// Write-mode shard: a growing SG file plus the count of blocks on disk.
#[derive(Debug)]
pub(crate) struct WriteShard {
    pub sg: SgWriter,
    pub block_index: u32,
}

impl WriteShard {
    pub fn new(sg: SgWriter) -> Self {
        Self { sg, block_index: 0 }
    }

    /// Writer worker body: appends one write block (file header tag first if
    /// this is the shard's first block) and advances the block count.
    pub fn append_block(
        &mut self,
        params: &StreamParams,
        nominal_block_size: u32,
        frames: &[u8],
        n_frames: u32,
    ) -> Result<(), SgError> {
        if self.block_index == 0 {
            let fht = FileHeaderTag {
                packet_size: params.packet_size,
                block_size: nominal_block_size,
            };
            self.sg.append(&fht.to_bytes())?;
        }
        let tag = BlockTag {
            block_index: self.block_index,
            wb_size: n_frames * params.packet_size + WBHT_BYTES as u32,
        };
        self.sg.append(&tag.to_bytes())?;
        self.sg.append(frames)?;
        self.block_index += 1;
        Ok(())
    }
}
