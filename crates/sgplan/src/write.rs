//! Write pipeline: round-robin block striping across growing SG files.

use anyhow::{anyhow, bail, ensure, Result};
use sgaccess::{SgWriter, WBHT_BYTES};
use std::thread;
use tracing::{debug, error, warn};
use vdif::{FrameTime, VdifHeader};

use crate::path::PathTemplate;
use crate::shard::{StreamParams, WriteShard};
use crate::{GROWTH_BLOCKS, INITIAL_BLOCKS, WBLOCK_SIZE};

/// Sizing knobs for a write plan's backing files.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Nominal write-block byte size; frames per block is
    /// `block_size / packet_size`.
    pub block_size: usize,
    /// Blocks pre-allocated when each file is created.
    pub initial_blocks: usize,
    /// Blocks added per mapping growth step.
    pub growth_blocks: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            block_size: WBLOCK_SIZE,
            initial_blocks: INITIAL_BLOCKS,
            growth_blocks: GROWTH_BLOCKS,
        }
    }
}

impl WriteOptions {
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub fn with_initial_blocks(mut self, initial_blocks: usize) -> Self {
        self.initial_blocks = initial_blocks;
        self
    }

    #[must_use]
    pub fn with_growth_blocks(mut self, growth_blocks: usize) -> Self {
        self.growth_blocks = growth_blocks;
        self
    }
}

/// A write-mode plan distributing an incoming frame stream across SG files.
///
/// Frames are striped in write-block-sized chunks, round-robin across the
/// shards, each chunk appended by its own worker thread into that shard's
/// growing memory map. [`close`](WritePlan::close) trims every file to its
/// exact data length and unlinks files that never received a frame.
pub struct WritePlan {
    shards: Vec<WriteShard>,
    opts: WriteOptions,
    params: Option<StreamParams>,
}

impl WritePlan {
    /// Creates a write plan, one backing file per (module, disk) pair.
    ///
    /// One worker thread per candidate creates, sizes, and maps the file; a
    /// candidate whose create or map fails is dropped from the plan with a
    /// warning. Shards are kept in candidate order — there is no data to
    /// time-sort yet.
    ///
    /// # Errors
    ///
    /// Returns an error only if a create worker panics.
    pub fn create(
        template: &PathTemplate,
        pattern: &str,
        modules: &[u32],
        disks: &[u32],
        opts: WriteOptions,
    ) -> Result<Self> {
        let paths = template.candidates(pattern, modules, disks);
        let created = thread::scope(|s| -> Result<Vec<SgWriter>> {
            let handles: Vec<_> = paths
                .iter()
                .map(|path| {
                    s.spawn(move || {
                        SgWriter::create(path, opts.block_size, opts.initial_blocks, opts.growth_blocks)
                    })
                })
                .collect();
            let mut created = Vec::new();
            for (handle, path) in handles.into_iter().zip(&paths) {
                match handle.join() {
                    Ok(Ok(sg)) => created.push(sg),
                    Ok(Err(e)) => {
                        warn!(path = %path.display(), error = %e, "dropping write shard");
                    }
                    Err(_) => return Err(anyhow!("create worker panicked")),
                }
            }
            Ok(created)
        })?;

        debug!(n_shards = created.len(), "write plan ready");
        Ok(Self {
            shards: created.into_iter().map(WriteShard::new).collect(),
            opts,
            params: None,
        })
    }

    /// Number of shards in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Total write blocks on disk across all shards.
    #[must_use]
    pub fn blocks_written(&self) -> u64 {
        self.shards.iter().map(|sh| u64::from(sh.block_index)).sum()
    }

    /// Timestamp of the first frame ever written, once known.
    #[must_use]
    pub fn first_time(&self) -> Option<FrameTime> {
        self.params.map(|p| p.first)
    }

    /// Reference epoch of the stream, once known.
    #[must_use]
    pub fn ref_epoch(&self) -> Option<u8> {
        self.params.map(|p| p.ref_epoch)
    }

    /// Writes `n_frames` VDIF frames from `frames`, striped round-robin
    /// across the shards one write block at a time.
    ///
    /// On the first write (no shard has a block yet) the packet size,
    /// reference epoch, and starting timestamp are captured from the first
    /// frame's header. Striping starts at the shard with the fewest blocks
    /// on disk, keeping shard sizes balanced across calls. Each cycle
    /// assigns at most one chunk per shard, runs one writer thread per
    /// assigned shard, and joins before the next cycle.
    ///
    /// Returns the number of frames written. A shard I/O failure stops the
    /// call at the last chunk completed in stripe order (logged at error
    /// level), so the return value may be short.
    pub fn write_frames(&mut self, frames: &[u8], n_frames: usize) -> Result<usize> {
        ensure!(!self.shards.is_empty(), "write plan has no shards");
        if n_frames == 0 {
            return Ok(0);
        }

        if self.shards.iter().all(|sh| sh.block_index == 0) {
            let header = VdifHeader::parse(frames)?;
            ensure!(header.df_len > 0, "first frame declares zero length");
            self.params = Some(StreamParams {
                packet_size: header.frame_len() as u32,
                ref_epoch: header.ref_epoch,
                first: header.time(),
            });
        }
        let Some(params) = self.params else {
            bail!("stream parameters missing on a non-first write");
        };

        let packet_size = params.packet_size as usize;
        ensure!(
            frames.len() >= n_frames * packet_size,
            "frame buffer holds fewer than {} frames of {} bytes",
            n_frames,
            packet_size
        );
        let frames_per_block = self.opts.block_size / packet_size;
        ensure!(
            frames_per_block > 0,
            "packet size {} exceeds block size {}",
            packet_size,
            self.opts.block_size
        );
        let nominal_block_size = (frames_per_block * packet_size + WBHT_BYTES) as u32;

        // Start with the emptiest shard, ties broken by shard order.
        let start = self
            .shards
            .iter()
            .enumerate()
            .min_by_key(|(_, sh)| sh.block_index)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let n_shards = self.shards.len();

        let mut written = 0usize;
        let mut remaining = &frames[..n_frames * packet_size];
        while !remaining.is_empty() {
            // One chunk per shard per cycle, in stripe order: start, start+1,
            // ... wrapping around.
            let (head, tail) = self.shards.split_at_mut(start);
            let mut assigned: Vec<(&mut WriteShard, &[u8], u32)> = Vec::with_capacity(n_shards);
            for sh in tail.iter_mut().chain(head.iter_mut()) {
                if remaining.is_empty() {
                    break;
                }
                let take = frames_per_block.min(remaining.len() / packet_size);
                let (chunk, rest) = remaining.split_at(take * packet_size);
                remaining = rest;
                assigned.push((sh, chunk, take as u32));
            }

            let meta: Vec<(u32, String)> = assigned
                .iter()
                .map(|(sh, _, take)| (*take, sh.sg.path().display().to_string()))
                .collect();
            let results = thread::scope(|s| -> Result<Vec<_>> {
                let handles: Vec<_> = assigned
                    .into_iter()
                    .map(|(sh, chunk, take)| {
                        s.spawn(move || sh.append_block(&params, nominal_block_size, chunk, take))
                    })
                    .collect();
                let mut results = Vec::with_capacity(handles.len());
                for handle in handles {
                    results.push(
                        handle
                            .join()
                            .map_err(|_| anyhow!("writer worker panicked"))?,
                    );
                }
                Ok(results)
            })?;

            for ((take, path), result) in meta.into_iter().zip(results) {
                match result {
                    Ok(()) => written += take as usize,
                    Err(e) => {
                        error!(path = %path, error = %e, "write block failed, stopping short");
                        return Ok(written);
                    }
                }
            }
        }
        Ok(written)
    }

    /// Finalizes every shard: files are truncated to their exact written
    /// length, and files that never received a frame are unlinked.
    pub fn close(mut self) -> Result<()> {
        for shard in self.shards.drain(..) {
            shard.sg.finalize()?;
        }
        Ok(())
    }
}

/// Best-effort finalization when a plan is dropped without
/// [`close`](WritePlan::close); errors are ignored because `Drop` cannot
/// report them.
impl Drop for WritePlan {
    fn drop(&mut self) {
        for shard in self.shards.drain(..) {
            let _ = shard.sg.finalize();
        }
    }
}

impl std::fmt::Debug for WritePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePlan")
            .field("n_shards", &self.shards.len())
            .field("blocks_written", &self.blocks_written())
            .field("params", &self.params)
            .finish()
    }
}
