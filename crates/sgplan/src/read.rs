//! Read pipeline: parallel per-shard block fetch and the contiguity merge.

use anyhow::{anyhow, Context, Result};
use sgaccess::SgFile;
use std::thread;
use tracing::debug;

use crate::merge::contiguous_mapping;
use crate::path::PathTemplate;
use crate::shard::ReadShard;
use crate::SuperBlock;

/// A read-mode plan over every SG file found for one recording.
///
/// Construction probes all `modules × disks` candidate paths in parallel
/// and keeps the ones that open as valid SG files, sorted ascending by the
/// timestamp of their first frame. Each call to
/// [`read_next_block`](ReadPlan::read_next_block) then produces one
/// super-block of the reassembled stream.
pub struct ReadPlan {
    shards: Vec<ReadShard>,
}

impl ReadPlan {
    /// Builds a read plan for `pattern` over the given modules and disks.
    ///
    /// One worker thread per candidate path attempts to open and index the
    /// file; candidates that are missing or fail SG validation are skipped
    /// (not every module/disk is populated). Zero opened shards is a valid
    /// plan — every read then returns an empty super-block.
    ///
    /// # Errors
    ///
    /// Returns an error only if a probe worker panics.
    pub fn open(
        template: &PathTemplate,
        pattern: &str,
        modules: &[u32],
        disks: &[u32],
    ) -> Result<Self> {
        let paths = template.candidates(pattern, modules, disks);
        let opened = thread::scope(|s| -> Result<Vec<SgFile>> {
            let handles: Vec<_> = paths
                .iter()
                .map(|path| s.spawn(move || SgFile::open(path)))
                .collect();
            let mut opened = Vec::new();
            for (handle, path) in handles.into_iter().zip(&paths) {
                match handle.join() {
                    Ok(Ok(sg)) => opened.push(sg),
                    Ok(Err(e)) => {
                        debug!(path = %path.display(), error = %e, "skipping candidate");
                    }
                    Err(_) => return Err(anyhow!("probe worker panicked")),
                }
            }
            Ok(opened)
        })?;

        let mut shards: Vec<ReadShard> = opened.into_iter().map(ReadShard::new).collect();
        shards.sort_by_key(|sh| sh.sg.first_time());
        debug!(n_shards = shards.len(), "read plan ready");
        Ok(Self { shards })
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

    /// Total blocks fetched so far across all shards.
    #[must_use]
    pub fn blocks_read(&self) -> u64 {
        self.shards.iter().map(|sh| sh.next_block as u64).sum()
    }

    /// Shards that still hold staged data or have blocks left to fetch.
    #[must_use]
    pub fn live_shards(&self) -> usize {
        self.shards.iter().filter(|sh| !sh.is_exhausted()).count()
    }

    /// `true` once every shard has been fetched to the end and drained. An
    /// empty super-block from a non-exhausted plan means the stream stalled
    /// on a discontinuity instead.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.shards.iter().all(ReadShard::is_exhausted)
    }

    /// Reads the next super-block of temporally contiguous frames.
    ///
    /// One reader thread runs for every shard whose staging is empty and
    /// which has blocks remaining; shards still holding a block from a
    /// previous call are left alone. After the join, staged blocks are
    /// ordered by timestamp and the contiguous prefix is concatenated into
    /// the output; non-adjacent blocks stay staged for later calls, so a
    /// shard that ran ahead waits without re-reading.
    ///
    /// An empty super-block means either end of input or a stall — see
    /// [`is_exhausted`](ReadPlan::is_exhausted).
    pub fn read_next_block(&mut self) -> Result<SuperBlock> {
        let Some(packet_size) = self.shards.first().map(|sh| sh.sg.packet_size()) else {
            return Ok(SuperBlock::default());
        };
        // Sized for retained plus newly read blocks; over-allocation is fine.
        let estimate: usize = self
            .shards
            .iter()
            .map(|sh| sh.sg.pkts_per_block() as usize * packet_size as usize)
            .sum();

        thread::scope(|s| -> Result<()> {
            let mut handles = Vec::with_capacity(self.shards.len());
            for sh in &mut self.shards {
                if sh.staging.is_none() && sh.next_block < sh.sg.total_blocks() {
                    handles.push(s.spawn(move || sh.fetch_next()));
                }
            }
            for handle in handles {
                handle
                    .join()
                    .map_err(|_| anyhow!("reader worker panicked"))?
                    .context("block fetch failed")?;
            }
            Ok(())
        })?;

        let spans: Vec<_> = self.shards.iter().map(ReadShard::staged_span).collect();
        let (k, mapping) = contiguous_mapping(&spans);
        if k == 0 {
            debug!("no contiguous blocks staged");
            return Ok(SuperBlock::default());
        }

        let mut out = SuperBlock {
            data: Vec::with_capacity(estimate),
            n_frames: 0,
        };
        for &m in &mapping[..k] {
            let sh = &mut self.shards[(m - 1) as usize];
            if let Some(staging) = sh.staging.take() {
                out.data.extend_from_slice(&staging.buf);
                out.n_frames += staging.n_frames as usize;
            }
        }
        Ok(out)
    }

    /// Reads block `index` from every shard and concatenates the results in
    /// shard order, without any contiguity check.
    ///
    /// Meant for random access and diagnostics; staged data and read
    /// cursors are not disturbed, so an in-progress streaming read can
    /// resume afterwards. Shards without such a block contribute nothing.
    pub fn read_block_at(&self, index: usize) -> Result<SuperBlock> {
        let fetched = thread::scope(|s| -> Result<Vec<_>> {
            let handles: Vec<_> = self
                .shards
                .iter()
                .map(|sh| s.spawn(move || sh.fetch_at(index)))
                .collect();
            let mut fetched = Vec::with_capacity(handles.len());
            for handle in handles {
                fetched.push(
                    handle
                        .join()
                        .map_err(|_| anyhow!("reader worker panicked"))?
                        .context("block fetch failed")?,
                );
            }
            Ok(fetched)
        })?;

        let mut out = SuperBlock::default();
        for staging in fetched.into_iter().flatten() {
            out.data.extend_from_slice(&staging.buf);
            out.n_frames += staging.n_frames as usize;
        }
        Ok(out)
    }

    /// Closes the plan, dropping every shard's file mapping and any staged
    /// data still held.
    pub fn close(self) {}
}

impl std::fmt::Debug for ReadPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for sh in &self.shards {
            list.entry(&format_args!(
                "{}: block {}/{}, staged {:?}",
                sh.sg.path().display(),
                sh.next_block,
                sh.sg.total_blocks(),
                sh.staged_span(),
            ));
        }
        list.finish()
    }
}
