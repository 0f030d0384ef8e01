use super::helpers::*;
use crate::{ReadPlan, WriteOptions, WritePlan};
use anyhow::Result;
use sgaccess::WBHT_BYTES;
use tempfile::tempdir;

/// Drains a plan with `read_next_block` until it reports exhaustion,
/// concatenating everything emitted.
fn drain(plan: &mut ReadPlan) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let sb = plan.read_next_block().unwrap();
        out.extend_from_slice(&sb.data);
        if sb.is_empty() {
            assert!(
                plan.is_exhausted(),
                "empty super-block from a live plan: {:?}",
                plan
            );
            return out;
        }
    }
}

// --------------------- Round trips ---------------------

#[test]
fn single_shard_roundtrip_preserves_headers() -> Result<()> {
    const PKT_S1: usize = 8224;
    let dir = tempdir()?;
    let t = flat_template(dir.path());

    let mut stream = Vec::with_capacity(1000 * PKT_S1);
    for i in 0..1000u32 {
        stream.extend_from_slice(&frame_with(PKT_S1, 100, i));
    }

    let opts = WriteOptions::default().with_block_size(250 * PKT_S1);
    let mut wp = WritePlan::create(&t, "s1.vdif", &[1], &[0], opts)?;
    assert_eq!(wp.len(), 1);
    assert_eq!(wp.write_frames(&stream, 1000)?, 1000);
    wp.close()?;

    let mut rp = ReadPlan::open(&t, "s1.vdif", &[1], &[0])?;
    assert_eq!(rp.len(), 1);
    let bytes = drain(&mut rp);
    assert_eq!(bytes, stream);
    Ok(())
}

#[test]
fn four_shard_roundtrip_reproduces_ordered_stream() -> Result<()> {
    let dir = tempdir()?;
    let t = flat_template(dir.path());
    let fpb = 4usize;
    let n = 4 * fpb; // one full block per shard

    let stream = frame_run(100, 0, n as u32);
    let opts = WriteOptions::default().with_block_size(fpb * PKT);
    let mut wp = WritePlan::create(&t, "s2.vdif", &[1, 2], &[0, 1], opts)?;
    assert_eq!(wp.len(), 4);
    assert_eq!(wp.write_frames(&stream, n)?, n);
    wp.close()?;

    // each shard file holds exactly one block with the expected wb_size
    let expected_wb = (fpb * PKT + WBHT_BYTES) as u32;
    for module in [1, 2] {
        for disk in [0, 1] {
            let path = flat_path(dir.path(), module, disk, "s2.vdif");
            let sg = sgaccess::SgFile::open(&path)?;
            assert_eq!(sg.total_blocks(), 1);
            let bytes = std::fs::read(&path)?;
            let tag = sgaccess::BlockTag::parse(&bytes[sgaccess::FHT_BYTES..]);
            assert_eq!(tag.wb_size, expected_wb);
        }
    }

    let mut rp = ReadPlan::open(&t, "s2.vdif", &[1, 2], &[0, 1])?;
    assert_eq!(rp.len(), 4);
    let bytes = drain(&mut rp);
    assert_eq!(bytes, stream);
    assert_contiguous_run(&frame_times(&bytes));
    Ok(())
}

#[test]
fn block_accounting_over_full_steps() -> Result<()> {
    let dir = tempdir()?;
    let t = flat_template(dir.path());
    let fpb = 4usize;
    let n = 2 * 2 * fpb; // two blocks on each of two shards

    let stream = frame_run(100, 0, n as u32);
    let opts = WriteOptions::default().with_block_size(fpb * PKT);
    let mut wp = WritePlan::create(&t, "acct.vdif", &[1], &[0, 1], opts)?;
    wp.write_frames(&stream, n)?;
    wp.close()?;

    let mut rp = ReadPlan::open(&t, "acct.vdif", &[1], &[0, 1])?;
    let sb = rp.read_next_block()?;
    assert_eq!(sb.n_frames, 2 * fpb);
    assert_eq!(rp.blocks_read(), 2); // one block per live shard
    let sb = rp.read_next_block()?;
    assert_eq!(sb.n_frames, 2 * fpb);
    assert_eq!(rp.blocks_read(), 4);
    assert!(rp.is_exhausted());
    Ok(())
}

// --------------------- Plan construction ---------------------

#[test]
fn shards_are_sorted_by_first_frame_time() {
    let dir = tempdir().unwrap();
    let t = flat_template(dir.path());
    // candidate order: (1,0), (1,1), (1,2) — seeded in reverse time order
    write_rigged_file(&flat_path(dir.path(), 1, 0, "x"), 4, &[(102, 0)]);
    write_rigged_file(&flat_path(dir.path(), 1, 1, "x"), 4, &[(100, 0)]);
    write_rigged_file(&flat_path(dir.path(), 1, 2, "x"), 4, &[(101, 0)]);

    let rp = ReadPlan::open(&t, "x", &[1], &[0, 1, 2]).unwrap();
    assert_eq!(rp.len(), 3);
    // read_block_at concatenates in shard order
    let sb = rp.read_block_at(0).unwrap();
    let secs: Vec<u32> = frame_times(&sb.data).iter().map(|&(s, _)| s).collect();
    assert_eq!(secs[0], 100);
    assert_eq!(secs[4], 101);
    assert_eq!(secs[8], 102);
}

#[test]
fn missing_candidates_are_skipped() {
    let dir = tempdir().unwrap();
    let t = flat_template(dir.path());
    write_rigged_file(&flat_path(dir.path(), 2, 5, "x"), 4, &[(100, 0)]);

    let rp = ReadPlan::open(&t, "x", &[1, 2], &[4, 5]).unwrap();
    assert_eq!(rp.len(), 1);
}

#[test]
fn zero_shard_plan_reads_nothing() {
    let dir = tempdir().unwrap();
    let t = flat_template(dir.path());
    let mut rp = ReadPlan::open(&t, "nothing", &[1, 2], &[0, 1]).unwrap();
    assert_eq!(rp.len(), 0);
    assert!(rp.is_empty());
    let sb = rp.read_next_block().unwrap();
    assert!(sb.is_empty());
    assert!(rp.is_exhausted());
}

// --------------------- Merger retention across calls ---------------------

#[test]
fn lagging_shard_block_is_retained_until_emittable() {
    let dir = tempdir().unwrap();
    let t = flat_template(dir.path());
    let fpb = 250u32;

    // Shard 2 runs far ahead on its second block; shards 0 and 1 continue
    // the stream. The (100, 2000) block must wait, unread shards must keep
    // fetching, and no block may be read twice.
    write_rigged_file(
        &flat_path(dir.path(), 1, 0, "lag"),
        fpb,
        &[(100, 0), (100, 750), (100, 1250)],
    );
    write_rigged_file(
        &flat_path(dir.path(), 1, 1, "lag"),
        fpb,
        &[(100, 250), (100, 1000), (100, 1500)],
    );
    write_rigged_file(
        &flat_path(dir.path(), 1, 2, "lag"),
        fpb,
        &[(100, 500), (100, 2000)],
    );

    let mut rp = ReadPlan::open(&t, "lag", &[1], &[0, 1, 2]).unwrap();
    assert_eq!(rp.len(), 3);

    // call 1: blocks (0, 250, 500) chain into 750 frames
    let sb = rp.read_next_block().unwrap();
    assert_eq!(sb.n_frames, 750);
    assert_eq!(rp.blocks_read(), 3);

    // call 2: (750, 1000) chain; (2000) is staged but non-adjacent
    let sb = rp.read_next_block().unwrap();
    assert_eq!(sb.n_frames, 500);
    assert_eq!(rp.blocks_read(), 6);
    assert_eq!(frame_times(&sb.data)[0], (100, 750));

    // call 3: (1250, 1500) chain; the retained (2000) block still waits and
    // its shard consumed no further I/O
    let sb = rp.read_next_block().unwrap();
    assert_eq!(sb.n_frames, 500);
    assert_eq!(rp.blocks_read(), 8);
    assert_eq!(frame_times(&sb.data)[0], (100, 1250));
    assert!(!rp.is_exhausted());
    assert_eq!(rp.live_shards(), 1);

    // call 4: only the retained block is live; it is emitted alone even
    // though frames 1750..1999 never existed (cross-call continuity is not
    // verified)
    let sb = rp.read_next_block().unwrap();
    assert_eq!(sb.n_frames, 250);
    assert_eq!(frame_times(&sb.data)[0], (100, 2000));
    assert!(rp.is_exhausted());

    let sb = rp.read_next_block().unwrap();
    assert!(sb.is_empty());
}

// --------------------- Random access ---------------------

#[test]
fn read_block_at_does_not_disturb_streaming() -> Result<()> {
    let dir = tempdir()?;
    let t = flat_template(dir.path());
    let fpb = 4usize;
    let n = 2 * 2 * fpb;

    let stream = frame_run(100, 0, n as u32);
    let opts = WriteOptions::default().with_block_size(fpb * PKT);
    let mut wp = WritePlan::create(&t, "ra.vdif", &[1], &[0, 1], opts)?;
    wp.write_frames(&stream, n)?;
    wp.close()?;

    let mut rp = ReadPlan::open(&t, "ra.vdif", &[1], &[0, 1])?;
    let first = rp.read_next_block()?;
    assert_eq!(first.n_frames, 2 * fpb);

    // random access in the middle of the stream
    let sb = rp.read_block_at(0)?;
    assert_eq!(sb.n_frames, 2 * fpb);
    assert_eq!(rp.blocks_read(), 2); // cursors unchanged

    let rest = drain(&mut rp);
    let mut all = first.data;
    all.extend_from_slice(&rest);
    assert_eq!(all, stream);
    Ok(())
}

#[test]
fn read_block_at_past_end_is_empty() {
    let dir = tempdir().unwrap();
    let t = flat_template(dir.path());
    write_rigged_file(&flat_path(dir.path(), 1, 0, "x"), 4, &[(100, 0)]);
    let rp = ReadPlan::open(&t, "x", &[1], &[0]).unwrap();
    let sb = rp.read_block_at(5).unwrap();
    assert!(sb.is_empty());
}
