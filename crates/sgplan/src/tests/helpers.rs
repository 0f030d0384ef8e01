use sgaccess::{BlockTag, FileHeaderTag, SgWriter, WBHT_BYTES};
use std::path::Path;
use vdif::{VdifHeader, VDIF_HEADER_BYTES};

use crate::PathTemplate;

/// Small synthetic packet size used by most tests (df_len = 8).
pub const PKT: usize = 64;

/// One synthetic VDIF frame of `pkt` bytes with a deterministic payload.
pub fn frame_with(pkt: usize, secs: u32, frm: u32) -> Vec<u8> {
    let h = VdifHeader {
        secs_inre: secs,
        df_num_insec: frm,
        ref_epoch: 30,
        df_len: (pkt / 8) as u32,
    };
    let mut buf = vec![0u8; pkt];
    h.write_to(&mut buf);
    for (i, b) in buf[VDIF_HEADER_BYTES..].iter_mut().enumerate() {
        *b = (i as u8) ^ (frm as u8) ^ (secs as u8);
    }
    buf
}

pub fn frame(secs: u32, frm: u32) -> Vec<u8> {
    frame_with(PKT, secs, frm)
}

/// `count` packed frames starting at `(secs, first)`, staying in that second.
pub fn frame_run(secs: u32, first: u32, count: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(count as usize * PKT);
    for i in 0..count {
        out.extend_from_slice(&frame(secs, first + i));
    }
    out
}

/// Writes an SG file of `PKT`-sized packets whose blocks each hold
/// `frames_per_block` frames starting at the given `(secs, frame)` stamps.
/// Used to rig shards that run ahead of or behind their peers.
pub fn write_rigged_file(path: &Path, frames_per_block: u32, starts: &[(u32, u32)]) {
    let block_size = frames_per_block as usize * PKT + WBHT_BYTES;
    let mut w = SgWriter::create(path, block_size, 1, 1).unwrap();
    let fht = FileHeaderTag {
        packet_size: PKT as u32,
        block_size: block_size as u32,
    };
    w.append(&fht.to_bytes()).unwrap();
    for (i, &(secs, first)) in starts.iter().enumerate() {
        let tag = BlockTag {
            block_index: i as u32,
            wb_size: block_size as u32,
        };
        w.append(&tag.to_bytes()).unwrap();
        w.append(&frame_run(secs, first, frames_per_block)).unwrap();
    }
    w.finalize().unwrap();
}

/// Decodes the `(secs, frame)` stamps of a packed run of `pkt`-byte frames.
pub fn frame_times_with(pkt: usize, data: &[u8]) -> Vec<(u32, u32)> {
    data.chunks(pkt)
        .map(|c| {
            let h = VdifHeader::parse(c).unwrap();
            (h.secs_inre, h.df_num_insec)
        })
        .collect()
}

pub fn frame_times(data: &[u8]) -> Vec<(u32, u32)> {
    frame_times_with(PKT, data)
}

/// Asserts that stamps run as one gap-free stream: frame counters increment
/// within each second and never move backwards.
pub fn assert_contiguous_run(times: &[(u32, u32)]) {
    for pair in times.windows(2) {
        let ((s0, f0), (s1, f1)) = (pair[0], pair[1]);
        assert!(
            s1 == s0 && f1 == f0 + 1,
            "gap between ({}, {}) and ({}, {})",
            s0,
            f0,
            s1,
            f1
        );
    }
}

/// A flat one-directory template: `<dir>/m%d_d%d_%s`.
pub fn flat_template(dir: &Path) -> PathTemplate {
    PathTemplate::parse(&format!("{}/m%d_d%d_%s", dir.display())).unwrap()
}

/// Path the flat template renders for (module, disk).
pub fn flat_path(dir: &Path, module: u32, disk: u32, pattern: &str) -> std::path::PathBuf {
    dir.join(format!("m{}_d{}_{}", module, disk, pattern))
}

pub fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().filter(|e| e.is_ok()).count()
}
