//! # SG access — single scatter-gather file layer
//!
//! One SG file holds a slice of a VDIF recording as a sequence of
//! *write-blocks*. This crate owns everything about a single file: the
//! bit-exact on-disk tags, the read-side accessor that maps and indexes a
//! file, and the write-side memory-map manager that grows a file as blocks
//! are appended. Coordinating many SG files into one logical stream is the
//! `sgplan` crate's job.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ FILE HEADER TAG (20 bytes)                                    │
//! │                                                               │
//! │ sync_word (u32) | version (u32) | packet_format (u32)         │
//! │ packet_size (u32) | block_size (u32)                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ WRITE BLOCK                                                   │
//! │                                                               │
//! │ block_index (u32) | wb_size (u32)                             │
//! │ payload: packed VDIF packets, (wb_size - 8) bytes             │
//! ├───────────────────────────────────────────────────────────────┤
//! │ ... repeated write blocks ...                                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. `block_size` in the file header is the
//! *nominal* block byte size; each block's `wb_size` records its true size,
//! so a file's final block may be short.

mod format;
mod reader;
mod writer;

pub use format::{
    BlockTag, FileHeaderTag, FHT_BYTES, PACKET_FORMAT_VDIF, SG_FILE_VERSION, SG_SYNC_WORD,
    WBHT_BYTES,
};
pub use reader::SgFile;
pub use writer::SgWriter;

use std::io;
use thiserror::Error;

/// Errors produced while accessing a single SG file.
#[derive(Debug, Error)]
pub enum SgError {
    /// An underlying I/O or mapping error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A VDIF header inside the file could not be decoded.
    #[error("vdif header: {0}")]
    Header(#[from] vdif::HeaderError),

    /// The file does not start with the SG sync word.
    #[error("bad sync word {0:#010x}")]
    BadSync(u32),

    /// The file carries an SG version this layer does not speak.
    #[error("unsupported SG file version {0}")]
    UnsupportedVersion(u32),

    /// The file stores a packet format other than VDIF.
    #[error("unsupported packet format {0}")]
    UnsupportedFormat(u32),

    /// The declared packet size cannot hold a VDIF header.
    #[error("bad packet size {0}")]
    BadPacketSize(u32),

    /// The declared nominal block size cannot hold a block tag and a packet.
    #[error("bad block size {0}")]
    BadBlockSize(u32),

    /// A block tag at `offset` declares a size inconsistent with the packet
    /// size or running past end of file.
    #[error("bad write block at offset {offset}: wb_size {wb_size}")]
    BadBlock { offset: usize, wb_size: u32 },

    /// The file header is valid but no complete write block follows it.
    #[error("SG file contains no write blocks")]
    Empty,
}
