//! chainfs-chunks: fixed-size segmentation and reconstruction
//!
//! # Overview
//! - `segment`: source file → ordered list of `iv || ciphertext` wire chunks
//! - `reconstruct`: wire chunks → plaintext written to a sink, in order

pub mod reconstruct;
pub mod segment;

pub use reconstruct::{reconstruct, reconstruct_to_path};
pub use segment::{block_size, segment_file, segment_reader, ChunkedFile};
