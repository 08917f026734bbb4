//! chainfs-sync: the chunk-chain protocol
//!
//! Upload (`upload`): chunk *n* is posted with a backlink to chunk *n-1*, rotating
//! across data channels; the tail's address is then published to the
//! manifest channel and handed back as the locator.
//!
//! Retrieval (`retrieve`): start at the locator and follow backlinks
//! back to the head, then reverse.
//!
//! `engine` ties both ends to files on disk.

pub mod bootstrap;
pub mod engine;
pub mod retrieve;
pub mod retry;
pub mod session;
pub mod upload;

pub use engine::{download_file, upload_file, DownloadResult};
pub use retrieve::{fetch_chain, FetchedChain};
pub use retry::{with_retry, RetryPolicy};
pub use session::{LocatorHistory, Session, TransferSettings};
pub use upload::{upload_chain, UploadResult};

/// Progress callback type (chunks_done, chunks_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;
