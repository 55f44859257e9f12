//! Crate-wide error type.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, CheckError>;

/// Errors produced while reading kernel state or mutating the test mapping.
///
/// Only `Map` (and a mid-run `Unmap`) terminate a run; status-source failures
/// are recorded per step by the driver and the run continues.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no integer value for {label:?} in {}", path.display())]
    Parse { label: String, path: PathBuf },

    #[error("hugetlb mmap of {len} bytes failed: {source}")]
    Map {
        len: usize,
        #[source]
        source: io::Error,
    },

    #[error("munmap of page {index} failed: {source}")]
    Unmap {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("{pages} pages of {page_bytes} bytes exceed the address space")]
    RegionTooLarge { pages: usize, page_bytes: usize },
}
