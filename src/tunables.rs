//! Writers for the hugetlb sysctl knobs under `/proc/sys/vm`.
//!
//! The kernel may clamp a written value (for example when memory for the
//! requested pool cannot be allocated), so callers must treat a successful
//! write as a request and read `/proc/meminfo` for the pool that actually
//! materialized.

use std::fs;
use std::path::Path;

use crate::error::{CheckError, Result};

/// Statically allocated pool size, in pages.
pub const NR_HUGEPAGES: &str = "/proc/sys/vm/nr_hugepages";

/// Upper bound on surplus pages allocatable beyond the static pool.
pub const NR_OVERCOMMIT_HUGEPAGES: &str = "/proc/sys/vm/nr_overcommit_hugepages";

/// Write a page count to a sysctl-style file.
pub fn write_tunable(path: impl AsRef<Path>, pages: usize) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, format!("{pages}\n")).map_err(|source| CheckError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Request a static pool of `pages` huge pages.
pub fn set_static_pool(pages: usize) -> Result<()> {
    write_tunable(NR_HUGEPAGES, pages)
}

/// Allow up to `pages` surplus huge pages beyond the static pool.
pub fn set_overcommit_limit(pages: usize) -> Result<()> {
    write_tunable(NR_OVERCOMMIT_HUGEPAGES, pages)
}
