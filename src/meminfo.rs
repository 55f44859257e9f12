//! Labeled-integer lookups against `/proc/meminfo` (or a stand-in file).
//!
//! The kernel publishes hugetlb pool state as `Label:   value` lines. Every
//! query re-opens the file and scans from the top, so callers always see the
//! kernel's current value and never a cached one.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{CheckError, Result};
use crate::model::PoolCounters;

const LABEL_TOTAL: &str = "HugePages_Total:";
const LABEL_FREE: &str = "HugePages_Free:";
const LABEL_RSVD: &str = "HugePages_Rsvd:";
const LABEL_SURP: &str = "HugePages_Surp:";
const LABEL_PAGE_SIZE: &str = "Hugepagesize:";

/// Handle to a meminfo-formatted file. Holds only the path; no state is
/// cached between queries.
#[derive(Debug, Clone)]
pub struct Meminfo {
    path: PathBuf,
}

impl Meminfo {
    /// The live kernel interface.
    #[must_use]
    pub fn system() -> Self {
        Self::at("/proc/meminfo")
    }

    /// A meminfo-formatted file at an arbitrary path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the four hugetlb pool counters, in pages.
    ///
    /// Each field is a fresh open-and-scan of the file; nothing is reused
    /// from earlier reads.
    pub fn counters(&self) -> Result<PoolCounters> {
        Ok(PoolCounters {
            total: self.field(LABEL_TOTAL)?,
            free: self.field(LABEL_FREE)?,
            reserved: self.field(LABEL_RSVD)?,
            surplus: self.field(LABEL_SURP)?,
        })
    }

    /// Default huge page size in bytes (`Hugepagesize:` is reported in kB).
    pub fn huge_page_bytes(&self) -> Result<usize> {
        Ok(self.field(LABEL_PAGE_SIZE)?.saturating_mul(1024))
    }

    /// First parseable integer following `label` at the start of a line.
    fn field(&self, label: &str) -> Result<usize> {
        let file = File::open(&self.path).map_err(|source| CheckError::Io {
            path: self.path.clone(),
            source,
        })?;
        match scan_lines(BufReader::new(file), label) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(CheckError::Parse {
                label: label.to_owned(),
                path: self.path.clone(),
            }),
            Err(source) => Err(CheckError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Scan for a line starting with `label` whose first following token parses
/// as an integer. A matching line with an unparseable value is skipped and
/// the scan continues; trailing tokens (such as a `kB` unit) are ignored.
fn scan_lines<R: BufRead>(reader: R, label: &str) -> io::Result<Option<usize>> {
    for line in reader.lines() {
        let line = line?;
        let Some(rest) = line.strip_prefix(label) else {
            continue;
        };
        if let Some(value) = rest.split_whitespace().next() {
            if let Ok(value) = value.parse::<usize>() {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}
