//! Predicted hugetlb pool counters across the map → touch → unmap lifecycle.
//!
//! The kernel retires surplus pages (pages allocated beyond the static pool
//! under the overcommit limit) before it returns anything to the static pool
//! as free. `expected_counters` encodes that policy as a pure function so a
//! run can be checked step by step against live `/proc/meminfo` values.

/// One observation or prediction of the hugetlb pool counters, in pages.
///
/// A value is produced once and never mutated; every observation is fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCounters {
    /// Pages committed to the pool (static allocation plus surplus).
    pub total: usize,
    /// Pages not currently backing any mapping.
    pub free: usize,
    /// Pages promised to a mapping but not yet fault-backed.
    pub reserved: usize,
    /// Pages allocated beyond the statically configured pool size.
    pub surplus: usize,
}

/// Names one field of [`PoolCounters`] for field-by-field comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    Total,
    Free,
    Reserved,
    Surplus,
}

impl PoolCounters {
    /// All fields, in the order they are reported.
    pub const FIELDS: [CounterField; 4] = [
        CounterField::Total,
        CounterField::Free,
        CounterField::Reserved,
        CounterField::Surplus,
    ];

    #[must_use]
    pub fn field(&self, field: CounterField) -> usize {
        match field {
            CounterField::Total => self.total,
            CounterField::Free => self.free,
            CounterField::Reserved => self.reserved,
            CounterField::Surplus => self.surplus,
        }
    }
}

impl std::fmt::Display for CounterField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short names matching the kernel counters these mirror.
        let name = match self {
            CounterField::Total => "total",
            CounterField::Free => "free",
            CounterField::Reserved => "rsvd",
            CounterField::Surplus => "surp",
        };
        f.write_str(name)
    }
}

/// Static configuration of one run; read-only after construction.
#[derive(Debug, Clone, Copy)]
pub struct CheckConfig {
    /// Statically configured pool size (`/proc/sys/vm/nr_hugepages`).
    pub static_pages: usize,
    /// Number of huge pages the test buffer spans.
    pub mapped_pages: usize,
    /// Host-reported default huge page size, queried once per run.
    pub page_bytes: usize,
}

impl CheckConfig {
    /// Pages the buffer needs beyond the static pool. Zero when the run
    /// requests no overcommit (`mapped_pages <= static_pages`).
    #[must_use]
    pub fn overcommit(&self) -> usize {
        self.mapped_pages.saturating_sub(self.static_pages)
    }
}

/// Position in the scripted lifecycle. Steps advance strictly in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    /// The full buffer is mapped; no page has been touched.
    AfterMap,
    /// Every page has been fault-backed by a one-byte write.
    AfterTouch,
    /// `released` pages have been unmapped so far, counted from the
    /// high-address end of the buffer (`1..=mapped_pages`).
    AfterUnmap { released: usize },
}

impl std::fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleStep::AfterMap => f.write_str("after mmap"),
            LifecycleStep::AfterTouch => f.write_str("after touch"),
            LifecycleStep::AfterUnmap { released } => write!(f, "after munmap {released}"),
        }
    }
}

/// Predict the pool counters the kernel must report at `step`.
///
/// Pure and deterministic. Subtractions saturate so the prediction stays
/// total when `mapped_pages < static_pages`; in that case no surplus ever
/// exists and unmapping only grows the free count.
#[must_use]
pub fn expected_counters(config: &CheckConfig, step: LifecycleStep) -> PoolCounters {
    let mapped = config.mapped_pages;
    let pool = config.static_pages;
    let overcommit = config.overcommit();

    match step {
        // Creating the mapping reserves every page up front; the pool grows
        // by the overcommit allowance to cover the reservation. Nothing is
        // fault-backed yet, so the reserved pages still count as free.
        LifecycleStep::AfterMap => PoolCounters {
            total: mapped,
            free: mapped,
            reserved: mapped,
            surplus: overcommit,
        },
        // First-touch faults convert every reservation into live backing.
        LifecycleStep::AfterTouch => PoolCounters {
            total: mapped,
            free: 0,
            reserved: 0,
            surplus: overcommit,
        },
        LifecycleStep::AfterUnmap { released } => {
            debug_assert!(
                (1..=mapped).contains(&released),
                "release count {released} outside 1..={mapped}"
            );
            let remaining = mapped.saturating_sub(released);
            if remaining > pool {
                // Surplus pages retire first: each release shrinks the pool
                // itself instead of freeing a page.
                PoolCounters {
                    total: remaining,
                    free: 0,
                    reserved: 0,
                    surplus: remaining - pool,
                }
            } else {
                // Surplus fully retired (boundary `remaining == pool`
                // included); further releases return pages to the static
                // pool as free.
                PoolCounters {
                    total: pool,
                    free: released.saturating_sub(overcommit),
                    reserved: 0,
                    surplus: 0,
                }
            }
        }
    }
}
