//! Drives the map → touch → unmap lifecycle and checks the kernel after
//! every step.
//!
//! The driver owns no verdict logic of its own: predictions come from
//! [`expected_counters`] and observations from [`Meminfo`]. A mismatch is
//! recorded and the run continues, so one bad counter produces a full
//! step-by-step trace instead of a single early abort. Only a failed mmap
//! or munmap ends the run, since the remaining steps would check a buffer
//! in an unknown state.

use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, trace, warn};

use crate::error::{CheckError, Result};
use crate::meminfo::Meminfo;
use crate::model::{expected_counters, CheckConfig, CounterField, LifecycleStep, PoolCounters};
use crate::vm::{HugeRegion, PlatformVmOps, VmOps};

/// One disagreement between the model and the kernel.
#[derive(Debug)]
pub enum Discrepancy {
    /// A counter field differed from its prediction.
    Counter {
        step: LifecycleStep,
        field: CounterField,
        expected: usize,
        observed: usize,
    },
    /// The counters could not be read at all at this step.
    Observation { step: LifecycleStep, error: CheckError },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::Counter {
                step,
                field,
                expected,
                observed,
            } => write!(f, "{step}: bad {field}, expected {expected} got {observed}"),
            Discrepancy::Observation { step, error } => {
                write!(f, "{step}: counters unreadable: {error}")
            }
        }
    }
}

/// Outcome of one full lifecycle run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Verification points visited (one per lifecycle step).
    pub checks: usize,
    /// Every recorded disagreement, in step order.
    pub discrepancies: Vec<Discrepancy>,
}

impl RunReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.discrepancies.is_empty()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.discrepancies.len()
    }
}

/// One scripted run of the lifecycle against a meminfo source.
pub struct LifecycleCheck<V: VmOps = PlatformVmOps> {
    config: CheckConfig,
    meminfo: Meminfo,
    _vm: PhantomData<V>,
}

impl LifecycleCheck {
    /// A check backed by the real hugetlb syscalls.
    #[must_use]
    pub fn new(config: CheckConfig, meminfo: Meminfo) -> Self {
        Self::with_vm(config, meminfo)
    }
}

impl<V: VmOps> LifecycleCheck<V> {
    /// A check with a substituted mapping backend.
    #[must_use]
    pub fn with_vm(config: CheckConfig, meminfo: Meminfo) -> Self {
        Self {
            config,
            meminfo,
            _vm: PhantomData,
        }
    }

    /// Run the whole lifecycle: map the buffer, touch every page, then
    /// release pages one at a time from the top, verifying the pool
    /// counters after every step.
    ///
    /// Returns the report even when discrepancies were found; `Err` means
    /// the buffer itself could not be driven through the script.
    pub fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();
        let pages = self.config.mapped_pages;

        let mut region = HugeRegion::<V>::map(pages, self.config.page_bytes)?;
        debug!(base = ?region.base(), pages, "mapped test buffer");
        self.verify(LifecycleStep::AfterMap, &mut report);

        region.touch_pages();
        debug!(pages, "touched every page");
        self.verify(LifecycleStep::AfterTouch, &mut report);

        for released in 1..=pages {
            let index = region.release_top()?;
            trace!(index, released, "released top page");
            self.verify(LifecycleStep::AfterUnmap { released }, &mut report);
        }

        Ok(report)
    }

    /// Compare a fresh counter snapshot against the model at `step`.
    ///
    /// Each mismatched field is its own discrepancy; an unreadable snapshot
    /// is one discrepancy for the whole step.
    fn verify(&self, step: LifecycleStep, report: &mut RunReport) {
        report.checks += 1;
        let expected = expected_counters(&self.config, step);

        match self.meminfo.counters() {
            Ok(observed) => {
                for field in PoolCounters::FIELDS {
                    let want = expected.field(field);
                    let got = observed.field(field);
                    if want != got {
                        warn!(%step, %field, want, got, "counter mismatch");
                        report.discrepancies.push(Discrepancy::Counter {
                            step,
                            field,
                            expected: want,
                            observed: got,
                        });
                    }
                }
            }
            Err(error) => {
                warn!(%step, %error, "pool counters unreadable");
                report.discrepancies.push(Discrepancy::Observation { step, error });
            }
        }
    }
}
