#[cfg(not(target_pointer_width = "64"))]
compile_error!("hugecheck supports only 64-bit targets.");

#[cfg(not(target_os = "linux"))]
compile_error!("hugecheck drives Linux hugetlb interfaces and builds only on Linux.");

pub mod driver;
pub mod error;
pub mod meminfo;
pub mod model;
pub mod tunables;
pub mod vm;

// lifecycle driver
pub use driver::{Discrepancy, LifecycleCheck, RunReport};

// prediction model
pub use model::{expected_counters, CheckConfig, CounterField, LifecycleStep, PoolCounters};

// kernel interfaces
pub use meminfo::Meminfo;
pub use tunables::{set_overcommit_limit, set_static_pool, NR_HUGEPAGES, NR_OVERCOMMIT_HUGEPAGES};
pub use vm::{HugeRegion, PlatformVmOps, VmOps};

// errors
pub use error::{CheckError, Result};
