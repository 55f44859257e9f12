//! Property-based tests for the pool counter prediction model.
//!
//! Covers:
//! - after-mmap and after-touch predictions for arbitrary pool shapes
//! - surplus retirement order across the full release walk
//! - conservation between free and still-backed pages across pool-spanning runs
//! - degradation when the buffer is smaller than the static pool

use hugecheck::{expected_counters, CheckConfig, LifecycleStep};
use proptest::prelude::*;

fn config(static_pages: usize, mapped_pages: usize) -> CheckConfig {
    CheckConfig {
        static_pages,
        mapped_pages,
        page_bytes: 2 * 1024 * 1024,
    }
}

/// Pages with live backing at a step: none right after mmap, all after the
/// touch pass, and whatever has not been released during the unmap walk.
fn backed(cfg: &CheckConfig, step: LifecycleStep) -> usize {
    match step {
        LifecycleStep::AfterMap => 0,
        LifecycleStep::AfterTouch => cfg.mapped_pages,
        LifecycleStep::AfterUnmap { released } => cfg.mapped_pages - released,
    }
}

// ── Single-step predictions ──────────────────────────────────────────────────

proptest! {
    /// Mapping reserves every page: reservations count as free, and the pool
    /// grows by exactly the overcommit allowance.
    #[test]
    fn prop_after_map_reserves_every_page(
        pool in 0usize..=256,
        extra in 0usize..=256,
    ) {
        let cfg = config(pool, pool + extra);
        let p = expected_counters(&cfg, LifecycleStep::AfterMap);
        prop_assert_eq!(p.total, cfg.mapped_pages);
        prop_assert_eq!(p.free, cfg.mapped_pages);
        prop_assert_eq!(p.reserved, cfg.mapped_pages);
        prop_assert_eq!(p.surplus, extra);
    }

    /// Touching converts every reservation into backing; nothing stays free
    /// or reserved, and the surplus is untouched.
    #[test]
    fn prop_after_touch_backs_every_page(
        pool in 0usize..=256,
        extra in 0usize..=256,
    ) {
        let cfg = config(pool, pool + extra);
        let p = expected_counters(&cfg, LifecycleStep::AfterTouch);
        prop_assert_eq!(p.total, cfg.mapped_pages);
        prop_assert_eq!(p.free, 0);
        prop_assert_eq!(p.reserved, 0);
        prop_assert_eq!(p.surplus, extra);
    }

    /// The final release leaves an idle pool: static size, no surplus, and
    /// as many free pages as the buffer could have drawn from the pool.
    #[test]
    fn prop_final_release_returns_pool_to_idle(
        pool in 0usize..=256,
        mapped in 1usize..=512,
    ) {
        let cfg = config(pool, mapped);
        let p = expected_counters(&cfg, LifecycleStep::AfterUnmap { released: mapped });
        prop_assert_eq!(p.total, pool);
        prop_assert_eq!(p.free, mapped.min(pool));
        prop_assert_eq!(p.reserved, 0);
        prop_assert_eq!(p.surplus, 0);
    }
}

// ── The full release walk ────────────────────────────────────────────────────

proptest! {
    /// Surplus retires strictly before anything frees up: the first
    /// `overcommit` releases shrink the pool one page per release with
    /// nothing free; from then on the pool holds still and free grows.
    #[test]
    fn prop_surplus_retires_before_pages_free(
        pool in 0usize..=128,
        mapped in 1usize..=256,
    ) {
        let cfg = config(pool, mapped);
        let overcommit = cfg.overcommit();
        for released in 1..=cfg.mapped_pages {
            let p = expected_counters(&cfg, LifecycleStep::AfterUnmap { released });
            if released < overcommit {
                prop_assert_eq!(p.surplus, overcommit - released);
                prop_assert_eq!(p.free, 0);
            } else {
                prop_assert_eq!(p.surplus, 0);
                prop_assert_eq!(p.free, released - overcommit);
            }
            prop_assert_eq!(p.reserved, 0);
        }
    }

    /// Across the unmap walk the total never grows and never undershoots
    /// the static pool size. An undersized buffer reports the buffer span
    /// as its total before the walk, so the chain starts at the first
    /// release.
    #[test]
    fn prop_total_is_monotone_and_floored_by_the_pool(
        pool in 0usize..=128,
        mapped in 1usize..=256,
    ) {
        let cfg = config(pool, mapped);
        let mut prev = expected_counters(&cfg, LifecycleStep::AfterUnmap { released: 1 }).total;
        for released in 1..=cfg.mapped_pages {
            let p = expected_counters(&cfg, LifecycleStep::AfterUnmap { released });
            prop_assert!(p.total <= prev, "total grew at release {released}");
            prop_assert!(p.total >= pool, "total fell below the pool at release {released}");
            prev = p.total;
        }
    }

    /// At every step of a run spanning the whole pool, total pages equal
    /// free pages plus pages with live backing. Reservations after mmap are
    /// counted as free, so the identity holds there too. An undersized
    /// buffer keeps its unmap totals pinned at the static pool size instead,
    /// which the undersized properties below cover.
    #[test]
    fn prop_pool_conserves_backed_pages(
        pool in 0usize..=128,
        extra in 0usize..=128,
    ) {
        let cfg = config(pool, pool + extra);
        let mut steps = vec![LifecycleStep::AfterMap, LifecycleStep::AfterTouch];
        steps.extend((1..=cfg.mapped_pages).map(|released| LifecycleStep::AfterUnmap { released }));

        for step in steps {
            let p = expected_counters(&cfg, step);
            prop_assert_eq!(
                p.total,
                p.free + backed(&cfg, step),
                "conservation broke at {}", step
            );
        }
    }
}

// ── Undersized mappings ──────────────────────────────────────────────────────

proptest! {
    /// A buffer smaller than the static pool never creates surplus, and each
    /// release frees exactly one page.
    #[test]
    fn prop_undersized_mapping_stays_inside_the_pool(
        mapped in 1usize..=128,
        slack in 1usize..=128,
    ) {
        let cfg = config(mapped + slack, mapped);
        prop_assert_eq!(cfg.overcommit(), 0);

        prop_assert_eq!(expected_counters(&cfg, LifecycleStep::AfterMap).surplus, 0);
        prop_assert_eq!(expected_counters(&cfg, LifecycleStep::AfterTouch).surplus, 0);
        for released in 1..=mapped {
            let p = expected_counters(&cfg, LifecycleStep::AfterUnmap { released });
            prop_assert_eq!(p.total, cfg.static_pages);
            prop_assert_eq!(p.free, released);
            prop_assert_eq!(p.reserved, 0);
            prop_assert_eq!(p.surplus, 0);
        }
    }
}
