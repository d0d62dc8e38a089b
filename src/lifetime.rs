//! Lifetime Aggregator
//!
//! Recomputes year ledgers from their constituent months, and the all-time
//! totals from the year ledgers. Year and all-time records are derived
//! views: they are always rebuilt top-down from authoritative month data
//! rather than updated incrementally, so they stay consistent with the
//! months even after out-of-band edits to historical entries.
//!
//! Fields on an existing year or all-time record that the schema does not
//! cover (manually curated offsets and the like) are preserved verbatim;
//! a recompute must never silently delete unknown keys.

use std::collections::BTreeMap;

use crate::models::PeriodTotals;

/// Rebuild one year's totals from every month whose key carries the year
/// prefix. Returns `None` when the year has no months at all: "no data" and
/// "all zero" are different answers, and a year must not materialise with a
/// ledger of zeros.
///
/// `previous` is the year's existing ledger entry, if any; its residual
/// fields carry over.
pub fn recompute_year(
    monthly: &BTreeMap<String, PeriodTotals>,
    year: &str,
    previous: Option<&PeriodTotals>,
) -> Option<PeriodTotals> {
    let mut months = monthly
        .iter()
        .filter(|(key, _)| key.starts_with(year))
        .map(|(_, totals)| totals)
        .peekable();
    months.peek()?;

    let mut total = PeriodTotals::default();
    for month in months {
        total.combine(month);
    }
    total.round_fields();
    total.recompute_rate();

    if let Some(previous) = previous {
        total.extra = previous.extra.clone();
    }
    Some(total)
}

/// Combine all year ledgers into the all-time totals, same rules as
/// [`recompute_year`].
pub fn recompute_all_time(
    lifetime: &BTreeMap<String, PeriodTotals>,
    previous: Option<&PeriodTotals>,
) -> PeriodTotals {
    let mut total = PeriodTotals::default();
    for year in lifetime.values() {
        total.combine(year);
    }
    total.round_fields();
    total.recompute_rate();

    if let Some(previous) = previous {
        total.extra = previous.extra.clone();
    }
    total
}
