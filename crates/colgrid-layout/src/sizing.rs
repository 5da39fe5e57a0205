#![forbid(unsafe_code)]

//! Column width solver.
//!
//! [`compute`] is a pure function of the container width, the ordered visible
//! columns, the per-column preferences and an optional live resize. It runs on
//! every container resize and every drag update, so it only does bounded
//! integer work:
//!
//! 1. Columns with mode `fixed` or an explicit preference width are *fixed*;
//!    the rest are *flex*.
//! 2. Fixed columns take their preference width (or preferred width), never
//!    below their minimum.
//! 3. The remaining width is split across flex columns proportionally to
//!    their preferred width. Columns whose share falls below their minimum are
//!    pinned at the minimum and the rest is re-split (water-filling, at most
//!    one pass per flex column).
//! 4. When flex minimums do not fit, flex columns sit at their minimum and
//!    fixed columns give up their slack above minimum. Only when every column
//!    is at its minimum does the table overflow.
//! 5. A live resize on column `X` trades width with its right neighbour `N`
//!    so the pair total never changes.
//!
//! Fractional pixels are resolved by largest remainder (ties to the left), so
//! totals are exact: the widths sum to the container width, or to the sum of
//! minimums when the table overflows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ColumnId;
use crate::registry::{Column, ColumnMode};

/// Persisted per-column override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnPreference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ColumnMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

impl ColumnPreference {
    /// A user-set fixed width, as written by a resize commit.
    #[must_use]
    pub const fn fixed(width: u32) -> Self {
        Self {
            mode: Some(ColumnMode::Fixed),
            width: Some(width),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.mode.is_none() && self.width.is_none()
    }
}

/// Per-column overrides keyed by column id.
pub type ColumnPreferences = BTreeMap<ColumnId, ColumnPreference>;

/// A live drag on the right boundary of `column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveResize {
    pub column: ColumnId,
    pub start_width: u32,
    pub accumulated_delta: i64,
}

/// Computed pixel widths in visible order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnWidths {
    entries: Vec<(ColumnId, u32)>,
}

impl ColumnWidths {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(column, _)| column.as_str() == id)
            .map(|&(_, width)| width)
    }

    /// Sum of all widths.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|&(_, w)| u64::from(w)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnId, u32)> + '_ {
        self.entries.iter().map(|(id, w)| (id, *w))
    }

    /// Widths only, in visible order.
    #[must_use]
    pub fn values(&self) -> Vec<u32> {
        self.entries.iter().map(|&(_, w)| w).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn to_map(&self) -> BTreeMap<ColumnId, u32> {
        self.entries.iter().cloned().collect()
    }
}

/// Whether `column` is sized as a fixed column under `preference`.
#[must_use]
pub fn is_fixed(column: &Column, preference: Option<&ColumnPreference>) -> bool {
    fixed_width(column, preference).is_some()
}

/// Sum of minimum widths; the table overflows when the container is narrower.
#[must_use]
pub fn min_total(columns: &[&Column]) -> u64 {
    columns.iter().map(|c| u64::from(c.min_width())).sum()
}

/// Compute the width of every visible column.
///
/// `columns` must be in visible order; the result follows the same order.
#[must_use]
pub fn compute(
    container_width: u32,
    columns: &[&Column],
    preferences: &ColumnPreferences,
    active: Option<&ActiveResize>,
) -> ColumnWidths {
    let mut widths = solve(container_width, columns, preferences);
    if let Some(resize) = active {
        apply_push_pull(&mut widths, columns, resize);
    }
    ColumnWidths {
        entries: columns
            .iter()
            .zip(widths)
            .map(|(column, width)| (column.id().clone(), width))
            .collect(),
    }
}

fn fixed_width(column: &Column, preference: Option<&ColumnPreference>) -> Option<u32> {
    let mode = preference
        .and_then(|p| p.mode)
        .unwrap_or(column.column_mode());
    let width = preference.and_then(|p| p.width);
    if mode == ColumnMode::Fixed || width.is_some() {
        Some(
            width
                .unwrap_or(column.preferred_width())
                .max(column.min_width()),
        )
    } else {
        None
    }
}

fn solve(container_width: u32, columns: &[&Column], preferences: &ColumnPreferences) -> Vec<u32> {
    let mut widths = vec![0u32; columns.len()];
    let mut fixed = Vec::new();
    let mut flex = Vec::new();

    for (i, column) in columns.iter().enumerate() {
        match fixed_width(column, preferences.get(column.id())) {
            Some(width) => {
                widths[i] = width;
                fixed.push(i);
            }
            None => flex.push(i),
        }
    }

    let container = u64::from(container_width);
    let fixed_total: u64 = fixed.iter().map(|&i| u64::from(widths[i])).sum();
    let flex_min: u64 = flex
        .iter()
        .map(|&i| u64::from(columns[i].min_width()))
        .sum();

    if container >= fixed_total + flex_min {
        let remaining = container - fixed_total;
        if flex.is_empty() {
            // Trailing column fills the gap so the table spans the container.
            if let Some(last) = widths.last_mut() {
                *last = to_px(u64::from(*last) + remaining);
            }
        } else {
            water_fill(remaining, &flex, columns, &mut widths);
        }
    } else {
        for &i in &flex {
            widths[i] = columns[i].min_width();
        }
        shrink_fixed(container.saturating_sub(flex_min), &fixed, columns, &mut widths);
    }

    widths
}

/// Split `pool` over `flex` by preferred width, pinning columns whose share
/// would fall below their minimum.
///
/// Invariant: `pool >= sum(min)` over the still-active columns, so at least
/// one column stays unpinned in every pass.
fn water_fill(mut pool: u64, flex: &[usize], columns: &[&Column], widths: &mut [u32]) {
    let mut active: Vec<usize> = flex.to_vec();

    for _ in 0..flex.len() {
        let weight: u64 = active
            .iter()
            .map(|&i| u64::from(columns[i].preferred_width()))
            .sum();
        let (pinned, rest): (Vec<usize>, Vec<usize>) = active.iter().partition(|&&i| {
            let column = columns[i];
            u128::from(pool) * u128::from(column.preferred_width())
                < u128::from(column.min_width()) * u128::from(weight)
        });
        if pinned.is_empty() {
            break;
        }
        for &i in &pinned {
            let min = columns[i].min_width();
            widths[i] = min;
            pool -= u64::from(min);
        }
        active = rest;
        if active.is_empty() {
            break;
        }
    }

    if active.is_empty() {
        if let Some(&last) = flex.last() {
            widths[last] = to_px(u64::from(widths[last]) + pool);
        }
        return;
    }

    let weights: Vec<u64> = active
        .iter()
        .map(|&i| u64::from(columns[i].preferred_width()))
        .collect();
    for (&i, share) in active.iter().zip(apportion(pool, &weights)) {
        widths[i] = to_px(share);
    }
}

/// Bring fixed columns down to `budget` total, taking width from each in
/// proportion to its slack above minimum.
fn shrink_fixed(budget: u64, fixed: &[usize], columns: &[&Column], widths: &mut [u32]) {
    let min_total: u64 = fixed
        .iter()
        .map(|&i| u64::from(columns[i].min_width()))
        .sum();
    let current: u64 = fixed.iter().map(|&i| u64::from(widths[i])).sum();

    if budget >= current {
        return;
    }
    if budget <= min_total {
        for &i in fixed {
            widths[i] = columns[i].min_width();
        }
        return;
    }

    let slack: Vec<u64> = fixed
        .iter()
        .map(|&i| u64::from(widths[i] - columns[i].min_width()))
        .collect();
    for (&i, keep) in fixed.iter().zip(apportion(budget - min_total, &slack)) {
        widths[i] = to_px(u64::from(columns[i].min_width()) + keep);
    }
}

/// Largest-remainder apportionment of `pool` by `weights`. Ties go to the
/// lower index. The result always sums to `pool` when any weight is non-zero.
fn apportion(pool: u64, weights: &[u64]) -> Vec<u64> {
    let total: u128 = weights.iter().map(|&w| u128::from(w)).sum();
    if total == 0 {
        return vec![0; weights.len()];
    }

    let mut shares = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    let mut assigned = 0u64;
    for (pos, &weight) in weights.iter().enumerate() {
        let scaled = u128::from(pool) * u128::from(weight);
        let share = (scaled / total) as u64;
        shares.push(share);
        remainders.push((scaled % total, pos));
        assigned += share;
    }

    let leftover = (pool - assigned) as usize;
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, pos) in remainders.iter().take(leftover) {
        shares[pos] += 1;
    }
    shares
}

fn apply_push_pull(widths: &mut [u32], columns: &[&Column], resize: &ActiveResize) {
    let Some(x) = columns.iter().position(|c| *c.id() == resize.column) else {
        return;
    };
    let n = x + 1;
    if n >= columns.len() {
        return;
    }

    let pair = i64::from(widths[x]) + i64::from(widths[n]);
    let lower = i64::from(columns[x].min_width());
    let upper = pair - i64::from(columns[n].min_width());
    if upper < lower {
        return;
    }

    let desired = i64::from(resize.start_width).saturating_add(resize.accumulated_delta);
    let resized = desired.clamp(lower, upper);
    widths[x] = to_px(resized as u64);
    widths[n] = to_px((pair - resized) as u64);
}

fn to_px(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Vec<Column> {
        vec![
            Column::new("a", 80, 120),
            Column::new("b", 100, 100),
            Column::fixed("c", 60, 60),
        ]
    }

    fn refs(columns: &[Column]) -> Vec<&Column> {
        columns.iter().collect()
    }

    #[test]
    fn splits_remaining_width_by_preferred_width() {
        let cols = abc();
        let widths = compute(800, &refs(&cols), &ColumnPreferences::new(), None);
        assert_eq!(widths.get("c"), Some(60));
        assert_eq!(widths.get("a"), Some(404));
        assert_eq!(widths.get("b"), Some(336));
        assert_eq!(widths.total(), 800);
    }

    #[test]
    fn overflow_pins_everything_at_minimum() {
        let cols = abc();
        let widths = compute(180, &refs(&cols), &ColumnPreferences::new(), None);
        assert_eq!(widths.values(), vec![80, 100, 60]);
        assert_eq!(widths.total(), 240);
    }

    #[test]
    fn water_filling_redistributes_clamped_deficit() {
        // Shares by preference would give `narrow` 30px, below its 90px minimum.
        let cols = vec![
            Column::new("wide", 10, 900),
            Column::new("narrow", 90, 100),
        ];
        let widths = compute(300, &refs(&cols), &ColumnPreferences::new(), None);
        assert_eq!(widths.get("narrow"), Some(90));
        assert_eq!(widths.get("wide"), Some(210));
    }

    #[test]
    fn cascading_clamps_converge() {
        let cols = vec![
            Column::new("huge", 10, 1000),
            Column::new("m1", 50, 60),
            Column::new("m2", 70, 80),
        ];
        let widths = compute(200, &refs(&cols), &ColumnPreferences::new(), None);
        assert_eq!(widths.get("m1"), Some(50));
        assert_eq!(widths.get("m2"), Some(70));
        assert_eq!(widths.get("huge"), Some(80));
    }

    #[test]
    fn preference_width_makes_column_fixed() {
        let cols = abc();
        let mut prefs = ColumnPreferences::new();
        prefs.insert(ColumnId::from("a"), ColumnPreference { mode: None, width: Some(200) });
        let widths = compute(800, &refs(&cols), &prefs, None);
        assert_eq!(widths.get("a"), Some(200));
        assert_eq!(widths.get("b"), Some(540));
        assert!(is_fixed(&cols[0], prefs.get("a")));
    }

    #[test]
    fn preference_width_below_minimum_is_clamped() {
        let cols = abc();
        let mut prefs = ColumnPreferences::new();
        prefs.insert(ColumnId::from("a"), ColumnPreference::fixed(10));
        let widths = compute(800, &refs(&cols), &prefs, None);
        assert_eq!(widths.get("a"), Some(80));
    }

    #[test]
    fn auto_preference_unfixes_a_fixed_column() {
        let cols = abc();
        let mut prefs = ColumnPreferences::new();
        prefs.insert(
            ColumnId::from("c"),
            ColumnPreference { mode: Some(ColumnMode::Auto), width: None },
        );
        let widths = compute(560, &refs(&cols), &prefs, None);
        // 560 split 120:100:60
        assert_eq!(widths.values(), vec![240, 200, 120]);
    }

    #[test]
    fn all_fixed_columns_let_the_last_one_fill() {
        let cols = vec![Column::fixed("x", 10, 50), Column::fixed("y", 10, 50)];
        let widths = compute(300, &refs(&cols), &ColumnPreferences::new(), None);
        assert_eq!(widths.values(), vec![50, 250]);
    }

    #[test]
    fn fixed_columns_yield_slack_before_overflowing() {
        let cols = vec![
            Column::fixed("x", 50, 250),
            Column::fixed("y", 50, 150),
            Column::new("flex", 100, 100),
        ];
        // Flex needs 100, fixed want 400, container 300 -> fixed get 200 total.
        let widths = compute(300, &refs(&cols), &ColumnPreferences::new(), None);
        assert_eq!(widths.get("flex"), Some(100));
        // Slack 200:100 keeps 100px between them: 67 + 33.
        assert_eq!(widths.get("x"), Some(117));
        assert_eq!(widths.get("y"), Some(83));
        assert_eq!(widths.total(), 300);
    }

    #[test]
    fn empty_column_set() {
        let widths = compute(500, &[], &ColumnPreferences::new(), None);
        assert!(widths.is_empty());
        assert_eq!(widths.total(), 0);
    }

    #[test]
    fn push_pull_keeps_pair_total() {
        let cols = abc();
        let base = compute(800, &refs(&cols), &ColumnPreferences::new(), None);
        let resize = ActiveResize {
            column: ColumnId::from("a"),
            start_width: base.get("a").unwrap(),
            accumulated_delta: 30,
        };
        let widths = compute(800, &refs(&cols), &ColumnPreferences::new(), Some(&resize));
        assert_eq!(widths.get("a"), Some(434));
        assert_eq!(widths.get("b"), Some(306));
        assert_eq!(widths.get("c"), Some(60));
        assert_eq!(widths.total(), 800);
    }

    #[test]
    fn push_pull_stops_at_neighbour_minimum() {
        let cols = abc();
        let base = compute(800, &refs(&cols), &ColumnPreferences::new(), None);
        let resize = ActiveResize {
            column: ColumnId::from("a"),
            start_width: base.get("a").unwrap(),
            accumulated_delta: 10_000,
        };
        let widths = compute(800, &refs(&cols), &ColumnPreferences::new(), Some(&resize));
        assert_eq!(widths.get("b"), Some(100));
        assert_eq!(widths.get("a"), Some(640));
    }

    #[test]
    fn push_pull_stops_at_own_minimum() {
        let cols = abc();
        let base = compute(800, &refs(&cols), &ColumnPreferences::new(), None);
        let resize = ActiveResize {
            column: ColumnId::from("a"),
            start_width: base.get("a").unwrap(),
            accumulated_delta: -10_000,
        };
        let widths = compute(800, &refs(&cols), &ColumnPreferences::new(), Some(&resize));
        assert_eq!(widths.get("a"), Some(80));
        assert_eq!(widths.get("b"), Some(660));
    }

    #[test]
    fn neighbour_at_minimum_absorbs_nothing() {
        // B is pinned at its 100px minimum; dragging A wider has no effect.
        let cols = abc();
        let mut prefs = ColumnPreferences::new();
        prefs.insert(ColumnId::from("a"), ColumnPreference::fixed(640));
        let base = compute(800, &refs(&cols), &prefs, None);
        assert_eq!(base.get("b"), Some(100));
        let resize = ActiveResize {
            column: ColumnId::from("a"),
            start_width: 640,
            accumulated_delta: 50,
        };
        let widths = compute(800, &refs(&cols), &prefs, Some(&resize));
        assert_eq!(widths, base);
    }

    #[test]
    fn resize_on_last_column_is_ignored() {
        let cols = abc();
        let base = compute(800, &refs(&cols), &ColumnPreferences::new(), None);
        let resize = ActiveResize {
            column: ColumnId::from("c"),
            start_width: 60,
            accumulated_delta: 40,
        };
        assert_eq!(compute(800, &refs(&cols), &ColumnPreferences::new(), Some(&resize)), base);
    }

    #[test]
    fn apportion_breaks_ties_to_the_left() {
        assert_eq!(apportion(10, &[1, 1, 1]), vec![4, 3, 3]);
        assert_eq!(apportion(0, &[1, 2]), vec![0, 0]);
        assert_eq!(apportion(7, &[0, 0]), vec![0, 0]);
    }

    #[test]
    fn deterministic() {
        let cols = abc();
        let a = compute(777, &refs(&cols), &ColumnPreferences::new(), None);
        let b = compute(777, &refs(&cols), &ColumnPreferences::new(), None);
        assert_eq!(a, b);
    }
}
