//! Property/fuzz-style invariants for table layout operation streams.
//!
//! Random sequences of container resizes, drags, reorders, visibility and
//! reset actions are applied to a [`TableLayout`]. After every step the
//! mandatory prefix, minimum widths, width conservation and the resize flag
//! are checked, and every rejected step must leave the state untouched.

use std::sync::Arc;

use colgrid_layout::sizing::min_total;
use colgrid_layout::{
    Column, ColumnRegistry, DragEnd, LayoutState, MemoryPreferenceStore, TableConfig, TableLayout,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state >> 11
    }

    fn range(&mut self, min: u64, max: u64) -> u64 {
        min + self.next_u64() % (max - min + 1)
    }

    fn choose_index(&mut self, len: usize) -> usize {
        (self.next_u64() % len as u64) as usize
    }

    fn choose_bool(&mut self) -> bool {
        (self.next_u64() & 1) == 0
    }
}

fn registry() -> ColumnRegistry {
    ColumnRegistry::new([
        Column::new("select", 32, 32).mandatory(true).resizable(false),
        Column::new("name", 80, 160).mandatory(true),
        Column::new("status", 60, 90),
        Column::fixed("size", 50, 80),
        Column::new("owner", 70, 120),
        Column::new("created", 90, 110).default_visible(false),
        Column::fixed("actions", 40, 40).resizable(false),
    ])
    .unwrap()
}

const IDS: [&str; 8] = [
    "select", "name", "status", "size", "owner", "created", "actions", "missing",
];

fn assert_invariants(table: &TableLayout) {
    let state = table.state();
    let registry = table.registry();

    // Full order is a permutation of the registry.
    let mut order: Vec<&str> = state.order().iter().map(|id| id.as_str()).collect();
    order.sort_unstable();
    let mut expected: Vec<&str> = registry.ids().map(|id| id.as_str()).collect();
    expected.sort_unstable();
    assert_eq!(order, expected);

    // Visible order is a subsequence of the full order.
    let mut cursor = state.order().iter();
    for id in state.visible_order() {
        assert!(cursor.any(|o| o == id), "visible order diverged from full order");
    }

    // Mandatory columns are visible and form the leading prefix.
    let prefix = state
        .visible_order()
        .iter()
        .take_while(|id| registry.is_mandatory(id.as_str()))
        .count();
    assert_eq!(prefix, registry.mandatory_ids().count());
    for id in registry.mandatory_ids() {
        assert!(state.is_visible(id.as_str()));
    }

    assert_eq!(
        state.is_resizing(),
        table.resize_controller().session().is_some()
    );

    if let Some(container) = state.container_width() {
        let columns: Vec<&Column> = state
            .visible_order()
            .iter()
            .filter_map(|id| registry.get(id.as_str()))
            .collect();
        let widths = state.computed_widths();
        assert_eq!(widths.len(), columns.len());
        for column in &columns {
            let width = widths.get(column.id().as_str()).unwrap_or_default();
            assert!(width >= column.min_width(), "{} below minimum", column.id());
        }
        assert_eq!(
            widths.total(),
            u64::from(container).max(min_total(&columns))
        );
    }
}

fn step(table: &mut TableLayout, rng: &mut Lcg, pointer: &mut i32) -> bool {
    let before: LayoutState = table.state().clone();
    let visible_len = table.state().visible_order().len();
    let pick = |rng: &mut Lcg| IDS[rng.choose_index(IDS.len())];

    let result = match rng.range(0, 11) {
        0 => {
            table.set_container_width(rng.range(0, 1600) as u32);
            Ok(())
        }
        1 => {
            *pointer = rng.range(0, 1200) as i32;
            table.start_resize(pick(rng), *pointer)
        }
        2 | 3 => {
            *pointer += rng.range(0, 200) as i32 - 100;
            table.update_resize(*pointer)
        }
        4 => table.commit_resize(),
        5 => table.cancel_resize(),
        6 => table
            .reorder(pick(rng), rng.choose_index(visible_len + 1))
            .map(|_| ()),
        7 => table.apply_drag_end(&DragEnd::new(pick(rng), pick(rng))),
        8 => table.set_column_visible(pick(rng), rng.choose_bool()),
        9 => table.toggle_sort(pick(rng)).map(|_| ()),
        10 => table.reset_column(pick(rng)),
        _ => table.reset_all_sizes(),
    };

    if result.is_err() {
        assert_eq!(table.state(), &before, "rejected step mutated state");
    }
    assert_invariants(table);
    result.is_ok()
}

fn run_sequence(seed: u64, steps: usize) -> TableLayout {
    let store = Arc::new(MemoryPreferenceStore::new());
    let mut table = TableLayout::mount(TableConfig::new("fuzz"), registry(), store);
    let mut rng = Lcg::new(seed);
    let mut pointer = 0;
    assert_invariants(&table);
    for _ in 0..steps {
        step(&mut table, &mut rng, &mut pointer);
    }
    table
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_operation_streams_preserve_invariants(
        seed in any::<u64>(),
        steps in 20usize..150,
    ) {
        let table = run_sequence(seed, steps);
        assert_invariants(&table);
    }

    #[test]
    fn random_streams_replay_deterministically(
        seed in any::<u64>(),
        steps in 10usize..80,
    ) {
        let first = run_sequence(seed, steps);
        let second = run_sequence(seed, steps);
        prop_assert_eq!(first.state(), second.state());
        prop_assert_eq!(first.preferences(), second.preferences());
    }

    #[test]
    fn mandatory_columns_never_leave_the_prefix(
        moves in prop::collection::vec((0usize..8, 0usize..8), 1..60),
    ) {
        let store = Arc::new(MemoryPreferenceStore::new());
        let mut table = TableLayout::mount(TableConfig::new("pin"), registry(), store);
        for (moved, target) in moves {
            let _ = table.reorder(IDS[moved], target);
            let visible = table.state().visible_order();
            prop_assert!(visible[..2].iter().all(|id| id == "select" || id == "name"));
        }
    }
}

#[test]
fn seed_corpus_preserves_invariants() {
    let seeds = [0_u64, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, u64::MAX - 1, u64::MAX];
    for seed in seeds {
        let table = run_sequence(seed, 200);
        assert_invariants(&table);
    }
}
