//! Property-based invariant tests for step reconciliation.
//!
//! 1. Markers stay dense: synthetic markers fill `M..M+K` exactly.
//! 2. Every marker a table uses exists on the slide.
//! 3. Every step of every surface lands in that surface's table.
//! 4. Reconciling the same input again allocates nothing and changes nothing.
//! 5. Adding surfaces only appends markers; earlier assignments never move.

use std::collections::BTreeSet;

use proptest::prelude::*;
use revealstep_core::reconcile::{MarkerPlan, local_indices, reconcile};
use revealstep_core::step::{Action, StepDescriptor, StepIndex};

// ── Helpers ─────────────────────────────────────────────────────────────

fn descriptor_strategy() -> impl Strategy<Value = StepDescriptor> {
    prop_oneof![
        Just(StepIndex::Auto),
        (0u32..12).prop_map(StepIndex::At),
    ]
    .prop_map(|index| StepDescriptor::new(Action::noop()).with_index(index))
}

fn slide_strategy() -> impl Strategy<Value = (u32, Vec<Vec<StepDescriptor>>)> {
    (
        0u32..5,
        prop::collection::vec(prop::collection::vec(descriptor_strategy(), 0..6), 0..4),
    )
}

fn as_lists(surfaces: &[Vec<StepDescriptor>]) -> Vec<&[StepDescriptor]> {
    surfaces.iter().map(Vec::as_slice).collect()
}

fn table_markers(tables: &[revealstep_core::ActionTable]) -> Vec<Vec<u32>> {
    tables.iter().map(|t| t.markers().collect()).collect()
}

// ═════════════════════════════════════════════════════════════════════════
// 1-3. Density, containment and coverage
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn markers_are_dense_and_cover_every_step((authored, surfaces) in slide_strategy()) {
        let mut plan = MarkerPlan::new(authored);
        let out = reconcile(&as_lists(&surfaces), &mut plan);

        let synthetic = plan.synthetic();
        let expected: Vec<u32> = (authored..plan.marker_count()).collect();
        prop_assert_eq!(&synthetic, &expected);
        prop_assert_eq!(&out.new_markers, &expected);

        for (descriptors, table) in surfaces.iter().zip(&out.tables) {
            let used: BTreeSet<u32> = table.markers().collect();
            prop_assert!(used.iter().all(|m| *m < plan.marker_count()));

            let wanted: BTreeSet<u32> = local_indices(descriptors)
                .into_iter()
                .flatten()
                .filter_map(|v| plan.host_marker(v))
                .collect();
            prop_assert_eq!(used, wanted);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Idempotence
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn reconcile_is_idempotent((authored, surfaces) in slide_strategy()) {
        let mut plan = MarkerPlan::new(authored);
        let first = reconcile(&as_lists(&surfaces), &mut plan);
        let snapshot = plan.clone();
        let second = reconcile(&as_lists(&surfaces), &mut plan);

        prop_assert!(second.new_markers.is_empty());
        prop_assert_eq!(&plan, &snapshot);
        prop_assert_eq!(table_markers(&first.tables), table_markers(&second.tables));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Append-only growth
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn adding_surfaces_only_appends(
        (authored, surfaces) in slide_strategy(),
        split in 0usize..4,
    ) {
        let split = split.min(surfaces.len());
        let mut plan = MarkerPlan::new(authored);
        reconcile(&as_lists(&surfaces[..split]), &mut plan);
        let before = plan.clone();
        let count_before = plan.marker_count();

        let out = reconcile(&as_lists(&surfaces), &mut plan);

        for local in 0..24 {
            if let Some(marker) = before.host_marker(local) {
                prop_assert_eq!(plan.host_marker(local), Some(marker));
            }
        }
        prop_assert!(out.new_markers.iter().all(|m| *m >= count_before));
        prop_assert_eq!(
            plan.marker_count(),
            count_before + out.new_markers.len() as u32
        );
    }
}
