#![forbid(unsafe_code)]

//! Fragment index reconciliation.
//!
//! Every surface on a slide numbers its own steps. The host, however, has a
//! single step counter per slide: authored markers `0..M` plus whatever
//! synthetic markers have been appended for steps that only exist inside a
//! visualization. [`reconcile`] merges the per-surface numberings into that
//! shared counter and reports which synthetic markers the host must create.
//!
//! # Invariants
//!
//! 1. Local index `v < M` always maps to authored marker `v`.
//! 2. Overflow indices (`v >= M`) keep the marker they were first given;
//!    newly seen overflow indices get fresh markers after the highest one
//!    allocated so far, in ascending `v`.
//! 3. Host markers stay dense: authored plus synthetic is `0..M+K`.
//! 4. Running twice with the same input allocates nothing the second time.
//!
//! # Failure Modes
//!
//! - [`StepIndex::Invalid`] descriptors are skipped and reported in
//!   [`Reconciliation::skipped`]; the rest of the surface is still reconciled.
//! - Two steps of one surface on the same local index: the later one wins.
//!
//! # Backward inheritance
//!
//! A step without its own backward action replays the forward action of the
//! closest earlier step that is bound to a marker. Arrival steps and skipped
//! steps are not bound, so they are passed over. The first bound step of a
//! surface replays its own forward action.

use std::collections::{BTreeMap, BTreeSet};

use crate::step::{Action, Backward, StepDescriptor, StepIndex};

/// The forward/backward pair bound to one host marker.
#[derive(Debug, Clone)]
pub struct StepActions {
    pub forward: Action,
    pub backward: Action,
}

/// Per-surface mapping from host marker to the actions bound to it.
///
/// Tables are immutable once built; re-reconciliation produces a new table
/// with a higher [`version`](Self::version).
#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    entries: BTreeMap<u32, StepActions>,
    version: u64,
}

impl ActionTable {
    /// Actions bound to `marker`, or `None` if this surface does not take
    /// part in that step.
    #[must_use]
    pub fn get(&self, marker: u32) -> Option<&StepActions> {
        self.entries.get(&marker)
    }

    /// Host markers covered by this table, ascending.
    pub fn markers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Monotonic table version assigned by the registry.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

/// Marker bookkeeping for one slide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerPlan {
    authored: u32,
    /// Overflow local index -> synthetic host marker.
    overflow: BTreeMap<u32, u32>,
}

impl MarkerPlan {
    /// A plan for a slide with `authored` authored markers and no synthetic
    /// ones yet.
    #[must_use]
    pub fn new(authored: u32) -> Self {
        Self {
            authored,
            overflow: BTreeMap::new(),
        }
    }

    /// Number of authored markers.
    #[must_use]
    pub fn authored(&self) -> u32 {
        self.authored
    }

    /// Total number of markers on the slide (authored plus synthetic).
    #[must_use]
    pub fn marker_count(&self) -> u32 {
        self.authored + self.overflow.len() as u32
    }

    /// Highest marker on the slide, if any.
    #[must_use]
    pub fn highest_marker(&self) -> Option<u32> {
        self.marker_count().checked_sub(1)
    }

    /// Synthetic markers allocated so far, ascending.
    #[must_use]
    pub fn synthetic(&self) -> Vec<u32> {
        let mut markers: Vec<u32> = self.overflow.values().copied().collect();
        markers.sort_unstable();
        markers
    }

    /// Host marker for a visualization-local index, if one is assigned.
    #[must_use]
    pub fn host_marker(&self, local: u32) -> Option<u32> {
        if local < self.authored {
            Some(local)
        } else {
            self.overflow.get(&local).copied()
        }
    }

    /// Whether `marker` is one of this slide's markers.
    #[must_use]
    pub fn contains(&self, marker: u32) -> bool {
        marker < self.marker_count()
    }

    fn allocate(&mut self, indices: &BTreeSet<u32>) -> Vec<u32> {
        let mut created = Vec::new();
        let mut next = self.marker_count();
        for &local in indices.range(self.authored..) {
            if self.overflow.contains_key(&local) {
                continue;
            }
            self.overflow.insert(local, next);
            created.push(next);
            next += 1;
        }
        created
    }
}

/// A descriptor dropped during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedStep {
    /// Position of the surface in the input.
    pub surface: usize,
    /// Position of the descriptor in that surface's list.
    pub position: usize,
    /// The unrecognised index tag.
    pub raw: String,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// One table per input surface, in input order.
    pub tables: Vec<ActionTable>,
    /// Arrival transitions per input surface, in declared order.
    pub arrivals: Vec<Vec<Action>>,
    /// Synthetic markers allocated by this pass, ascending.
    pub new_markers: Vec<u32>,
    pub skipped: Vec<SkippedStep>,
}

/// Visualization-local index of every descriptor.
///
/// Explicit indices are kept; `Auto` descriptors are numbered consecutively
/// from one past the highest explicit index (or 0), in declared order.
/// Descriptors that carry no step (arrival transitions, invalid tags) yield
/// `None`.
#[must_use]
pub fn local_indices(descriptors: &[StepDescriptor]) -> Vec<Option<u32>> {
    let highest_explicit = descriptors
        .iter()
        .filter_map(|d| match d.index {
            StepIndex::At(n) => Some(n),
            _ => None,
        })
        .max();
    let mut next = highest_explicit.map_or(0, |n| n.saturating_add(1));

    descriptors
        .iter()
        .map(|d| match d.index {
            StepIndex::At(n) => Some(n),
            StepIndex::Auto => {
                let n = next;
                next = next.saturating_add(1);
                Some(n)
            }
            StepIndex::OnSlideArrival | StepIndex::Invalid(_) => None,
        })
        .collect()
}

/// Merge the step lists of all surfaces on a slide into the slide's shared
/// marker space.
///
/// `plan` carries the markers allocated by earlier passes and is extended in
/// place; previously assigned markers never change.
pub fn reconcile(surfaces: &[&[StepDescriptor]], plan: &mut MarkerPlan) -> Reconciliation {
    let locals: Vec<Vec<Option<u32>>> = surfaces.iter().map(|d| local_indices(d)).collect();

    let union: BTreeSet<u32> = locals.iter().flatten().flatten().copied().collect();
    let new_markers = plan.allocate(&union);

    let mut out = Reconciliation {
        new_markers,
        ..Reconciliation::default()
    };

    for (surface, (descriptors, indices)) in surfaces.iter().zip(&locals).enumerate() {
        let mut entries = BTreeMap::new();
        let mut arrivals = Vec::new();
        let mut previous_forward: Option<&Action> = None;

        for (position, (descriptor, local)) in descriptors.iter().zip(indices).enumerate() {
            match &descriptor.index {
                StepIndex::OnSlideArrival => {
                    arrivals.push(descriptor.forward.clone());
                    continue;
                }
                StepIndex::Invalid(raw) => {
                    tracing::warn!(surface, position, tag = %raw, "skipping step with unrecognised index");
                    out.skipped.push(SkippedStep {
                        surface,
                        position,
                        raw: raw.clone(),
                    });
                    continue;
                }
                _ => {}
            }
            let Some(marker) = (*local).and_then(|v| plan.host_marker(v)) else {
                continue;
            };

            let backward = match &descriptor.backward {
                Backward::Run(action) => action.clone(),
                Backward::Skip => Action::noop(),
                Backward::Inherit => previous_forward.unwrap_or(&descriptor.forward).clone(),
            };
            entries.insert(
                marker,
                StepActions {
                    forward: descriptor.forward.clone(),
                    backward,
                },
            );
            previous_forward = Some(&descriptor.forward);
        }

        out.tables.push(ActionTable {
            entries,
            version: 0,
        });
        out.arrivals.push(arrivals);
    }

    tracing::trace!(
        surfaces = surfaces.len(),
        created = out.new_markers.len(),
        markers = plan.marker_count(),
        "reconciled slide steps"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn auto(n: usize) -> Vec<StepDescriptor> {
        (0..n).map(|_| StepDescriptor::new(Action::noop())).collect()
    }

    fn pinned(indices: &[u32]) -> Vec<StepDescriptor> {
        indices
            .iter()
            .map(|&i| StepDescriptor::new(Action::noop()).at(i))
            .collect()
    }

    #[test]
    fn auto_indices_start_at_zero() {
        assert_eq!(local_indices(&auto(3)), vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn auto_indices_follow_highest_explicit() {
        let mut steps = auto(1);
        steps.push(StepDescriptor::new(Action::noop()).at(4));
        steps.extend(auto(2));
        assert_eq!(local_indices(&steps), vec![Some(5), Some(4), Some(6), Some(7)]);
    }

    #[test]
    fn reconciliation_example_from_two_surfaces() {
        let a = pinned(&[0, 2]);
        let b = auto(2);
        let mut plan = MarkerPlan::new(2);
        let out = reconcile(&[&a, &b], &mut plan);

        assert_eq!(out.new_markers, vec![2]);
        assert_eq!(plan.marker_count(), 3);
        assert_eq!(out.tables[0].markers().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(out.tables[1].markers().collect::<Vec<_>>(), vec![0, 1]);
        assert!(out.tables[0].get(0).unwrap().forward.ptr_eq(&a[0].forward));
        assert!(out.tables[0].get(2).unwrap().forward.ptr_eq(&a[1].forward));
    }

    #[test]
    fn overflow_indices_are_compacted() {
        let a = pinned(&[0, 7, 9]);
        let mut plan = MarkerPlan::new(1);
        let out = reconcile(&[&a], &mut plan);
        assert_eq!(out.new_markers, vec![1, 2]);
        assert_eq!(out.tables[0].markers().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn rerun_is_idempotent() {
        let a = auto(4);
        let mut plan = MarkerPlan::new(1);
        let first = reconcile(&[&a], &mut plan);
        let snapshot = plan.clone();
        let second = reconcile(&[&a], &mut plan);
        assert_eq!(first.new_markers, vec![1, 2, 3]);
        assert!(second.new_markers.is_empty());
        assert_eq!(plan, snapshot);
    }

    #[test]
    fn later_surface_only_appends() {
        let a = pinned(&[0, 5]);
        let mut plan = MarkerPlan::new(1);
        reconcile(&[&a], &mut plan);
        assert_eq!(plan.host_marker(5), Some(1));

        // A later surface brings an overflow index lower than 5.
        let b = pinned(&[3]);
        let out = reconcile(&[&a, &b], &mut plan);
        assert_eq!(out.new_markers, vec![2]);
        assert_eq!(plan.host_marker(5), Some(1));
        assert_eq!(plan.host_marker(3), Some(2));
    }

    #[test]
    fn backward_resolution() {
        let f0 = Action::noop();
        let f1 = Action::noop();
        let f2 = Action::noop();
        let b2 = Action::noop();
        let steps = vec![
            StepDescriptor::new(f0.clone()),
            StepDescriptor::new(f1.clone()).with_backward(Backward::Skip),
            StepDescriptor::new(f2.clone()).with_backward(Backward::Run(b2.clone())),
            StepDescriptor::new(Action::noop()),
        ];
        let mut plan = MarkerPlan::new(0);
        let out = reconcile(&[&steps], &mut plan);
        let table = &out.tables[0];

        assert!(table.get(0).unwrap().backward.ptr_eq(&f0));
        let skipped = &table.get(1).unwrap().backward;
        assert!(!skipped.ptr_eq(&f0) && !skipped.ptr_eq(&f1));
        assert!(table.get(2).unwrap().backward.ptr_eq(&b2));
        assert!(table.get(3).unwrap().backward.ptr_eq(&f2));
    }

    #[test]
    fn arrival_and_invalid_steps_are_set_aside() {
        let arrive = Action::noop();
        let steps = vec![
            StepDescriptor::new(arrive.clone()).with_index(StepIndex::OnSlideArrival),
            StepDescriptor::new(Action::noop()),
            StepDescriptor::new(Action::noop()).with_index(StepIndex::Invalid("soon".into())),
            StepDescriptor::new(Action::noop()),
        ];
        let mut plan = MarkerPlan::new(0);
        let out = reconcile(&[&steps], &mut plan);

        assert_eq!(out.tables[0].markers().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(out.arrivals[0].len(), 1);
        assert!(out.arrivals[0][0].ptr_eq(&arrive));
        assert_eq!(
            out.skipped,
            vec![SkippedStep {
                surface: 0,
                position: 2,
                raw: "soon".into()
            }]
        );
    }

    #[test]
    fn inherited_backward_passes_over_unbound_steps() {
        let f0 = Action::noop();
        let f1 = Action::noop();
        let arrive = Action::noop();
        let steps = vec![
            StepDescriptor::new(arrive.clone()).with_index(StepIndex::OnSlideArrival),
            StepDescriptor::new(f0.clone()),
            StepDescriptor::new(Action::noop()).with_index(StepIndex::OnSlideArrival),
            StepDescriptor::new(Action::noop()).with_index(StepIndex::Invalid("soon".into())),
            StepDescriptor::new(f1.clone()),
        ];
        let mut plan = MarkerPlan::new(0);
        let out = reconcile(&[&steps], &mut plan);
        let table = &out.tables[0];

        assert!(table.get(0).unwrap().backward.ptr_eq(&f0));
        assert!(!table.get(0).unwrap().backward.ptr_eq(&arrive));
        assert!(table.get(1).unwrap().forward.ptr_eq(&f1));
        assert!(table.get(1).unwrap().backward.ptr_eq(&f0));
    }

    #[test]
    fn duplicate_local_index_keeps_last() {
        let first = Action::noop();
        let last = Action::noop();
        let steps = vec![
            StepDescriptor::new(first).at(0),
            StepDescriptor::new(last.clone()).at(0),
        ];
        let mut plan = MarkerPlan::new(1);
        let out = reconcile(&[&steps], &mut plan);
        assert_eq!(out.tables[0].len(), 1);
        assert!(out.tables[0].get(0).unwrap().forward.ptr_eq(&last));
    }

    #[test]
    fn empty_input_allocates_nothing() {
        let mut plan = MarkerPlan::new(3);
        let out = reconcile(&[], &mut plan);
        assert!(out.tables.is_empty());
        assert!(out.new_markers.is_empty());
        assert_eq!(plan.highest_marker(), Some(2));
    }
}
