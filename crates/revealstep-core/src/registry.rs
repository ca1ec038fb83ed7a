#![forbid(unsafe_code)]

//! Visualization registry.
//!
//! Tracks, per slide, the surfaces bound to its containers and the action
//! tables computed for them. Surface identity is stable per container, so a
//! surface that is torn down and embedded again keeps its identity, its last
//! descriptors and its last table.
//!
//! All writes to a slide's marker numbering go through
//! [`Registry::record_descriptors`], which re-runs reconciliation over every
//! surface of the slide that has reported descriptors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use crate::reconcile::{self, ActionTable, MarkerPlan, SkippedStep};
use crate::slide::{ContainerId, SlideIndex, SurfaceId};
use crate::step::{Action, StepDescriptor};
use crate::surface::ContainerSpec;

/// Registry record for one surface slot.
#[derive(Debug, Clone)]
pub struct SurfaceEntry {
    pub id: SurfaceId,
    pub slide: SlideIndex,
    pub spec: ContainerSpec,
    pub is_background: bool,
    descriptors: Option<Vec<StepDescriptor>>,
    table: Option<Rc<ActionTable>>,
    arrivals: Vec<Action>,
}

impl SurfaceEntry {
    #[must_use]
    pub fn container(&self) -> ContainerId {
        self.spec.id
    }

    /// Whether the surface has reported its descriptors at least once.
    #[must_use]
    pub fn has_descriptors(&self) -> bool {
        self.descriptors.is_some()
    }
}

#[derive(Debug, Default)]
struct SlideEntry {
    plan: MarkerPlan,
    /// Markers some action table on the slide is bound to.
    tagged: BTreeSet<u32>,
    foreground: Vec<SurfaceId>,
    background: Option<SurfaceId>,
}

/// Outcome of recording a surface's descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerUpdate {
    pub slide: SlideIndex,
    /// Synthetic markers allocated by this update, ascending.
    pub created: Vec<u32>,
    /// Markers that became visualization-driven with this update, ascending.
    /// The host tags each of them so step events on them reach the engine;
    /// `created` is a subset.
    pub newly_tagged: Vec<u32>,
    /// Steps dropped because their index tag was not understood.
    pub skipped: Vec<SkippedStep>,
}

/// Per-slide surface and marker bookkeeping.
#[derive(Debug, Default)]
pub struct Registry {
    slides: BTreeMap<SlideIndex, SlideEntry>,
    surfaces: Vec<SurfaceEntry>,
    by_container: HashMap<ContainerId, SurfaceId>,
    next_version: u64,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a slide and the number of markers authored on it.
    ///
    /// Once synthetic markers exist the authored count is frozen, so
    /// declaring the slide again never renumbers them.
    pub fn add_slide(&mut self, slide: SlideIndex, authored_markers: u32) {
        let entry = self.slides.entry(slide).or_default();
        if entry.plan.synthetic().is_empty() {
            entry.plan = MarkerPlan::new(authored_markers);
        }
    }

    /// Bind a surface slot to `container` on `slide`.
    ///
    /// Registering the same container twice returns the existing identity.
    pub fn register_surface(
        &mut self,
        slide: SlideIndex,
        spec: ContainerSpec,
        is_background: bool,
    ) -> SurfaceId {
        let container = spec.id;
        if let Some(&id) = self.by_container.get(&container) {
            return id;
        }
        let id = SurfaceId(self.surfaces.len() as u32);
        self.surfaces.push(SurfaceEntry {
            id,
            slide,
            spec,
            is_background,
            descriptors: None,
            table: None,
            arrivals: Vec::new(),
        });
        self.by_container.insert(container, id);

        let entry = self.slides.entry(slide).or_default();
        if is_background {
            if entry.background.is_some() {
                tracing::warn!(%slide, %container, "slide already has a background surface");
            }
            entry.background.get_or_insert(id);
        } else {
            entry.foreground.push(id);
        }
        tracing::debug!(%slide, %container, surface = %id, is_background, "registered surface");
        id
    }

    /// Store the descriptors a surface exported on load and reconcile its
    /// slide.
    ///
    /// Every surface of the slide that has descriptors gets a fresh table
    /// version. Returns `None` for an unknown surface.
    pub fn record_descriptors(
        &mut self,
        surface: SurfaceId,
        descriptors: Vec<StepDescriptor>,
    ) -> Option<MarkerUpdate> {
        let slide = {
            let entry = self.surfaces.get_mut(surface.0 as usize)?;
            entry.descriptors = Some(descriptors);
            entry.slide
        };
        let participants: Vec<SurfaceId> = self
            .all_surfaces(slide)
            .into_iter()
            .filter(|id| self.surfaces[id.0 as usize].has_descriptors())
            .collect();

        let slide_entry = self.slides.get_mut(&slide)?;
        let lists: Vec<&[StepDescriptor]> = participants
            .iter()
            .filter_map(|id| self.surfaces[id.0 as usize].descriptors.as_deref())
            .collect();
        let outcome = reconcile::reconcile(&lists, &mut slide_entry.plan);

        self.next_version += 1;
        let version = self.next_version;
        let mut newly_tagged = BTreeSet::new();
        for ((id, table), arrivals) in participants
            .iter()
            .zip(outcome.tables)
            .zip(outcome.arrivals)
        {
            for marker in table.markers() {
                if slide_entry.tagged.insert(marker) {
                    newly_tagged.insert(marker);
                }
            }
            let entry = &mut self.surfaces[id.0 as usize];
            entry.table = Some(Rc::new(table.with_version(version)));
            entry.arrivals = arrivals;
        }

        let skipped = outcome
            .skipped
            .into_iter()
            .map(|mut s| {
                // Name the surface rather than its position in this pass.
                s.surface = participants[s.surface].0 as usize;
                s
            })
            .collect();

        Some(MarkerUpdate {
            slide,
            created: outcome.new_markers,
            newly_tagged: newly_tagged.into_iter().collect(),
            skipped,
        })
    }

    /// The current action table of a surface, once it has loaded.
    #[must_use]
    pub fn action_table_for(&self, surface: SurfaceId) -> Option<Rc<ActionTable>> {
        self.surfaces.get(surface.0 as usize)?.table.clone()
    }

    /// Arrival transitions declared by a surface.
    #[must_use]
    pub fn arrivals_for(&self, surface: SurfaceId) -> &[Action] {
        self.surfaces
            .get(surface.0 as usize)
            .map_or(&[][..], |s| s.arrivals.as_slice())
    }

    /// All surfaces of a slide: foreground in declaration order, then the
    /// background.
    #[must_use]
    pub fn all_surfaces(&self, slide: SlideIndex) -> Vec<SurfaceId> {
        self.slides.get(&slide).map_or_else(Vec::new, |entry| {
            entry
                .foreground
                .iter()
                .copied()
                .chain(entry.background)
                .collect()
        })
    }

    #[must_use]
    pub fn surface(&self, id: SurfaceId) -> Option<&SurfaceEntry> {
        self.surfaces.get(id.0 as usize)
    }

    #[must_use]
    pub fn surface_for_container(&self, container: ContainerId) -> Option<SurfaceId> {
        self.by_container.get(&container).copied()
    }

    /// Marker state of a slide.
    #[must_use]
    pub fn markers(&self, slide: SlideIndex) -> Option<&MarkerPlan> {
        self.slides.get(&slide).map(|entry| &entry.plan)
    }

    /// Highest marker any action table on `slide` is bound to.
    #[must_use]
    pub fn highest_tagged(&self, slide: SlideIndex) -> Option<u32> {
        self.slides
            .get(&slide)
            .and_then(|entry| entry.tagged.last().copied())
    }

    /// Background surfaces of every slide, in slide order.
    pub fn backgrounds(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.slides.values().filter_map(|entry| entry.background)
    }

    /// Foreground surfaces of every slide, in slide order.
    pub fn foregrounds(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.slides
            .values()
            .flat_map(|entry| entry.foreground.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec(id: u32) -> ContainerSpec {
        ContainerSpec::new(ContainerId(id), format!("viz{id}.html"))
    }

    fn steps(indices: &[Option<u32>]) -> Vec<StepDescriptor> {
        indices
            .iter()
            .map(|i| {
                let d = StepDescriptor::new(Action::noop());
                match i {
                    Some(n) => d.at(*n),
                    None => d,
                }
            })
            .collect()
    }

    #[test]
    fn all_surfaces_lists_background_last() {
        let mut reg = Registry::new();
        let slide = SlideIndex::new(0, 0);
        reg.add_slide(slide, 0);
        let bg = reg.register_surface(slide, spec(9), true);
        let a = reg.register_surface(slide, spec(1), false);
        let b = reg.register_surface(slide, spec(2), false);
        assert_eq!(reg.all_surfaces(slide), vec![a, b, bg]);
        assert!(reg.all_surfaces(SlideIndex::new(4, 0)).is_empty());
    }

    #[test]
    fn registering_a_container_twice_is_idempotent() {
        let mut reg = Registry::new();
        let slide = SlideIndex::new(1, 0);
        let first = reg.register_surface(slide, spec(3), false);
        let second = reg.register_surface(slide, spec(3), false);
        assert_eq!(first, second);
        assert_eq!(reg.all_surfaces(slide), vec![first]);
    }

    #[test]
    fn record_descriptors_reconciles_whole_slide() {
        let mut reg = Registry::new();
        let slide = SlideIndex::new(0, 0);
        reg.add_slide(slide, 2);
        let a = reg.register_surface(slide, spec(1), false);
        let b = reg.register_surface(slide, spec(2), false);

        let update = reg.record_descriptors(a, steps(&[Some(0), Some(2)])).unwrap();
        assert_eq!(update.created, vec![2]);
        assert_eq!(update.newly_tagged, vec![0, 2]);
        assert!(reg.action_table_for(b).is_none());

        let update = reg.record_descriptors(b, steps(&[None, None])).unwrap();
        assert!(update.created.is_empty());
        assert_eq!(update.newly_tagged, vec![1]);

        let table_a = reg.action_table_for(a).unwrap();
        let table_b = reg.action_table_for(b).unwrap();
        assert_eq!(table_a.markers().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(table_b.markers().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(table_a.version(), table_b.version());
        assert!(table_a.get(1).is_none());
        assert_eq!(reg.markers(slide).unwrap().marker_count(), 3);
        assert_eq!(reg.highest_tagged(slide), Some(2));
    }

    #[test]
    fn highest_tagged_ignores_trailing_authored_markers() {
        let mut reg = Registry::new();
        let slide = SlideIndex::new(1, 0);
        reg.add_slide(slide, 3);
        assert_eq!(reg.highest_tagged(slide), None);
        let a = reg.register_surface(slide, spec(1), false);
        reg.record_descriptors(a, steps(&[None])).unwrap();
        assert_eq!(reg.markers(slide).unwrap().highest_marker(), Some(2));
        assert_eq!(reg.highest_tagged(slide), Some(0));
    }

    #[test]
    fn reload_produces_new_table_version() {
        let mut reg = Registry::new();
        let slide = SlideIndex::new(0, 0);
        reg.add_slide(slide, 0);
        let a = reg.register_surface(slide, spec(1), false);
        reg.record_descriptors(a, steps(&[None])).unwrap();
        let v1 = reg.action_table_for(a).unwrap().version();
        reg.record_descriptors(a, steps(&[None])).unwrap();
        let v2 = reg.action_table_for(a).unwrap().version();
        assert!(v2 > v1);
    }

    #[test]
    fn unknown_surface_is_ignored() {
        let mut reg = Registry::new();
        assert!(reg.record_descriptors(SurfaceId(5), Vec::new()).is_none());
        assert!(reg.action_table_for(SurfaceId(5)).is_none());
        assert!(reg.arrivals_for(SurfaceId(5)).is_empty());
    }
}
