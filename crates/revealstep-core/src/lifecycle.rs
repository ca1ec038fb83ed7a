#![forbid(unsafe_code)]

//! Surface lifecycle policy.
//!
//! Each surface slot moves through
//!
//! ```text
//! Absent ──begin──▶ Probing ──probe──▶ Materializing ──load──▶ Loaded
//!    ▲                 │                    │                    │
//!    └──────────────── teardown ◀───────────┴────────────────────┘
//! ```
//!
//! (`Probing` is skipped when no existence check is needed.) Every `begin`
//! mints a new generation; probe answers and load callbacks for an older
//! generation are stale and ignored.
//!
//! [`Lifecycle::plan`] decides, for one navigation event, which slots to
//! materialize and which to tear down. It is pure: the engine applies the
//! plan, tearing down before materializing.

use std::collections::HashMap;

use crate::config::{EngineConfig, OVERVIEW_VIEW_DISTANCE};
use crate::registry::Registry;
use crate::slide::{SlideIndex, SurfaceId};
use crate::surface::SurfaceTicket;

/// Lifecycle state of one surface slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceState {
    #[default]
    Absent,
    /// Waiting for the resource existence check.
    Probing { generation: u64 },
    /// Embedded, waiting for load-complete.
    Materializing { generation: u64 },
    Loaded { generation: u64 },
}

impl SurfaceState {
    fn generation(self) -> Option<u64> {
        match self {
            Self::Absent => None,
            Self::Probing { generation }
            | Self::Materializing { generation }
            | Self::Loaded { generation } => Some(generation),
        }
    }
}

/// Host navigation events that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Ready,
    SlideChanged { previous: Option<SlideIndex> },
    OverviewShown,
    OverviewHidden,
}

/// Materialize/teardown decisions for one navigation event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecyclePlan {
    /// Applied first.
    pub teardown: Vec<SurfaceId>,
    pub materialize: Vec<SurfaceId>,
}

/// Horizontal distance between the navigation target and a slide.
///
/// With looping on, the distance wraps modulo `total_horizontal -
/// view_distance`; the wrap is skipped when that modulus would be zero.
#[must_use]
pub fn slide_distance(
    target_h: u32,
    slide_h: u32,
    loop_slides: bool,
    total_horizontal: u32,
    view_distance: u32,
) -> u32 {
    let delta = target_h.abs_diff(slide_h);
    match total_horizontal.checked_sub(view_distance) {
        Some(modulus) if loop_slides && modulus > 0 => delta % modulus,
        _ => delta,
    }
}

/// Whether a background surface at `distance` should be materialized.
#[must_use]
pub fn background_wanted(distance: u32, view_distance: u32, preload: bool) -> bool {
    (distance < view_distance && preload) || distance == 0
}

/// Per-slot lifecycle states.
#[derive(Debug, Default)]
pub struct Lifecycle {
    states: HashMap<SurfaceId, SurfaceState>,
    next_generation: u64,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self, surface: SurfaceId) -> SurfaceState {
        self.states.get(&surface).copied().unwrap_or_default()
    }

    /// Whether the slot currently hosts (or is about to host) a surface.
    #[must_use]
    pub fn is_live(&self, surface: SurfaceId) -> bool {
        self.state(surface) != SurfaceState::Absent
    }

    #[must_use]
    pub fn is_loaded(&self, surface: SurfaceId) -> bool {
        matches!(self.state(surface), SurfaceState::Loaded { .. })
    }

    /// Whether the slot is live but has not finished loading.
    #[must_use]
    pub fn is_pending(&self, surface: SurfaceId) -> bool {
        matches!(
            self.state(surface),
            SurfaceState::Probing { .. } | SurfaceState::Materializing { .. }
        )
    }

    /// Start a new materialization and return its ticket.
    pub fn begin(&mut self, surface: SurfaceId, probing: bool) -> SurfaceTicket {
        self.next_generation += 1;
        let generation = self.next_generation;
        let state = if probing {
            SurfaceState::Probing { generation }
        } else {
            SurfaceState::Materializing { generation }
        };
        self.states.insert(surface, state);
        SurfaceTicket {
            surface,
            generation,
        }
    }

    /// Record a probe answer. Returns `false` for a stale ticket.
    pub fn probe_done(&mut self, ticket: SurfaceTicket) -> bool {
        match self.state(ticket.surface) {
            SurfaceState::Probing { generation } if generation == ticket.generation => {
                self.states.insert(
                    ticket.surface,
                    SurfaceState::Materializing { generation },
                );
                true
            }
            _ => false,
        }
    }

    /// Record load-complete. Returns `false` for a stale ticket.
    pub fn mark_loaded(&mut self, ticket: SurfaceTicket) -> bool {
        match self.state(ticket.surface) {
            SurfaceState::Materializing { generation } | SurfaceState::Loaded { generation }
                if generation == ticket.generation =>
            {
                self.states
                    .insert(ticket.surface, SurfaceState::Loaded { generation });
                true
            }
            _ => false,
        }
    }

    /// Return the slot to `Absent`. Returns whether it was live.
    pub fn teardown(&mut self, surface: SurfaceId) -> bool {
        self.states
            .insert(surface, SurfaceState::Absent)
            .and_then(SurfaceState::generation)
            .is_some()
    }

    /// Decide what to materialize and tear down for one navigation event.
    #[must_use]
    pub fn plan(
        &self,
        registry: &Registry,
        navigation: Navigation,
        target: SlideIndex,
        overview_active: bool,
        total_horizontal: u32,
        config: &EngineConfig,
    ) -> LifecyclePlan {
        let mut plan = LifecyclePlan::default();

        // Backgrounds: distance and preload gating.
        let view_distance = if overview_active || navigation == Navigation::OverviewShown {
            OVERVIEW_VIEW_DISTANCE
        } else {
            config.view_distance
        };
        let reset_backgrounds = navigation == Navigation::OverviewHidden;
        for id in registry.backgrounds() {
            let Some(entry) = registry.surface(id) else {
                continue;
            };
            let distance = slide_distance(
                target.h,
                entry.slide.h,
                config.loop_slides,
                total_horizontal,
                view_distance,
            );
            let wanted = background_wanted(distance, view_distance, entry.spec.preload);
            let live = self.is_live(id);
            if live && (reset_backgrounds || !wanted) {
                plan.teardown.push(id);
            }
            if wanted && (reset_backgrounds || !live) {
                plan.materialize.push(id);
            }
        }

        // Foregrounds.
        match navigation {
            Navigation::Ready => {
                plan.materialize
                    .extend(registry.foregrounds().filter(|id| !self.is_live(*id)));
            }
            Navigation::SlideChanged { previous } => {
                if let Some(previous) = previous.filter(|p| *p != target)
                    && !config.keep_alive
                {
                    plan.teardown.extend(
                        foreground_of(registry, previous)
                            .into_iter()
                            .filter(|id| self.is_live(*id)),
                    );
                }
                plan.materialize.extend(
                    foreground_of(registry, target)
                        .into_iter()
                        .filter(|id| !self.is_live(*id)),
                );
            }
            Navigation::OverviewShown | Navigation::OverviewHidden => {}
        }

        plan
    }
}

fn foreground_of(registry: &Registry, slide: SlideIndex) -> Vec<SurfaceId> {
    registry
        .all_surfaces(slide)
        .into_iter()
        .filter(|id| registry.surface(*id).is_some_and(|s| !s.is_background))
        .collect()
}
