#![forbid(unsafe_code)]

//! Playback controller.
//!
//! Routes host step events to the action tables of the surfaces on a slide,
//! replays the terminal state when a slide is re-entered backwards, and fires
//! arrival transitions when a slide is entered forwards.
//!
//! # Invariants
//!
//! 1. Only loaded surfaces receive actions; a missing table entry is a no-op.
//! 2. A replay fires once, after every surface that was pending when it was
//!    requested has loaded (or been torn down).
//! 3. Each surface's arrival transitions fire at most once per arrival.
//! 4. Navigating again cancels any pending replay or arrival.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::lifecycle::Lifecycle;
use crate::registry::Registry;
use crate::slide::{Direction, SlideIndex, SurfaceId};

/// One fragment carried by a host step event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRef {
    /// The fragment's step marker.
    pub marker: u32,
    /// Whether the fragment is a visualization-step marker created by this
    /// engine.
    pub synthetic: bool,
}

impl FragmentRef {
    #[must_use]
    pub const fn authored(marker: u32) -> Self {
        Self {
            marker,
            synthetic: false,
        }
    }

    #[must_use]
    pub const fn synthetic(marker: u32) -> Self {
        Self {
            marker,
            synthetic: true,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingReplay {
    slide: SlideIndex,
    awaiting: BTreeSet<SurfaceId>,
}

#[derive(Debug, Clone)]
struct ArrivalWindow {
    slide: SlideIndex,
    due: Duration,
    open: bool,
    fired: BTreeSet<SurfaceId>,
}

/// Replay and arrival bookkeeping.
#[derive(Debug, Default)]
pub struct Playback {
    replay: Option<PendingReplay>,
    arrival: Option<ArrivalWindow>,
}

impl Playback {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the `direction` action bound to the event's marker on every loaded
    /// surface of `slide`. Returns the number of actions run.
    ///
    /// Events without a synthetic fragment are not visualization-driven and
    /// are ignored.
    pub fn step(
        &self,
        registry: &Registry,
        lifecycle: &Lifecycle,
        slide: SlideIndex,
        fragments: &[FragmentRef],
        direction: Direction,
    ) -> usize {
        if !fragments.iter().any(|f| f.synthetic) {
            return 0;
        }
        let Some(first) = fragments.first() else {
            return 0;
        };
        let ran = run_marker(registry, lifecycle, slide, first.marker, direction);
        tracing::debug!(%slide, marker = first.marker, ?direction, ran, "step event");
        ran
    }

    /// Cancel pending replay and arrival work.
    pub fn cancel(&mut self) {
        self.replay = None;
        self.arrival = None;
    }

    /// Request a terminal-state replay for `slide`.
    ///
    /// Fires immediately when no surface of the slide is still pending.
    /// Returns the number of actions run now.
    pub fn request_replay(
        &mut self,
        registry: &Registry,
        lifecycle: &Lifecycle,
        slide: SlideIndex,
    ) -> usize {
        let awaiting: BTreeSet<SurfaceId> = registry
            .all_surfaces(slide)
            .into_iter()
            .filter(|id| lifecycle.is_pending(*id))
            .collect();
        if awaiting.is_empty() {
            return replay(registry, lifecycle, slide);
        }
        tracing::debug!(%slide, awaiting = awaiting.len(), "replay waiting for surfaces");
        self.replay = Some(PendingReplay { slide, awaiting });
        0
    }

    /// Open the arrival window for `slide`, due at `due`.
    ///
    /// Returns the number of actions run now (when `due <= now`).
    pub fn open_arrival(
        &mut self,
        registry: &Registry,
        lifecycle: &Lifecycle,
        slide: SlideIndex,
        due: Duration,
        now: Duration,
    ) -> usize {
        self.arrival = Some(ArrivalWindow {
            slide,
            due,
            open: false,
            fired: BTreeSet::new(),
        });
        self.advance(registry, lifecycle, now)
    }

    /// Earliest time at which deferred work becomes due.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.arrival
            .as_ref()
            .filter(|window| !window.open)
            .map(|window| window.due)
    }

    /// Fire deferred work that is due at `now`. Returns the number of actions
    /// run.
    pub fn advance(&mut self, registry: &Registry, lifecycle: &Lifecycle, now: Duration) -> usize {
        let Some(window) = self.arrival.as_mut() else {
            return 0;
        };
        if !window.open && now < window.due {
            return 0;
        }
        window.open = true;
        let slide = window.slide;
        registry
            .all_surfaces(slide)
            .into_iter()
            .filter(|id| lifecycle.is_loaded(*id))
            .map(|id| fire_arrival(registry, window, id))
            .sum()
    }

    /// A surface finished loading. Returns the number of actions run.
    pub fn surface_loaded(
        &mut self,
        registry: &Registry,
        lifecycle: &Lifecycle,
        surface: SurfaceId,
    ) -> usize {
        let mut ran = 0;
        if let Some(window) = self.arrival.as_mut().filter(|w| w.open)
            && registry.surface(surface).is_some_and(|s| s.slide == window.slide)
        {
            ran += fire_arrival(registry, window, surface);
        }
        ran + self.settle(registry, lifecycle, surface)
    }

    /// A surface was torn down. A pending replay no longer waits for it.
    pub fn surface_removed(
        &mut self,
        registry: &Registry,
        lifecycle: &Lifecycle,
        surface: SurfaceId,
    ) -> usize {
        self.settle(registry, lifecycle, surface)
    }

    /// Whether a replay is waiting on surfaces.
    #[must_use]
    pub fn replay_pending(&self) -> bool {
        self.replay.is_some()
    }

    fn settle(&mut self, registry: &Registry, lifecycle: &Lifecycle, surface: SurfaceId) -> usize {
        let Some(pending) = self.replay.as_mut() else {
            return 0;
        };
        pending.awaiting.remove(&surface);
        if !pending.awaiting.is_empty() {
            return 0;
        }
        let slide = pending.slide;
        self.replay = None;
        replay(registry, lifecycle, slide)
    }
}

fn run_marker(
    registry: &Registry,
    lifecycle: &Lifecycle,
    slide: SlideIndex,
    marker: u32,
    direction: Direction,
) -> usize {
    let mut ran = 0;
    for id in registry.all_surfaces(slide) {
        if !lifecycle.is_loaded(id) {
            continue;
        }
        let Some(table) = registry.action_table_for(id) else {
            continue;
        };
        if let Some(actions) = table.get(marker) {
            match direction {
                Direction::Forward => actions.forward.run(),
                Direction::Backward => actions.backward.run(),
            }
            ran += 1;
        }
    }
    ran
}

fn replay(registry: &Registry, lifecycle: &Lifecycle, slide: SlideIndex) -> usize {
    let Some(marker) = registry.highest_tagged(slide) else {
        return 0;
    };
    let ran = run_marker(registry, lifecycle, slide, marker, Direction::Forward);
    tracing::debug!(%slide, marker, ran, "replayed terminal state");
    ran
}

fn fire_arrival(registry: &Registry, window: &mut ArrivalWindow, surface: SurfaceId) -> usize {
    if !window.fired.insert(surface) {
        return 0;
    }
    let arrivals = registry.arrivals_for(surface);
    for action in arrivals {
        action.run();
    }
    arrivals.len()
}
