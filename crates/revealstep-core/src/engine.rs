#![forbid(unsafe_code)]

//! Host-driven engine.
//!
//! [`Engine`] owns the registry, lifecycle and playback state and talks to the
//! outside world only through a [`PresentationHost`] and a [`SurfaceAdapter`].
//! Everything is single-threaded: the host calls in with navigation events,
//! load/probe completions and clock updates, and the engine applies their
//! consequences synchronously.
//!
//! # Example
//!
//! ```ignore
//! let mut engine = Engine::new(config, host, surfaces);
//! engine.register_slide(layout);
//! engine.handle_event(HostEvent::Ready { current: SlideIndex::new(0, 0) });
//! // later, from the adapter's load callback:
//! engine.surface_loaded(ticket, descriptors);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use crate::clock::DeterministicClock;
use crate::config::EngineConfig;
use crate::host::{HostEvent, PresentationHost, SlideLayout};
use crate::lifecycle::{Lifecycle, LifecyclePlan, Navigation};
use crate::path::{PathPlan, plan_path};
use crate::playback::{FragmentRef, Playback};
use crate::registry::Registry;
use crate::slide::{Direction, SlideIndex, SurfaceId};
use crate::step::StepDescriptor;
use crate::surface::{
    EmbedRequest, SURFACE_CLASS, SURFACE_SANDBOX, SurfaceAdapter, SurfaceTicket,
};

/// What one engine call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Surfaces whose materialization started.
    pub materialized: usize,
    /// Surfaces torn down.
    pub torn_down: usize,
    /// Forward, backward or arrival actions run.
    pub actions_run: usize,
}

impl Outcome {
    fn merge(&mut self, other: Self) {
        self.materialized += other.materialized;
        self.torn_down += other.torn_down;
        self.actions_run += other.actions_run;
    }
}

/// Step synchronization, playback and lifecycle engine.
pub struct Engine<H: PresentationHost, S: SurfaceAdapter> {
    config: EngineConfig,
    host: H,
    surfaces: S,
    registry: Registry,
    lifecycle: Lifecycle,
    playback: Playback,
    clock: DeterministicClock,
    current: Option<SlideIndex>,
    overview: bool,
    pending_probes: HashMap<SurfaceId, PathPlan>,
}

impl<H: PresentationHost, S: SurfaceAdapter> Engine<H, S> {
    pub fn new(config: EngineConfig, host: H, surfaces: S) -> Self {
        Self {
            config,
            host,
            surfaces,
            registry: Registry::new(),
            lifecycle: Lifecycle::new(),
            playback: Playback::new(),
            clock: DeterministicClock::new(),
            current: None,
            overview: false,
            pending_probes: HashMap::new(),
        }
    }

    /// Declare a slide and its visualization containers.
    pub fn register_slide(&mut self, layout: SlideLayout) {
        let slide = layout.index;
        self.registry.add_slide(slide, layout.authored_count());
        for spec in layout.foreground {
            self.registry.register_surface(slide, spec, false);
        }
        if let Some(spec) = layout.background {
            self.registry.register_surface(slide, spec, true);
        }
    }

    /// Apply one host event.
    pub fn handle_event(&mut self, event: HostEvent) -> Outcome {
        match event {
            HostEvent::Ready { current } => {
                self.current = Some(current);
                self.navigate(Navigation::Ready, current)
            }
            HostEvent::SlideChanged { previous, current } => {
                self.playback.cancel();
                let previous = previous.or(self.current);
                self.current = Some(current);
                let mut outcome = self.navigate(Navigation::SlideChanged { previous }, current);
                outcome.actions_run += self.enter_slide(previous, current);
                outcome
            }
            HostEvent::OverviewShown { current } => {
                self.overview = true;
                self.current = Some(current);
                self.navigate(Navigation::OverviewShown, current)
            }
            HostEvent::OverviewHidden { current } => {
                self.overview = false;
                self.current = Some(current);
                self.navigate(Navigation::OverviewHidden, current)
            }
            HostEvent::FragmentShown { slide, fragments } => {
                self.step(slide, &fragments, Direction::Forward)
            }
            HostEvent::FragmentHidden { slide, fragments } => {
                self.step(slide, &fragments, Direction::Backward)
            }
        }
    }

    /// A surface finished loading and exported its step descriptors.
    ///
    /// Returns `false` when the ticket is stale.
    pub fn surface_loaded(
        &mut self,
        ticket: SurfaceTicket,
        descriptors: Vec<StepDescriptor>,
    ) -> bool {
        if !self.lifecycle.mark_loaded(ticket) {
            tracing::debug!(surface = %ticket.surface, generation = ticket.generation, "ignoring stale load");
            return false;
        }
        if let Some(update) = self.registry.record_descriptors(ticket.surface, descriptors) {
            if !update.created.is_empty() {
                tracing::debug!(slide = %update.slide, created = ?update.created, "allocated step markers");
            }
            if !update.newly_tagged.is_empty() {
                self.host
                    .insert_step_markers(update.slide, &update.newly_tagged);
                self.host.sync_layout();
            }
        }
        let ran = self
            .playback
            .surface_loaded(&self.registry, &self.lifecycle, ticket.surface);
        tracing::debug!(surface = %ticket.surface, actions = ran, "surface loaded");
        true
    }

    /// The existence check for a surface's primary path answered.
    ///
    /// Returns `false` when the ticket is stale.
    pub fn probe_resolved(&mut self, ticket: SurfaceTicket, exists: bool) -> bool {
        if !self.lifecycle.probe_done(ticket) {
            tracing::debug!(surface = %ticket.surface, generation = ticket.generation, "ignoring stale probe");
            return false;
        }
        let Some(plan) = self.pending_probes.remove(&ticket.surface) else {
            tracing::warn!(surface = %ticket.surface, "probe answered without a pending path");
            self.teardown(ticket.surface);
            return false;
        };
        self.embed(ticket, plan.resolve(exists))
    }

    /// Forward a key press captured inside a surface to the host.
    pub fn forward_key(&mut self, key_code: u32) {
        self.host.forward_key(key_code);
    }

    /// Advance the clock by `dt` and fire due work.
    pub fn advance_time(&mut self, dt: Duration) -> Outcome {
        self.clock.advance(dt);
        self.fire_due()
    }

    /// Set the clock to `now` and fire due work.
    pub fn set_time(&mut self, now: Duration) -> Outcome {
        self.clock.set(now);
        self.fire_due()
    }

    /// When the host should next call [`Engine::set_time`].
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.playback.next_deadline()
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[must_use]
    pub fn surfaces(&self) -> &S {
        &self.surfaces
    }

    pub fn surfaces_mut(&mut self) -> &mut S {
        &mut self.surfaces
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    #[must_use]
    pub fn current_slide(&self) -> Option<SlideIndex> {
        self.current
    }

    #[must_use]
    pub fn overview_active(&self) -> bool {
        self.overview
    }

    fn fire_due(&mut self) -> Outcome {
        let actions_run = self
            .playback
            .advance(&self.registry, &self.lifecycle, self.clock.now());
        Outcome {
            actions_run,
            ..Outcome::default()
        }
    }

    fn step(&mut self, slide: SlideIndex, fragments: &[FragmentRef], direction: Direction) -> Outcome {
        let actions_run =
            self.playback
                .step(&self.registry, &self.lifecycle, slide, fragments, direction);
        Outcome {
            actions_run,
            ..Outcome::default()
        }
    }

    fn navigate(&mut self, navigation: Navigation, target: SlideIndex) -> Outcome {
        let plan = self.lifecycle.plan(
            &self.registry,
            navigation,
            target,
            self.overview,
            self.host.total_horizontal_slides(),
            &self.config,
        );
        tracing::debug!(
            ?navigation,
            %target,
            teardown = plan.teardown.len(),
            materialize = plan.materialize.len(),
            "lifecycle plan"
        );
        self.apply(plan)
    }

    fn apply(&mut self, plan: LifecyclePlan) -> Outcome {
        let mut outcome = Outcome::default();
        for id in plan.teardown {
            outcome.merge(self.teardown(id));
        }
        for id in plan.materialize {
            if self.materialize(id) {
                outcome.materialized += 1;
            }
        }
        outcome
    }

    /// Replay or arrival work for a slide that was just entered.
    fn enter_slide(&mut self, previous: Option<SlideIndex>, current: SlideIndex) -> usize {
        let direction = match previous {
            Some(previous) if previous == current => return 0,
            Some(previous) => current.direction_from(previous),
            None => Direction::Forward,
        };
        match direction {
            Direction::Backward if self.config.run_last_state => {
                self.playback
                    .request_replay(&self.registry, &self.lifecycle, current)
            }
            Direction::Backward => 0,
            Direction::Forward => {
                let now = self.clock.now();
                let due = now.saturating_add(self.config.arrival_delay);
                self.playback
                    .open_arrival(&self.registry, &self.lifecycle, current, due, now)
            }
        }
    }

    fn materialize(&mut self, id: SurfaceId) -> bool {
        let Some(entry) = self.registry.surface(id) else {
            return false;
        };
        if self.lifecycle.is_live(id) {
            return false;
        }
        let container = entry.container();
        if self.surfaces.has_surface(container) {
            tracing::debug!(surface = %id, %container, "container already hosts a surface");
            return false;
        }
        match plan_path(&entry.spec.file, &self.config) {
            PathPlan::Direct(src) => {
                let ticket = self.lifecycle.begin(id, false);
                self.embed(ticket, src)
            }
            plan @ PathPlan::Probe { .. } => {
                let ticket = self.lifecycle.begin(id, true);
                if let PathPlan::Probe { primary, .. } = &plan {
                    self.surfaces.probe(ticket, primary);
                }
                self.pending_probes.insert(id, plan);
                true
            }
        }
    }

    fn embed(&mut self, ticket: SurfaceTicket, src: String) -> bool {
        let Some(entry) = self.registry.surface(ticket.surface) else {
            return false;
        };
        let request = EmbedRequest {
            ticket,
            container: entry.container(),
            slide: entry.slide,
            is_background: entry.is_background,
            src,
            style: entry.spec.style.clone(),
            overflow_shown: entry.spec.overflow_shown,
            scrolling: entry.spec.scrolling.clone(),
            class: SURFACE_CLASS,
            sandbox: SURFACE_SANDBOX,
        };
        match self.surfaces.embed(&request) {
            Ok(()) => {
                tracing::debug!(surface = %ticket.surface, src = %request.src, "embedding surface");
                true
            }
            Err(err) => {
                tracing::warn!(surface = %ticket.surface, error = %err, "failed to embed surface");
                self.teardown(ticket.surface);
                false
            }
        }
    }

    fn teardown(&mut self, id: SurfaceId) -> Outcome {
        if !self.lifecycle.teardown(id) {
            return Outcome::default();
        }
        if let Some(entry) = self.registry.surface(id) {
            self.surfaces.remove(entry.container());
        }
        self.pending_probes.remove(&id);
        let actions_run = self
            .playback
            .surface_removed(&self.registry, &self.lifecycle, id);
        tracing::debug!(surface = %id, "surface torn down");
        Outcome {
            materialized: 0,
            torn_down: 1,
            actions_run,
        }
    }
}

impl<H: PresentationHost, S: SurfaceAdapter> std::fmt::Debug for Engine<H, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("current", &self.current)
            .field("overview", &self.overview)
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}
