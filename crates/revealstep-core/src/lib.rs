#![forbid(unsafe_code)]

//! `revealstep-core` keeps embedded slide visualizations in step with a
//! presentation host.
//!
//! Design goals:
//! - **Host-driven**: the embedding environment pushes navigation events,
//!   load completions and clock updates; the engine never blocks or spawns.
//! - **Deterministic time**: deferred work fires from an explicitly advanced
//!   monotonic clock.
//! - **Append-only markers**: step markers created for visualizations are
//!   never renumbered, so host state stays valid across reloads.
//!
//! Start with [`Engine`]; the DOM binding lives in `revealstep-web`.

pub mod clock;
pub mod config;
pub mod engine;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod path;
pub mod playback;
pub mod reconcile;
pub mod registry;
pub mod slide;
pub mod step;
pub mod style;
pub mod surface;

pub use clock::DeterministicClock;
pub use config::{ConfigError, EngineConfig, HostConfig, MapPath, PluginConfig};
pub use engine::{Engine, Outcome};
pub use host::{HostEvent, PresentationHost, SlideLayout};
pub use playback::FragmentRef;
pub use reconcile::{ActionTable, MarkerPlan, StepActions, reconcile};
pub use registry::{MarkerUpdate, Registry};
pub use slide::{ContainerId, Direction, SlideIndex, SurfaceId};
pub use step::{Action, Backward, StepDescriptor, StepIndex};
pub use style::SurfaceStyle;
pub use surface::{ContainerSpec, EmbedRequest, SurfaceAdapter, SurfaceError, SurfaceTicket};
