#![forbid(unsafe_code)]

//! WASM frontend for revealstep.
//!
//! Binds [`revealstep_core::Engine`] to reveal.js:
//! - discovers `.fig-container` elements and their authoring attributes,
//! - embeds each visualization in a sandboxed iframe and reads the steps it
//!   exports once loaded,
//! - forwards reveal.js navigation and fragment events to the engine,
//! - drives the engine clock from `web-time` and a browser timer.
//!
//! Markup decoding and console logging are platform independent; the DOM
//! bindings are compiled only for `wasm32`.

pub mod logging;
pub mod markup;

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::{RevealStep, init_logging};

/// Native builds compile this crate as a stub so `cargo check --workspace` stays
/// green on non-wasm targets.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Default)]
pub struct RevealStep;

#[cfg(not(target_arch = "wasm32"))]
impl RevealStep {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}
