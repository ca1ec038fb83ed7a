#![forbid(unsafe_code)]

//! Step descriptors exported by an embedded visualization.
//!
//! A visualization hands the engine an ordered list of [`StepDescriptor`]s once
//! its document has loaded. Each descriptor names the shared slide step it
//! wants to be bound to (or none), the action that plays the step forward, and
//! how the step is undone when the host hides it again.

use std::fmt;
use std::rc::Rc;

/// Reserved index tag for transitions that fire once on forward slide arrival.
pub const ON_SLIDE_ARRIVAL_TAG: &str = "onSlideChange";

/// A callable supplied by a visualization.
///
/// Actions are reference-counted closures so tables can share them between
/// the forward slot of one step and the inherited backward slot of the next.
#[derive(Clone)]
pub struct Action(Rc<dyn Fn()>);

impl Action {
    /// Wrap a closure.
    pub fn new(f: impl Fn() + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// An action that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Invoke the action.
    pub fn run(&self) {
        (self.0)();
    }

    /// Whether both handles point at the same closure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Action")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Where a step wants to land in the slide's shared step counter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StepIndex {
    /// No explicit index; numbered after the surface's highest explicit one.
    #[default]
    Auto,
    /// Pinned to a specific shared step.
    At(u32),
    /// Fire once when the slide is entered going forward; bound to no step.
    OnSlideArrival,
    /// A value that is neither a step number nor the arrival tag.
    Invalid(String),
}

impl StepIndex {
    /// Interpret a raw tag coming from the visualization document.
    ///
    /// Only [`ON_SLIDE_ARRIVAL_TAG`] is recognised; numeric strings are not
    /// coerced.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        if tag == ON_SLIDE_ARRIVAL_TAG {
            Self::OnSlideArrival
        } else {
            Self::Invalid(tag.to_owned())
        }
    }

    /// Interpret a raw numeric index. Negative and non-integral values mean
    /// "no explicit index".
    #[must_use]
    pub fn from_number(n: f64) -> Self {
        if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) {
            Self::At(n as u32)
        } else {
            Self::Auto
        }
    }
}

/// How a step is reverted when the host hides it.
#[derive(Debug, Clone, Default)]
pub enum Backward {
    /// Replay the forward action of the previous step.
    #[default]
    Inherit,
    /// Do nothing.
    Skip,
    /// Run a dedicated action.
    Run(Action),
}

/// One animation step as exported by a visualization.
#[derive(Debug, Clone)]
pub struct StepDescriptor {
    pub index: StepIndex,
    pub forward: Action,
    pub backward: Backward,
}

impl StepDescriptor {
    /// A step with no explicit index and an inherited backward action.
    #[must_use]
    pub fn new(forward: Action) -> Self {
        Self {
            index: StepIndex::Auto,
            forward,
            backward: Backward::Inherit,
        }
    }

    /// Pin the step to a shared step index (builder pattern).
    #[must_use]
    pub fn at(mut self, index: u32) -> Self {
        self.index = StepIndex::At(index);
        self
    }

    /// Set the index tag (builder pattern).
    #[must_use]
    pub fn with_index(mut self, index: StepIndex) -> Self {
        self.index = index;
        self
    }

    /// Set the backward behaviour (builder pattern).
    #[must_use]
    pub fn with_backward(mut self, backward: Backward) -> Self {
        self.backward = backward;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn action_runs_closure() {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let action = Action::new(move || h.set(h.get() + 1));
        action.run();
        action.clone().run();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn cloned_actions_share_identity() {
        let a = Action::noop();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Action::noop()));
    }

    #[test]
    fn numeric_index_parsing() {
        assert_eq!(StepIndex::from_number(3.0), StepIndex::At(3));
        assert_eq!(StepIndex::from_number(0.0), StepIndex::At(0));
        assert_eq!(StepIndex::from_number(-1.0), StepIndex::Auto);
        assert_eq!(StepIndex::from_number(1.5), StepIndex::Auto);
        assert_eq!(StepIndex::from_number(f64::NAN), StepIndex::Auto);
    }

    #[test]
    fn tag_parsing() {
        assert_eq!(StepIndex::from_tag("onSlideChange"), StepIndex::OnSlideArrival);
        assert_eq!(
            StepIndex::from_tag("later"),
            StepIndex::Invalid("later".to_owned())
        );
    }
}
