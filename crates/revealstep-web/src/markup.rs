#![forbid(unsafe_code)]

//! Authoring markup and visualization contract, decoded without a DOM.
//!
//! The wasm layer reads raw attribute values and JS values and hands them to
//! these functions, so the decoding rules are testable on native targets.

use revealstep_core::step::{Action, Backward, StepIndex};
use revealstep_core::surface::DEFAULT_SCROLLING;
use revealstep_core::{ContainerId, ContainerSpec};

/// Class flagging an element as a visualization container.
pub const CONTAINER_CLASS: &str = "fig-container";

/// Class carried by step markers created for visualizations.
pub const STEP_MARKER_CLASS: &str = "visualizationStep";

/// Property a visualization document exports its steps under.
pub const TRANSITIONS_PROPERTY: &str = "_transitions";

/// Value of `transitionBackward` meaning "do nothing".
pub const SKIP_SENTINEL: &str = "none";

pub const ATTR_FILE: &str = "data-file";
pub const ATTR_STYLE: &str = "data-style";
pub const ATTR_PRELOAD: &str = "data-preload";
pub const ATTR_NO_BACKGROUND: &str = "data-no-background";
pub const ATTR_OVERFLOW_SHOWN: &str = "data-overflow-shown";
pub const ATTR_SCROLL: &str = "data-scroll";
pub const ATTR_FRAGMENT_INDEX: &str = "data-fragment-index";

/// Where a container's surface is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Inside the container element itself.
    Foreground,
    /// In the slide's background layer.
    Background,
}

/// A slide section flagged as a container hosts its surface in the background
/// layer, unless it opts out with `data-no-background`.
#[must_use]
pub fn placement(is_section: bool, no_background: bool) -> Placement {
    if is_section && !no_background {
        Placement::Background
    } else {
        Placement::Foreground
    }
}

/// Build a container spec from an attribute lookup.
///
/// Returns `None` when the container names no resource.
pub fn container_spec(id: ContainerId, attr: impl Fn(&str) -> Option<String>) -> Option<ContainerSpec> {
    let Some(file) = attr(ATTR_FILE).filter(|f| !f.trim().is_empty()) else {
        tracing::warn!(container = %id, "visualization container without {ATTR_FILE}");
        return None;
    };
    let style = attr(ATTR_STYLE).unwrap_or_default();
    let scrolling = attr(ATTR_SCROLL)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_SCROLLING.to_owned());
    Some(
        ContainerSpec::new(id, file.trim())
            .with_style(&style)
            .preload(attr(ATTR_PRELOAD).is_some())
            .overflow_shown(attr(ATTR_OVERFLOW_SHOWN).as_deref().is_some_and(json_true))
            .scrolling(scrolling),
    )
}

/// The attribute holds the JSON literal `true`.
fn json_true(value: &str) -> bool {
    serde_json::from_str::<bool>(value).unwrap_or(false)
}

/// Parse a `data-fragment-index` value.
#[must_use]
pub fn fragment_index(value: &str) -> Option<u32> {
    value.trim().parse().ok()
}

/// Distinct authored markers, ascending, from raw fragment index values.
pub fn authored_markers<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> Vec<u32> {
    let mut markers: Vec<u32> = values.into_iter().flatten().filter_map(fragment_index).collect();
    markers.sort_unstable();
    markers.dedup();
    markers
}

/// The `index` member of one exported step.
#[derive(Debug, Clone, PartialEq)]
pub enum RawIndex {
    Missing,
    Number(f64),
    Text(String),
}

#[must_use]
pub fn step_index(raw: RawIndex) -> StepIndex {
    match raw {
        RawIndex::Missing => StepIndex::Auto,
        RawIndex::Number(n) => StepIndex::from_number(n),
        RawIndex::Text(text) => match text.trim().parse::<f64>() {
            Ok(n) => StepIndex::from_number(n),
            Err(_) => StepIndex::from_tag(&text),
        },
    }
}

/// The `transitionBackward` member of one exported step.
#[derive(Debug, Clone)]
pub enum RawBackward {
    Missing,
    Text(String),
    Callable(Action),
}

#[must_use]
pub fn backward(raw: RawBackward) -> Backward {
    match raw {
        RawBackward::Missing => Backward::Inherit,
        RawBackward::Callable(action) => Backward::Run(action),
        RawBackward::Text(text) if text == SKIP_SENTINEL => Backward::Skip,
        RawBackward::Text(text) => {
            tracing::warn!(value = %text, "unrecognised transitionBackward, inheriting");
            Backward::Inherit
        }
    }
}
