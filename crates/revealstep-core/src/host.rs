#![forbid(unsafe_code)]

//! Presentation host boundary.

use crate::playback::FragmentRef;
use crate::slide::SlideIndex;
use crate::surface::ContainerSpec;

/// Events delivered by the presentation host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Ready {
        current: SlideIndex,
    },
    SlideChanged {
        previous: Option<SlideIndex>,
        current: SlideIndex,
    },
    OverviewShown {
        current: SlideIndex,
    },
    OverviewHidden {
        current: SlideIndex,
    },
    FragmentShown {
        slide: SlideIndex,
        fragments: Vec<FragmentRef>,
    },
    FragmentHidden {
        slide: SlideIndex,
        fragments: Vec<FragmentRef>,
    },
}

/// Static layout of one slide as discovered by the host adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideLayout {
    pub index: SlideIndex,
    /// Step markers authored on the slide. Duplicates count once.
    pub authored_markers: Vec<u32>,
    pub foreground: Vec<ContainerSpec>,
    pub background: Option<ContainerSpec>,
}

impl SlideLayout {
    #[must_use]
    pub fn new(index: SlideIndex) -> Self {
        Self {
            index,
            authored_markers: Vec::new(),
            foreground: Vec::new(),
            background: None,
        }
    }

    /// Number of distinct authored markers.
    #[must_use]
    pub fn authored_count(&self) -> u32 {
        let mut markers = self.authored_markers.clone();
        markers.sort_unstable();
        markers.dedup();
        markers.len() as u32
    }

    #[must_use]
    pub fn with_authored(mut self, markers: impl IntoIterator<Item = u32>) -> Self {
        self.authored_markers.extend(markers);
        self
    }

    #[must_use]
    pub fn with_foreground(mut self, spec: ContainerSpec) -> Self {
        self.foreground.push(spec);
        self
    }

    #[must_use]
    pub fn with_background(mut self, spec: ContainerSpec) -> Self {
        self.background = Some(spec);
        self
    }
}

/// Operations the engine needs from the presentation host.
pub trait PresentationHost {
    /// Number of horizontal slides in the deck.
    fn total_horizontal_slides(&self) -> u32;

    /// Make sure `slide` has a step marker for each of `markers` and tag
    /// them as visualization-driven. Markers that already exist are tagged
    /// in place.
    fn insert_step_markers(&mut self, slide: SlideIndex, markers: &[u32]);

    /// Recompute the host's step bookkeeping after markers changed.
    fn sync_layout(&mut self);

    /// Deliver a key press captured inside a surface to the host.
    fn forward_key(&mut self, key_code: u32);
}
