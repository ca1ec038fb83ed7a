#![forbid(unsafe_code)]

//! Slide coordinates and stable identifiers.

use std::fmt;

/// Position of a slide in the host's 2-D index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SlideIndex {
    /// Horizontal index.
    pub h: u32,
    /// Vertical index within the horizontal stack.
    pub v: u32,
}

impl SlideIndex {
    #[must_use]
    pub const fn new(h: u32, v: u32) -> Self {
        Self { h, v }
    }

    /// Direction of travel when moving from `previous` to `self`.
    ///
    /// Navigation is backward iff either component decreased.
    #[must_use]
    pub fn direction_from(self, previous: Self) -> Direction {
        if self.h < previous.h || self.v < previous.v {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }
}

impl fmt::Display for SlideIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.h, self.v)
    }
}

/// Playback or navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

/// Host-assigned identifier of a container element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(pub u32);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Stable identity of the surface slot bound to one container.
///
/// The identity survives teardown and re-materialization; each embed of a
/// document into the slot is distinguished by a generation number instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_is_backward_when_either_axis_decreases() {
        let at = SlideIndex::new;
        assert_eq!(at(1, 0).direction_from(at(2, 0)), Direction::Backward);
        assert_eq!(at(2, 0).direction_from(at(2, 1)), Direction::Backward);
        assert_eq!(at(3, 0).direction_from(at(2, 4)), Direction::Backward);
        assert_eq!(at(2, 1).direction_from(at(2, 0)), Direction::Forward);
        assert_eq!(at(3, 0).direction_from(at(2, 0)), Direction::Forward);
        assert_eq!(at(2, 0).direction_from(at(2, 0)), Direction::Forward);
    }

    #[test]
    fn display_formats() {
        assert_eq!(SlideIndex::new(3, 1).to_string(), "3/1");
        assert_eq!(ContainerId(7).to_string(), "c7");
        assert_eq!(SurfaceId(2).to_string(), "s2");
    }
}
