//! Recording fakes for engine scenario tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use revealstep_core::{
    Action, ContainerId, EmbedRequest, PresentationHost, SlideIndex, SurfaceAdapter, SurfaceError,
    SurfaceTicket,
};

/// Shared log of action names, in run order.
pub type Log = Rc<RefCell<Vec<String>>>;

pub fn logged(log: &Log, name: &str) -> Action {
    let log = log.clone();
    let name = name.to_owned();
    Action::new(move || log.borrow_mut().push(name.clone()))
}

pub fn drain(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    pub total_horizontal: u32,
    pub inserted: Vec<(SlideIndex, Vec<u32>)>,
    pub syncs: usize,
    pub keys: Vec<u32>,
}

impl RecordingHost {
    pub fn with_slides(total_horizontal: u32) -> Self {
        Self {
            total_horizontal,
            ..Self::default()
        }
    }
}

impl PresentationHost for RecordingHost {
    fn total_horizontal_slides(&self) -> u32 {
        self.total_horizontal
    }

    fn insert_step_markers(&mut self, slide: SlideIndex, markers: &[u32]) {
        self.inserted.push((slide, markers.to_vec()));
    }

    fn sync_layout(&mut self) {
        self.syncs += 1;
    }

    fn forward_key(&mut self, key_code: u32) {
        self.keys.push(key_code);
    }
}

#[derive(Debug, Default)]
pub struct RecordingSurfaces {
    pub embedded: Vec<EmbedRequest>,
    pub removed: Vec<ContainerId>,
    pub probes: Vec<(SurfaceTicket, String)>,
    /// Containers that already hold foreign content.
    pub occupied: BTreeSet<ContainerId>,
    /// Containers whose embed fails.
    pub broken: BTreeSet<ContainerId>,
}

impl RecordingSurfaces {
    /// Ticket of the latest embed into `container`.
    pub fn ticket(&self, container: ContainerId) -> SurfaceTicket {
        self.embedded
            .iter()
            .rev()
            .find(|r| r.container == container)
            .map(|r| r.ticket)
            .expect("container was never embedded")
    }

    pub fn embeds_into(&self, container: ContainerId) -> usize {
        self.embedded
            .iter()
            .filter(|r| r.container == container)
            .count()
    }
}

impl SurfaceAdapter for RecordingSurfaces {
    fn embed(&mut self, request: &EmbedRequest) -> Result<(), SurfaceError> {
        if self.broken.contains(&request.container) {
            return Err(SurfaceError::MissingContainer(request.container));
        }
        self.embedded.push(request.clone());
        Ok(())
    }

    fn remove(&mut self, container: ContainerId) {
        self.removed.push(container);
    }

    fn has_surface(&self, container: ContainerId) -> bool {
        self.occupied.contains(&container)
    }

    fn probe(&mut self, ticket: SurfaceTicket, url: &str) {
        self.probes.push((ticket, url.to_owned()));
    }
}
