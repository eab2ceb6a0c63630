//! Per-mote container: position, MAC state and installed applications.

use super::application::{Application, PassiveObserver};
use super::mac::MacLayer;
use super::types::{AppTag, NodeId, Position};

pub(crate) struct InstalledApplication {
    pub(crate) tag: AppTag,
    /// `None` only while one of its callbacks is running.
    pub(crate) app: Option<Box<dyn Application>>,
}

/// One simulated mote. Created at setup, never removed during a run.
pub struct Node {
    id: NodeId,
    position: Position,
    pub(crate) mac: MacLayer,
    pub(crate) apps: Vec<InstalledApplication>,
    pub(crate) observer: Option<Box<dyn PassiveObserver>>,
}

impl Node {
    pub(crate) fn new(id: NodeId, position: Position, mac: MacLayer) -> Self {
        Self {
            id,
            position,
            mac,
            apps: Vec::new(),
            observer: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn mac(&self) -> &MacLayer {
        &self.mac
    }

    /// Tags of installed applications in installation order.
    pub fn application_tags(&self) -> impl Iterator<Item = AppTag> + '_ {
        self.apps.iter().map(|installed| installed.tag)
    }

    pub fn has_application(&self, tag: AppTag) -> bool {
        self.app_index(tag).is_some()
    }

    pub(crate) fn app_index(&self, tag: AppTag) -> Option<usize> {
        self.apps.iter().position(|installed| installed.tag == tag)
    }

    /// Borrow an installed application as its concrete type.
    pub fn application<A: Application>(&self, tag: AppTag) -> Option<&A> {
        let installed = &self.apps[self.app_index(tag)?];
        installed.app.as_ref()?.as_any().downcast_ref::<A>()
    }

    pub fn application_mut<A: Application>(&mut self, tag: AppTag) -> Option<&mut A> {
        let index = self.app_index(tag)?;
        self.apps[index].app.as_mut()?.as_any_mut().downcast_mut::<A>()
    }
}
