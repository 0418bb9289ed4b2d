//! Cloneable control surface for a running orchestrator

use tokio::sync::{mpsc, watch};

use super::{Action, Event, Snapshot};
use crate::{Error, Result};

/// Sends actions to an [`Orchestrator`](super::Orchestrator) and observes its state
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Event>,
    snapshots: watch::Receiver<Snapshot>,
}

impl OrchestratorHandle {
    pub(super) const fn new(
        tx: mpsc::UnboundedSender<Event>,
        snapshots: watch::Receiver<Snapshot>,
    ) -> Self {
        Self { tx, snapshots }
    }

    /// Queue an action
    ///
    /// # Errors
    ///
    /// Returns [`Error::Orchestrator`] if the orchestrator has stopped
    pub fn send(&self, action: Action) -> Result<()> {
        self.tx
            .send(Event::Action(action))
            .map_err(|_| Error::Orchestrator("orchestrator is not running".to_string()))
    }

    /// # Errors
    ///
    /// Returns [`Error::Orchestrator`] if the orchestrator has stopped
    pub fn start_capture(&self) -> Result<()> {
        self.send(Action::StartCapture)
    }

    /// # Errors
    ///
    /// Returns [`Error::Orchestrator`] if the orchestrator has stopped
    pub fn stop_capture(&self) -> Result<()> {
        self.send(Action::StopCapture)
    }

    /// # Errors
    ///
    /// Returns [`Error::Orchestrator`] if the orchestrator has stopped
    pub fn clear(&self) -> Result<()> {
        self.send(Action::Clear)
    }

    /// # Errors
    ///
    /// Returns [`Error::Orchestrator`] if the orchestrator has stopped
    pub fn stop_speaking(&self) -> Result<()> {
        self.send(Action::StopSpeaking)
    }

    /// # Errors
    ///
    /// Returns [`Error::Orchestrator`] if the orchestrator has already stopped
    pub fn shutdown(&self) -> Result<()> {
        self.send(Action::Shutdown)
    }

    /// Latest published state
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}
