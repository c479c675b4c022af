//! Fetch identity tracking.
//!
//! The orchestrator decides *whether* a fetch may start and *whose* response
//! may be applied. It never touches the record itself: the host turns its
//! answers into commands.
//!
//! Every issued fetch gets a [`FetchTicket`]. Only the ticket issued last and
//! not yet retired is current. `Clear` and dependency invalidation retire it,
//! so a response arriving afterwards is recognised as superseded and dropped.

use freshet_core::ViewFlags;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one issued fetch (UUIDv7, so tickets sort by issue time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FetchTicket(Uuid);

impl FetchTicket {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for FetchTicket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FetchTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What caused a fetch to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchTrigger {
    /// An explicit `fetch()` call
    Manual,
    /// The view became pending for fetch
    Auto,
}

impl FetchTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchTrigger::Manual => "manual",
            FetchTrigger::Auto => "auto",
        }
    }
}

impl fmt::Display for FetchTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict on a finished fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The fetch was current; its outcome goes into the record
    Applied,
    /// The fetch was retired meanwhile; its outcome is discarded
    Superseded,
}

#[derive(Debug, Default)]
pub struct FetchOrchestrator {
    current: Option<FetchTicket>,
    in_flight: usize,
}

impl FetchOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ticket whose response will be applied, if any.
    pub fn current(&self) -> Option<FetchTicket> {
        self.current
    }

    /// Fetches still running, superseded ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// True when the view asks for a fetch and none is current.
    pub fn should_auto_fetch(&self, flags: &ViewFlags) -> bool {
        self.current.is_none() && flags.is_pending_for_fetch
    }

    /// True when an explicit fetch may start. It never may while loading.
    pub fn may_start_manual(&self, is_loading: bool) -> bool {
        self.current.is_none() && !is_loading
    }

    /// Issue a new current ticket.
    pub fn begin(&mut self) -> FetchTicket {
        let ticket = FetchTicket::new();
        self.current = Some(ticket);
        self.in_flight += 1;
        ticket
    }

    /// Retire the current ticket, returning it.
    pub fn supersede(&mut self) -> Option<FetchTicket> {
        self.current.take()
    }

    /// Record that `ticket` finished and decide what happens to its outcome.
    pub fn complete(&mut self, ticket: FetchTicket) -> Completion {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.current == Some(ticket) {
            self.current = None;
            Completion::Applied
        } else {
            Completion::Superseded
        }
    }
}
