//! The realtime relay. One task owns the whole session; sockets talk to it
//! through [`CoordinatorHandle`] and receive frames on their own queue.

use std::{
    collections::{BTreeMap, HashMap},
    future,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use server_api::FilterCatalog;
use shared::{
    domain::{ClientRole, ConnectionId, FilterId},
    protocol::{ClientMessage, PresenceStatus, ServerEvent},
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

mod filter_state;
mod presence;

use filter_state::FilterState;
use presence::PresenceRegistry;

pub(crate) type Outbound = mpsc::UnboundedSender<ServerEvent>;

enum Command {
    Connect {
        connection_id: ConnectionId,
        outbound: Outbound,
    },
    Message {
        connection_id: ConnectionId,
        message: ClientMessage,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Point-in-time view of the session, served to the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionSnapshot {
    pub(crate) presence: PresenceStatus,
    pub(crate) current_filter: FilterId,
    pub(crate) capture_in_progress: bool,
    pub(crate) open_connections: usize,
    /// Filter updates still waiting on a catalog lookup.
    pub(crate) pending_filter_updates: usize,
}

#[derive(Clone)]
pub(crate) struct CoordinatorHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Starts the coordinator task. It stops once every handle is dropped.
    pub(crate) fn spawn(catalog: Arc<dyn FilterCatalog>, capture_timeout: Option<Duration>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (lookups, resolved) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            session: SessionState::default(),
            connections: HashMap::new(),
            catalog,
            capture_timeout,
            lookups,
            filter_updates: FilterUpdateQueue::default(),
        };
        tokio::spawn(coordinator.run(rx, resolved));
        Self { commands }
    }

    pub(crate) fn connect(&self, outbound: Outbound) -> ConnectionId {
        let connection_id = ConnectionId::new();
        self.send(Command::Connect {
            connection_id,
            outbound,
        });
        connection_id
    }

    pub(crate) fn dispatch(&self, connection_id: ConnectionId, message: ClientMessage) {
        self.send(Command::Message {
            connection_id,
            message,
        });
    }

    pub(crate) fn disconnect(&self, connection_id: ConnectionId) {
        self.send(Command::Disconnect { connection_id });
    }

    pub(crate) async fn snapshot(&self) -> anyhow::Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply })
            .map_err(|_| anyhow::anyhow!("coordinator is not running"))?;
        rx.await.context("coordinator dropped snapshot request")
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("coordinator is not running; command dropped");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CapturePhase {
    /// `startCountdown` sent, no tick seen yet.
    Requested,
    Counting { last_count: u32 },
}

#[derive(Debug)]
struct CaptureCycle {
    id: u64,
    /// The connection that was told to run the countdown.
    display: ConnectionId,
    phase: CapturePhase,
    deadline: Option<Instant>,
}

impl CaptureCycle {
    fn last_count(&self) -> Option<u32> {
        match self.phase {
            CapturePhase::Requested => None,
            CapturePhase::Counting { last_count } => Some(last_count),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    filter: FilterState,
    presence: PresenceRegistry,
    capture: Option<CaptureCycle>,
    cycles_started: u64,
}

#[derive(Debug, Clone, Copy)]
enum UpdateTarget {
    Everyone,
    Connection(ConnectionId),
}

/// A catalog lookup that finished off the coordinator task.
struct ResolvedFilter {
    seq: u64,
    event: ServerEvent,
}

/// Filter updates in the order their triggering events arrived. An update is
/// only delivered once every earlier one has been.
#[derive(Default)]
struct FilterUpdateQueue {
    next_seq: u64,
    pending: BTreeMap<u64, (UpdateTarget, Option<ServerEvent>)>,
}

impl FilterUpdateQueue {
    fn reserve(&mut self, target: UpdateTarget) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(seq, (target, None));
        seq
    }

    /// Stores a lookup result and returns the updates that are now deliverable.
    fn resolve(&mut self, resolved: ResolvedFilter) -> Vec<(UpdateTarget, ServerEvent)> {
        if let Some((_, slot)) = self.pending.get_mut(&resolved.seq) {
            *slot = Some(resolved.event);
        }
        let mut ready = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if entry.get().1.is_none() {
                break;
            }
            if let (target, Some(event)) = entry.remove() {
                ready.push((target, event));
            }
        }
        ready
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

struct Coordinator {
    session: SessionState,
    connections: HashMap<ConnectionId, Outbound>,
    catalog: Arc<dyn FilterCatalog>,
    capture_timeout: Option<Duration>,
    lookups: mpsc::UnboundedSender<ResolvedFilter>,
    filter_updates: FilterUpdateQueue,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut resolved: mpsc::UnboundedReceiver<ResolvedFilter>,
    ) {
        loop {
            let deadline = self.session.capture.as_ref().and_then(|cycle| cycle.deadline);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(lookup) = resolved.recv() => self.on_filter_resolved(lookup),
                _ = wait_for(deadline) => self.expire_capture(),
            }
        }
        debug!("coordinator stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Connect {
                connection_id,
                outbound,
            } => {
                debug!(%connection_id, "connection opened");
                self.connections.insert(connection_id, outbound);
            }
            Command::Message {
                connection_id,
                message,
            } => self.on_message(connection_id, message),
            Command::Disconnect { connection_id } => self.on_disconnect(connection_id),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn on_message(&mut self, connection_id: ConnectionId, message: ClientMessage) {
        if !self.connections.contains_key(&connection_id) {
            warn!(%connection_id, kind = message.kind(), "message from unknown connection");
            return;
        }
        debug!(%connection_id, kind = message.kind(), "message received");

        match message {
            ClientMessage::Register { role } => self.on_register(connection_id, role),
            ClientMessage::ChangeFilter { filter } => self.on_change_filter(connection_id, filter),
            ClientMessage::StartCapture => self.on_start_capture(connection_id),
            ClientMessage::CountdownTick { count } => self.on_countdown_tick(connection_id, count),
            ClientMessage::CaptureComplete => self.on_capture_complete(connection_id),
        }
    }

    fn on_register(&mut self, connection_id: ConnectionId, role: ClientRole) {
        let registration = self.session.presence.register(connection_id, role);
        info!(%connection_id, %role, "client registered");

        if let Some(released) = registration.released {
            info!(%connection_id, role = %released, "connection gave up its previous role");
        }
        if let Some(previous) = registration.superseded {
            info!(%connection_id, superseded = %previous, %role, "role taken over");
            self.send_to(previous, ServerEvent::RoleSuperseded { role });
        }

        self.broadcast(ServerEvent::ConnectionStatus(self.session.presence.snapshot()));

        let current = self.session.filter.get().clone();
        self.request_filter_update(current, UpdateTarget::Connection(connection_id));
    }

    fn on_change_filter(&mut self, connection_id: ConnectionId, filter: FilterId) {
        let previous = self.session.filter.set(filter.clone());
        info!(%connection_id, %previous, %filter, "filter changed");

        if !previous.is_none() {
            let catalog = Arc::clone(&self.catalog);
            tokio::spawn(async move {
                if let Err(err) = catalog.increment_usage(previous.as_str()).await {
                    warn!(filter = %previous, error = %err, "failed to record filter usage");
                }
            });
        }

        self.request_filter_update(filter, UpdateTarget::Everyone);
    }

    fn on_start_capture(&mut self, connection_id: ConnectionId) {
        let Some(display) = self.session.presence.holder(ClientRole::Display) else {
            warn!(%connection_id, "capture requested with no display registered; dropped");
            return;
        };
        if let Some(cycle) = &self.session.capture {
            warn!(%connection_id, cycle = cycle.id, "capture already in progress; dropped");
            return;
        }

        self.session.cycles_started += 1;
        let cycle = CaptureCycle {
            id: self.session.cycles_started,
            display,
            phase: CapturePhase::Requested,
            deadline: self.capture_timeout.map(|timeout| Instant::now() + timeout),
        };
        info!(%connection_id, cycle = cycle.id, "capture started");
        self.session.capture = Some(cycle);

        self.send_to(display, ServerEvent::StartCountdown);
        if let Some(control) = self.session.presence.holder(ClientRole::Control) {
            self.send_to(control, ServerEvent::CaptureStarted);
        }
    }

    fn on_countdown_tick(&mut self, connection_id: ConnectionId, count: u32) {
        let Some(cycle) = self.session.capture.as_mut() else {
            warn!(%connection_id, count, "countdown tick with no capture in progress; dropped");
            return;
        };
        cycle.phase = CapturePhase::Counting { last_count: count };
        debug!(cycle = cycle.id, count, "countdown tick");
        self.broadcast(ServerEvent::CountdownUpdate { count });
    }

    fn on_capture_complete(&mut self, connection_id: ConnectionId) {
        let Some(cycle) = self.session.capture.take() else {
            warn!(%connection_id, "capture complete with no capture in progress; dropped");
            return;
        };
        info!(%connection_id, cycle = cycle.id, last_count = ?cycle.last_count(), "capture finished");
        self.broadcast(ServerEvent::CaptureFinished);
    }

    fn on_disconnect(&mut self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);
        match self.session.presence.release(connection_id) {
            Some(role) => {
                info!(%connection_id, %role, "client disconnected");
                self.broadcast(ServerEvent::ConnectionStatus(self.session.presence.snapshot()));
            }
            None => debug!(%connection_id, "connection closed"),
        }

        // The countdown runs on whichever connection was told to start it,
        // even if a newer display has since taken the slot.
        let countdown_owner = self.session.capture.as_ref().map(|cycle| cycle.display);
        if countdown_owner == Some(connection_id) {
            if let Some(cycle) = self.session.capture.take() {
                warn!(%connection_id, cycle = cycle.id, "display left mid-capture; closing cycle");
                self.broadcast(ServerEvent::CaptureFinished);
            }
        }
    }

    fn expire_capture(&mut self) {
        if let Some(cycle) = self.session.capture.take() {
            warn!(cycle = cycle.id, last_count = ?cycle.last_count(), "capture timed out; closing cycle");
            self.broadcast(ServerEvent::CaptureFinished);
        }
    }

    /// Resolves catalog info on a separate task; the result comes back
    /// through `on_filter_resolved`.
    fn request_filter_update(&mut self, filter: FilterId, target: UpdateTarget) {
        let seq = self.filter_updates.reserve(target);
        let catalog = Arc::clone(&self.catalog);
        let lookups = self.lookups.clone();
        tokio::spawn(async move {
            let event = filter_update(catalog.as_ref(), filter).await;
            let _ = lookups.send(ResolvedFilter { seq, event });
        });
    }

    fn on_filter_resolved(&mut self, resolved: ResolvedFilter) {
        for (target, event) in self.filter_updates.resolve(resolved) {
            match target {
                UpdateTarget::Everyone => self.broadcast(event),
                UpdateTarget::Connection(connection_id) => self.send_to(connection_id, event),
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            presence: self.session.presence.snapshot(),
            current_filter: self.session.filter.get().clone(),
            capture_in_progress: self.session.capture.is_some(),
            open_connections: self.connections.len(),
            pending_filter_updates: self.filter_updates.len(),
        }
    }

    fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Some(outbound) = self.connections.get(&connection_id) {
            if outbound.send(event).is_err() {
                debug!(%connection_id, "outbound queue closed");
            }
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        debug!(kind = event.kind(), recipients = self.connections.len(), "broadcast");
        for (connection_id, outbound) in &self.connections {
            if outbound.send(event.clone()).is_err() {
                debug!(%connection_id, "outbound queue closed");
            }
        }
    }
}

async fn filter_update(catalog: &dyn FilterCatalog, filter: FilterId) -> ServerEvent {
    let filter_info = match catalog.lookup_by_name(filter.as_str()).await {
        Ok(record) => record.map(|record| record.info()),
        Err(err) => {
            warn!(%filter, error = %err, "filter lookup failed; sending bare id");
            None
        }
    };
    ServerEvent::FilterUpdate {
        filter,
        filter_info,
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
