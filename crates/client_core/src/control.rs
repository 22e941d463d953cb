use std::sync::Arc;

use anyhow::{Context, Result};
use shared::{
    domain::{ClientRole, FilterId},
    protocol::{ClientMessage, FilterInfo, ServerEvent},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, RwLock},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    transport::{RelayConnection, RelaySender},
    ClientEvent,
};

/// Why a command was dropped locally instead of being sent to the relay.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CommandRejected {
    #[error("not connected to the relay")]
    NotConnected,
    #[error("no display is connected")]
    DisplayAbsent,
    #[error("a capture is already in progress")]
    CaptureInProgress,
}

/// The control panel's view of the session, rebuilt from relay broadcasts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    pub connected: bool,
    pub display_connected: bool,
    pub current_filter: FilterId,
    pub filter_info: Option<FilterInfo>,
    pub is_capturing: bool,
    pub countdown: Option<u32>,
}

impl ControlState {
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::ConnectionStatus(status) => {
                self.display_connected = status.display_connected;
            }
            ServerEvent::FilterUpdate {
                filter,
                filter_info,
            } => {
                self.current_filter = filter.clone();
                self.filter_info = filter_info.clone();
            }
            ServerEvent::CaptureStarted => {
                self.is_capturing = true;
                self.countdown = None;
            }
            ServerEvent::CountdownUpdate { count } => self.countdown = Some(*count),
            ServerEvent::CaptureFinished => {
                self.is_capturing = false;
                self.countdown = None;
            }
            ServerEvent::StartCountdown | ServerEvent::RoleSuperseded { .. } => {}
        }
    }

    pub fn transport_lost(&mut self) {
        self.connected = false;
        self.display_connected = false;
    }

    pub fn check_filter_change(&self) -> Result<(), CommandRejected> {
        if !self.connected {
            return Err(CommandRejected::NotConnected);
        }
        Ok(())
    }

    pub fn check_capture(&self) -> Result<(), CommandRejected> {
        self.check_filter_change()?;
        if !self.display_connected {
            return Err(CommandRejected::DisplayAbsent);
        }
        if self.is_capturing {
            return Err(CommandRejected::CaptureInProgress);
        }
        Ok(())
    }
}

/// Operator console client. Commands are gated on the cached [`ControlState`].
pub struct ControlClient {
    sender: RelaySender,
    state: RwLock<ControlState>,
    events: broadcast::Sender<ClientEvent>,
}

impl ControlClient {
    /// Registers as the control panel and applies relay events in a background
    /// task until the transport closes.
    pub fn start(connection: RelayConnection) -> Result<(Arc<Self>, JoinHandle<()>)> {
        let (sender, mut inbound) = connection.into_parts();
        sender
            .send(ClientMessage::Register {
                role: ClientRole::Control,
            })
            .context("failed to register as control")?;

        let (events, _) = broadcast::channel(64);
        let client = Arc::new(Self {
            sender,
            state: RwLock::new(ControlState {
                connected: true,
                ..ControlState::default()
            }),
            events,
        });

        let task_client = Arc::clone(&client);
        let task = tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                task_client.on_event(event).await;
            }
            warn!("relay connection lost");
            task_client.state.write().await.transport_lost();
            let _ = task_client.events.send(ClientEvent::Disconnected);
        });

        Ok((client, task))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ControlState {
        self.state.read().await.clone()
    }

    pub async fn change_filter(&self, filter: impl Into<FilterId>) -> Result<(), CommandRejected> {
        let filter = filter.into();
        if let Err(reason) = self.state.read().await.check_filter_change() {
            warn!(%filter, %reason, "filter change dropped");
            return Err(reason);
        }
        info!(%filter, "requesting filter change");
        self.send(ClientMessage::ChangeFilter { filter })
    }

    pub async fn start_capture(&self) -> Result<(), CommandRejected> {
        if let Err(reason) = self.state.read().await.check_capture() {
            warn!(%reason, "capture request dropped");
            return Err(reason);
        }
        info!("requesting capture");
        self.send(ClientMessage::StartCapture)
    }

    fn send(&self, message: ClientMessage) -> Result<(), CommandRejected> {
        self.sender.send(message).map_err(|_| {
            warn!("relay writer is gone; command dropped");
            CommandRejected::NotConnected
        })
    }

    async fn on_event(&self, event: ServerEvent) {
        match &event {
            ServerEvent::RoleSuperseded { role } => {
                warn!(%role, "another control panel took over this role");
            }
            ServerEvent::CountdownUpdate { count } => info!(count, "countdown"),
            ServerEvent::CaptureFinished => info!("capture finished"),
            _ => {}
        }
        self.state.write().await.apply(&event);
        let _ = self.events.send(ClientEvent::Server(event));
    }
}

#[cfg(test)]
#[path = "tests/control_tests.rs"]
mod tests;
