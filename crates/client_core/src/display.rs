use std::future;

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::{
    domain::{ClientRole, FilterId},
    protocol::{ClientMessage, FilterInfo, PresenceStatus, ServerEvent},
};
use tokio::time::{interval_at, sleep_until, Instant, Interval};
use tracing::{debug, error, info, warn};

use crate::{
    countdown::{Countdown, CountdownStep, FLASH_DURATION, TICK_INTERVAL},
    transport::RelayConnection,
};

/// The local side effect performed when the countdown reaches zero.
#[async_trait]
pub trait CaptureAction: Send {
    async fn capture(&mut self, filter: &FilterId) -> Result<()>;
}

/// Kiosk screen client. Holds the filter cache and drives the countdown.
pub struct DisplayClient<A: CaptureAction> {
    connection: RelayConnection,
    action: A,
    current_filter: FilterId,
    filter_info: Option<FilterInfo>,
    presence: PresenceStatus,
    countdown: Countdown,
}

impl<A: CaptureAction> DisplayClient<A> {
    pub fn new(connection: RelayConnection, action: A) -> Self {
        Self {
            connection,
            action,
            current_filter: FilterId::none(),
            filter_info: None,
            presence: PresenceStatus::default(),
            countdown: Countdown::default(),
        }
    }

    pub fn current_filter(&self) -> &FilterId {
        &self.current_filter
    }

    pub fn filter_info(&self) -> Option<&FilterInfo> {
        self.filter_info.as_ref()
    }

    pub fn presence(&self) -> PresenceStatus {
        self.presence
    }

    pub fn countdown(&self) -> Countdown {
        self.countdown
    }

    /// Registers as the display and serves relay events until the transport
    /// closes. Dropping the returned future stops any running countdown.
    pub async fn run(&mut self) -> Result<()> {
        self.connection
            .send(ClientMessage::Register {
                role: ClientRole::Display,
            })
            .context("failed to register as display")?;

        let mut ticker: Option<Interval> = None;
        let mut flash_until: Option<Instant> = None;

        loop {
            tokio::select! {
                event = self.connection.next_event() => {
                    let Some(event) = event else {
                        info!("relay connection closed");
                        return Ok(());
                    };
                    if self.on_event(event) {
                        ticker = Some(interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL));
                    }
                }
                _ = next_tick(&mut ticker) => match self.countdown.tick() {
                    CountdownStep::Tick(count) => {
                        debug!(count, "countdown tick");
                        self.send(ClientMessage::CountdownTick { count });
                    }
                    CountdownStep::Flash => {
                        ticker = None;
                        flash_until = Some(Instant::now() + FLASH_DURATION);
                    }
                    CountdownStep::Ignored => ticker = None,
                },
                _ = wait_until(flash_until) => {
                    flash_until = None;
                    if let Err(err) = self.action.capture(&self.current_filter).await {
                        error!(filter = %self.current_filter, error = %err, "capture failed");
                    }
                    self.countdown.finish_flash();
                    info!(filter = %self.current_filter, "capture complete");
                    self.send(ClientMessage::CaptureComplete);
                }
            }
        }
    }

    /// Applies one relay event; returns `true` when a countdown just started.
    fn on_event(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::StartCountdown => {
                if self.countdown.start() {
                    info!("countdown started");
                    true
                } else {
                    warn!("countdown already running; start ignored");
                    false
                }
            }
            ServerEvent::FilterUpdate {
                filter,
                filter_info,
            } => {
                info!(%filter, "filter updated");
                self.current_filter = filter;
                self.filter_info = filter_info;
                false
            }
            ServerEvent::ConnectionStatus(status) => {
                debug!(control_connected = status.control_connected, "presence update");
                self.presence = status;
                false
            }
            ServerEvent::RoleSuperseded { role } => {
                warn!(%role, "another client took over this role");
                false
            }
            other => {
                debug!(kind = other.kind(), "event ignored by display");
                false
            }
        }
    }

    fn send(&self, message: ClientMessage) {
        let kind = message.kind();
        if let Err(err) = self.connection.send(message) {
            warn!(kind, error = %err, "message not sent");
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
#[path = "tests/display_tests.rs"]
mod tests;
