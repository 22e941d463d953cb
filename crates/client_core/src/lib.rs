//! Client side of the photo booth relay: the websocket transport, the
//! display countdown and the control panel command gate.

use shared::protocol::ServerEvent;

pub mod catalog;
pub mod control;
pub mod countdown;
pub mod display;
pub mod transport;

pub use catalog::{photo_data_url, CatalogClient, MediaUploader};
pub use control::{CommandRejected, ControlClient, ControlState};
pub use countdown::{Countdown, CountdownStep};
pub use display::{CaptureAction, DisplayClient};
pub use transport::{ws_url, RelayClosed, RelayConnection, RelaySender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Server(ServerEvent),
    Disconnected,
}
