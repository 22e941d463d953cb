use super::*;

use shared::protocol::PresenceStatus;
use tokio::sync::mpsc;

fn status(display_connected: bool) -> ServerEvent {
    ServerEvent::ConnectionStatus(PresenceStatus {
        display_connected,
        control_connected: true,
    })
}

#[test]
fn capture_gate_checks_connection_then_display_then_capture() {
    let mut state = ControlState::default();
    assert_eq!(state.check_capture(), Err(CommandRejected::NotConnected));
    assert_eq!(state.check_filter_change(), Err(CommandRejected::NotConnected));

    state.connected = true;
    assert_eq!(state.check_filter_change(), Ok(()));
    assert_eq!(state.check_capture(), Err(CommandRejected::DisplayAbsent));

    state.apply(&status(true));
    assert_eq!(state.check_capture(), Ok(()));

    state.apply(&ServerEvent::CaptureStarted);
    assert_eq!(state.check_capture(), Err(CommandRejected::CaptureInProgress));
    assert_eq!(state.check_filter_change(), Ok(()));
}

#[test]
fn capture_cycle_events_drive_capturing_flag_and_countdown() {
    let mut state = ControlState {
        connected: true,
        ..ControlState::default()
    };
    state.apply(&ServerEvent::CaptureStarted);
    state.apply(&ServerEvent::CountdownUpdate { count: 3 });
    assert!(state.is_capturing);
    assert_eq!(state.countdown, Some(3));

    state.apply(&ServerEvent::CaptureFinished);
    assert!(!state.is_capturing);
    assert_eq!(state.countdown, None);
}

#[test]
fn transport_loss_clears_connection_flags_only() {
    let mut state = ControlState {
        connected: true,
        ..ControlState::default()
    };
    state.apply(&status(true));
    state.apply(&ServerEvent::FilterUpdate {
        filter: FilterId::new("forest"),
        filter_info: None,
    });

    state.transport_lost();
    assert!(!state.connected);
    assert!(!state.display_connected);
    assert_eq!(state.current_filter.as_str(), "forest");
}

async fn applied(events: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
    events.recv().await.expect("client event")
}

#[tokio::test]
async fn control_client_gates_commands_on_relay_broadcasts() {
    let (outbound, mut sent) = mpsc::unbounded_channel();
    let (relay, inbound) = mpsc::unbounded_channel();
    let (client, task) =
        ControlClient::start(RelayConnection::from_channels(outbound, inbound)).expect("start");
    let mut events = client.subscribe_events();

    assert_eq!(
        sent.recv().await,
        Some(ClientMessage::Register {
            role: ClientRole::Control
        })
    );

    assert_eq!(
        client.start_capture().await,
        Err(CommandRejected::DisplayAbsent)
    );
    assert!(sent.try_recv().is_err());

    relay.send(status(true)).expect("relay");
    applied(&mut events).await;
    assert_eq!(client.start_capture().await, Ok(()));
    assert_eq!(sent.recv().await, Some(ClientMessage::StartCapture));

    relay.send(ServerEvent::CaptureStarted).expect("relay");
    applied(&mut events).await;
    assert_eq!(
        client.start_capture().await,
        Err(CommandRejected::CaptureInProgress)
    );

    relay
        .send(ServerEvent::CountdownUpdate { count: 2 })
        .expect("relay");
    applied(&mut events).await;
    assert_eq!(client.state().await.countdown, Some(2));

    relay.send(ServerEvent::CaptureFinished).expect("relay");
    applied(&mut events).await;
    assert!(!client.state().await.is_capturing);

    assert_eq!(client.change_filter("space").await, Ok(()));
    assert_eq!(
        sent.recv().await,
        Some(ClientMessage::ChangeFilter {
            filter: FilterId::new("space")
        })
    );

    drop(relay);
    assert_eq!(applied(&mut events).await, ClientEvent::Disconnected);
    task.await.expect("event task");

    let state = client.state().await;
    assert!(!state.connected);
    assert!(!state.display_connected);
    assert_eq!(
        client.change_filter("flower").await,
        Err(CommandRejected::NotConnected)
    );
    assert!(sent.try_recv().is_err());
}
