//! Two devices on the loopback hub: create a room, discover it, join,
//! ready up, start a game, and relay a move through the owner.
//!
//! Run with `cargo run --example basic_lobby`, with `RUST_LOG=debug` for
//! the session loop's tracing output.

use std::time::Duration;

use tokio::sync::mpsc;

use nearby_session::protocol::{PlayerAction, RoomAction};
use nearby_session::session::{CreateRoomParams, NearbySession, SessionConfig};
use nearby_session::transports::LoopbackHub;
use nearby_session::{EventKind, NearbyError, SessionEvent};

/// Forward one event kind into a channel this demo can await.
fn watch(session: &NearbySession, kind: EventKind) -> mpsc::UnboundedReceiver<SessionEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    session.on(kind, move |event| {
        let _ = tx.send(event);
    });
    rx
}

#[tokio::main]
async fn main() -> Result<(), NearbyError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let hub = LoopbackHub::new();
    let config = SessionConfig::new().with_advert_interval(Duration::from_millis(200));

    // Both "devices" live in this process, so the detached constructor is
    // used instead of the process-singleton `start`.
    let alice = NearbySession::start_detached(hub.endpoint("alice"), config.clone());
    let bob = NearbySession::start_detached(hub.endpoint("bob"), config);

    let mut created = watch(&alice, EventKind::CreateRoom);
    let mut lists = watch(&bob, EventKind::NearbyRoomList);
    let mut joined = watch(&bob, EventKind::JoinRoom);
    let mut started = watch(&bob, EventKind::UpdateRoomNotify);
    let mut inbox = watch(&alice, EventKind::ReceiveFromPlayer);

    alice.init("alice")?;
    bob.init("bob")?;

    alice.create_room(CreateRoomParams::new("Lobby1", 2, 4))?;
    if let Some(SessionEvent::CreateRoom { room: Some(room), .. }) = created.recv().await {
        println!("alice opened room {}", room.room_id);
    }

    // Bob waits for the advert, then joins the first room he sees.
    let room_id = loop {
        match lists.recv().await {
            Some(SessionEvent::NearbyRoomList { rooms }) => {
                if let Some(first) = rooms.first() {
                    break first.room_id.clone();
                }
            }
            Some(_) => continue,
            None => return Ok(()),
        }
    };
    bob.join_room(room_id.clone())?;
    if let Some(SessionEvent::JoinRoom { code: 0, .. }) = joined.recv().await {
        println!("bob joined {room_id}");
    }

    alice.update_player(PlayerAction::Ready)?;
    bob.update_player(PlayerAction::Ready)?;

    // Give the readiness notifies a moment to land on the owner.
    tokio::time::sleep(Duration::from_millis(100)).await;
    alice.update_room(RoomAction::Start)?;
    if let Some(SessionEvent::UpdateRoomNotify { status, .. }) = started.recv().await {
        println!("game started: room status {status:?}");
    }

    bob.send_to_master("{\"move\":\"e4\"}")?;
    if let Some(SessionEvent::ReceiveFromPlayer { open_id, message, .. }) = inbox.recv().await {
        println!("alice received {message} from {open_id}");
    }

    Ok(())
}
