//! The nearby session manager: facade and background session loop.
//!
//! [`NearbySession`] is a thin handle that communicates with a background
//! session loop task via an unbounded MPSC channel. Every public operation
//! validates its purely local preconditions inline, queues a command, and
//! returns immediately; outcomes arrive asynchronously through the
//! [`EventDispatcher`] as completion and notification events, all delivered
//! on the loop's single callback-processing context.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = adapter_connect_somehow().await;
//! let session = NearbySession::start(transport, SessionConfig::new())?;
//!
//! session.on(EventKind::CreateRoom, |event| { /* … */ });
//! session.init("player-open-id")?;
//! session.create_room(CreateRoomParams::new("Room1", 2, 4))?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use rand::distr::Alphanumeric;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::dispatcher::EventDispatcher;
use crate::error::{NearbyError, Result};
use crate::event::{fail, ok, EventKind, SessionEvent};
use crate::error_codes::ErrorCode;
use crate::protocol::{
    capacity_is_valid, room_id_is_valid, room_name_is_valid, ConnectionStatus, LeaveType,
    PlayerAction, Properties, Room, RoomAction, RoomStatus, RoomSummary, RoomType, WireMessage,
    MAX_MESSAGE_LEN, MAX_PLAYERS, MAX_ROOM_ID_LEN,
};
use crate::relay::{self, Delivery, ToMasterPlan};
use crate::transport::{NearbyTransport, TransportEvent};

/// Default interval between discovery advert broadcasts.
const DEFAULT_ADVERT_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of advert intervals after which a silent room is pruned.
const DEFAULT_ADVERT_TTL_INTERVALS: u32 = 3;

/// Default cap on the nearby room list.
const DEFAULT_MAX_NEARBY_ROOMS: usize = 20;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Process-wide guard: at most one live manager (see [`NearbySession::start`]).
static MANAGER_LIVE: AtomicBool = AtomicBool::new(false);

// Session lifecycle, stored in an atomic so handle methods stay synchronous.
const LIFECYCLE_UNINITIALIZED: u8 = 0;
const LIFECYCLE_ACTIVE: u8 = 1;
const LIFECYCLE_DESTROYED: u8 = 2;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`NearbySession`].
///
/// All fields have defaults; construct with [`SessionConfig::new`] and tune
/// with the builder methods.
///
/// # Example
///
/// ```
/// use nearby_session::session::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new()
///     .with_advert_interval(Duration::from_secs(1))
///     .with_max_nearby_rooms(8);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between discovery advert broadcasts while owning a joinable
    /// public room. Defaults to **2 seconds**.
    pub advert_interval: Duration,
    /// Age after which a nearby room that stopped advertising is pruned from
    /// the discovery list. Defaults to **3 advert intervals**.
    pub advert_ttl: Duration,
    /// Cap on the nearby room list delivered to the application.
    /// Defaults to **20**.
    pub max_nearby_rooms: usize,
    /// Timeout for the graceful shutdown. When [`NearbySession::shutdown`] is
    /// called, the session loop is given this much time to close the
    /// transport; after that the task is aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            advert_interval: DEFAULT_ADVERT_INTERVAL,
            advert_ttl: DEFAULT_ADVERT_INTERVAL * DEFAULT_ADVERT_TTL_INTERVALS,
            max_nearby_rooms: DEFAULT_MAX_NEARBY_ROOMS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the discovery advert interval; the advert TTL follows as three
    /// intervals unless set explicitly afterwards.
    #[must_use]
    pub fn with_advert_interval(mut self, interval: Duration) -> Self {
        self.advert_interval = interval;
        self.advert_ttl = interval * DEFAULT_ADVERT_TTL_INTERVALS;
        self
    }

    /// Set the advert TTL explicitly.
    #[must_use]
    pub fn with_advert_ttl(mut self, ttl: Duration) -> Self {
        self.advert_ttl = ttl;
        self
    }

    /// Cap the nearby room list. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_max_nearby_rooms(mut self, cap: usize) -> Self {
        self.max_nearby_rooms = cap.max(1);
        self
    }

    /// Set the graceful-shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── CreateRoomParams ────────────────────────────────────────────────

/// Parameters for [`NearbySession::create_room`].
///
/// Only the name and capacity bounds are required; the room type defaults to
/// [`RoomType::Public`] and the properties to an empty set.
///
/// # Example
///
/// ```
/// use nearby_session::session::CreateRoomParams;
/// use nearby_session::protocol::RoomType;
///
/// let params = CreateRoomParams::new("Room1", 2, 4)
///     .with_room_type(RoomType::Private);
/// assert_eq!(params.room_name, "Room1");
/// ```
#[derive(Debug, Clone)]
pub struct CreateRoomParams {
    /// Room name: at most 12 characters, digits/letters/underscore/CJK.
    pub room_name: String,
    /// Minimum supported players, in `[1, 6]`.
    pub min_player_num: u8,
    /// Maximum supported players, in `[1, 6]`.
    pub max_player_num: u8,
    /// Visibility; private rooms are never advertised.
    pub room_type: RoomType,
    /// Owner-writable room properties (≤300 serialized characters).
    pub custom_properties: Properties,
}

impl CreateRoomParams {
    /// Create parameters with the required fields and default visibility.
    pub fn new(room_name: impl Into<String>, min_player_num: u8, max_player_num: u8) -> Self {
        Self {
            room_name: room_name.into(),
            min_player_num,
            max_player_num,
            room_type: RoomType::Public,
            custom_properties: Properties::new(),
        }
    }

    /// Set the room visibility.
    #[must_use]
    pub fn with_room_type(mut self, room_type: RoomType) -> Self {
        self.room_type = room_type;
        self
    }

    /// Set the custom room properties.
    #[must_use]
    pub fn with_custom_properties(mut self, properties: Properties) -> Self {
        self.custom_properties = properties;
        self
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Commands queued from the handle to the session loop.
enum Command {
    Init { open_id: String },
    Destroy,
    CreateRoom(CreateRoomParams),
    JoinRoom { room_id: String },
    LeaveRoom { room_id: String },
    GetRoom { room_id: String },
    UpdateRoom { action: RoomAction },
    UpdatePlayer { action: PlayerAction },
    SendToMaster { message: String },
    SendToPlayer {
        message: String,
        open_ids: Option<Vec<String>>,
    },
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the handle and the session loop.
struct SharedState {
    lifecycle: AtomicU8,
    connected: AtomicBool,
}

impl SharedState {
    fn new() -> Self {
        Self {
            lifecycle: AtomicU8::new(LIFECYCLE_UNINITIALIZED),
            connected: AtomicBool::new(true),
        }
    }
}

// ── Handle ──────────────────────────────────────────────────────────

/// Handle to the nearby session manager.
///
/// Created via [`NearbySession::start`], which spawns the background session
/// loop. All public methods are non-blocking: they perform purely local
/// validation, queue a command, and return; results arrive via the handler
/// registered for the operation's completion [`EventKind`].
pub struct NearbySession {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<SharedState>,
    dispatcher: Arc<StdMutex<EventDispatcher>>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
    /// Whether this handle holds the process-singleton guard.
    holds_guard: bool,
}

impl NearbySession {
    /// Start the session loop over a connected transport.
    ///
    /// At most one manager may exist per process: a second call while one is
    /// live fails with [`NearbyError::ManagerExists`] rather than handing
    /// back the existing instance. The guard is released when the handle is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`NearbyError::ManagerExists`] if a manager is already live.
    pub fn start(transport: impl NearbyTransport, config: SessionConfig) -> Result<Self> {
        if MANAGER_LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(NearbyError::ManagerExists);
        }
        let mut session = Self::start_detached(transport, config);
        session.holds_guard = true;
        Ok(session)
    }

    /// Start a session loop without taking the process-singleton guard.
    ///
    /// Intended for tests and simulations that run several devices in one
    /// process (e.g. endpoints of a
    /// [`LoopbackHub`](crate::transports::LoopbackHub)). Production hosts
    /// should use [`NearbySession::start`].
    pub fn start_detached(transport: impl NearbyTransport, config: SessionConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let state = Arc::new(SharedState::new());
        let dispatcher = Arc::new(StdMutex::new(EventDispatcher::new()));

        let ctx = SessionCtx {
            transport,
            dispatcher: Arc::clone(&dispatcher),
            shared: Arc::clone(&state),
            config: config.clone(),
            open_id: None,
            room: None,
            pending_join: None,
            advertised: false,
            nearby: HashMap::new(),
        };
        let task = tokio::spawn(session_loop(ctx, cmd_rx, shutdown_rx));

        Self {
            cmd_tx,
            state,
            dispatcher,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
            holds_guard: false,
        }
    }

    // ── Event subscriptions ─────────────────────────────────────────

    /// Register `handler` for `kind`, replacing any previous handler
    /// (last-write-wins). Handlers run on the session loop's task.
    pub fn on(&self, kind: EventKind, handler: impl FnMut(SessionEvent) + Send + 'static) {
        self.lock_dispatcher().on(kind, Box::new(handler));
    }

    /// Clear the handler slot for `kind`.
    pub fn off(&self, kind: EventKind) {
        self.lock_dispatcher().off(kind);
    }

    // ── Lifecycle operations ────────────────────────────────────────

    /// Establish the local identity and activate the session.
    ///
    /// Completion fires on the [`EventKind::Init`] slot.
    ///
    /// # Errors
    ///
    /// Returns [`NearbyError::AlreadyInitialized`] if the session is active,
    /// [`NearbyError::NotInitialized`] if it was destroyed, and
    /// [`NearbyError::NotConnected`] if the session loop has exited.
    pub fn init(&self, open_id: impl Into<String>) -> Result<()> {
        match self.state.lifecycle.compare_exchange(
            LIFECYCLE_UNINITIALIZED,
            LIFECYCLE_ACTIVE,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(LIFECYCLE_ACTIVE) => return Err(NearbyError::AlreadyInitialized),
            Err(_) => return Err(NearbyError::NotInitialized),
        }
        self.send(Command::Init {
            open_id: open_id.into(),
        })
    }

    /// Tear the session down: leave (or dismiss) any current room, fire the
    /// [`EventKind::Destroy`] completion, then clear every event
    /// subscription. Idempotent — a second call is a no-op that still fires
    /// the completion with success.
    ///
    /// # Errors
    ///
    /// Returns [`NearbyError::NotConnected`] if the session loop has exited.
    pub fn destroy(&self) -> Result<()> {
        self.state
            .lifecycle
            .store(LIFECYCLE_DESTROYED, Ordering::Release);
        self.send(Command::Destroy)
    }

    // ── Room operations ─────────────────────────────────────────────

    /// Create a room with the caller as owner and sole member.
    ///
    /// Completion fires on [`EventKind::CreateRoom`] with the room snapshot.
    ///
    /// # Errors
    ///
    /// Inline: [`NearbyError::NotInitialized`],
    /// [`NearbyError::InvalidRoomName`], [`NearbyError::InvalidCapacity`],
    /// [`NearbyError::PropertiesTooLarge`], [`NearbyError::NotConnected`].
    pub fn create_room(&self, params: CreateRoomParams) -> Result<()> {
        self.require_active()?;
        if !room_name_is_valid(&params.room_name) {
            return Err(NearbyError::InvalidRoomName(params.room_name));
        }
        if !capacity_is_valid(params.min_player_num, params.max_player_num) {
            return Err(NearbyError::InvalidCapacity {
                min: params.min_player_num,
                max: params.max_player_num,
            });
        }
        if params.custom_properties.validate().is_err() {
            return Err(NearbyError::PropertiesTooLarge(
                params.custom_properties.wire_len(),
            ));
        }
        self.send(Command::CreateRoom(params))
    }

    /// Ask the owner of a room to admit this device.
    ///
    /// The room id comes from the nearby list for public rooms, or out of
    /// band for private ones; without a live advert the request is
    /// broadcast and only the owning device answers.
    ///
    /// Completion fires on [`EventKind::JoinRoom`].
    ///
    /// # Errors
    ///
    /// Inline: [`NearbyError::NotInitialized`],
    /// [`NearbyError::InvalidRoomId`], [`NearbyError::NotConnected`].
    pub fn join_room(&self, room_id: impl Into<String>) -> Result<()> {
        self.require_active()?;
        let room_id = room_id.into();
        if !room_id_is_valid(&room_id) {
            return Err(NearbyError::InvalidRoomId(room_id));
        }
        self.send(Command::JoinRoom { room_id })
    }

    /// Leave the named room; dismisses it if this device is the owner.
    ///
    /// Completion fires on [`EventKind::LeaveRoom`].
    ///
    /// # Errors
    ///
    /// Inline: [`NearbyError::NotInitialized`],
    /// [`NearbyError::InvalidRoomId`], [`NearbyError::NotConnected`].
    pub fn leave_room(&self, room_id: impl Into<String>) -> Result<()> {
        self.require_active()?;
        let room_id = room_id.into();
        if !room_id_is_valid(&room_id) {
            return Err(NearbyError::InvalidRoomId(room_id));
        }
        self.send(Command::LeaveRoom { room_id })
    }

    /// Fetch the local snapshot of the named room.
    ///
    /// Completion fires on [`EventKind::GetRoom`]. The owner's copy is
    /// authoritative; a member's copy is the mirror maintained from
    /// notifications.
    ///
    /// # Errors
    ///
    /// Inline: [`NearbyError::NotInitialized`],
    /// [`NearbyError::InvalidRoomId`], [`NearbyError::NotConnected`].
    pub fn get_room(&self, room_id: impl Into<String>) -> Result<()> {
        self.require_active()?;
        let room_id = room_id.into();
        if !room_id_is_valid(&room_id) {
            return Err(NearbyError::InvalidRoomId(room_id));
        }
        self.send(Command::GetRoom { room_id })
    }

    /// Owner only: start or end the game.
    ///
    /// Completion fires on [`EventKind::UpdateRoom`]; every member (the owner
    /// included) additionally receives [`EventKind::UpdateRoomNotify`].
    ///
    /// # Errors
    ///
    /// Inline: [`NearbyError::NotInitialized`], [`NearbyError::NotConnected`].
    pub fn update_room(&self, action: RoomAction) -> Result<()> {
        self.require_active()?;
        self.send(Command::UpdateRoom { action })
    }

    /// Toggle this device's readiness.
    ///
    /// Completion fires on [`EventKind::UpdatePlayer`]; every member receives
    /// [`EventKind::UpdatePlayerNotify`] once the owner applies the change.
    ///
    /// # Errors
    ///
    /// Inline: [`NearbyError::NotInitialized`], [`NearbyError::NotConnected`].
    pub fn update_player(&self, action: PlayerAction) -> Result<()> {
        self.require_active()?;
        self.send(Command::UpdatePlayer { action })
    }

    // ── Messaging operations ────────────────────────────────────────

    /// Relay an application payload to the room owner.
    ///
    /// The self-echo completion fires on [`EventKind::SendToMaster`] once the
    /// send attempt finishes; this is a best-effort "sent" acknowledgment,
    /// not a delivery receipt.
    ///
    /// # Errors
    ///
    /// Inline: [`NearbyError::NotInitialized`],
    /// [`NearbyError::PayloadTooLarge`], [`NearbyError::NotConnected`].
    pub fn send_to_master(&self, message: impl Into<String>) -> Result<()> {
        self.require_active()?;
        let message = message.into();
        self.check_message_len(&message)?;
        self.send(Command::SendToMaster { message })
    }

    /// Owner only: relay an application payload to the named members, or to
    /// every member except the owner when `open_ids` is `None`.
    ///
    /// The self-echo completion fires on [`EventKind::SendToPlayer`].
    ///
    /// # Errors
    ///
    /// Inline: [`NearbyError::NotInitialized`],
    /// [`NearbyError::PayloadTooLarge`],
    /// [`NearbyError::TooManyRecipients`], [`NearbyError::NotConnected`].
    pub fn send_to_player(
        &self,
        message: impl Into<String>,
        open_ids: Option<Vec<String>>,
    ) -> Result<()> {
        self.require_active()?;
        let message = message.into();
        self.check_message_len(&message)?;
        if let Some(ids) = &open_ids {
            if ids.len() > usize::from(MAX_PLAYERS) {
                return Err(NearbyError::TooManyRecipients(ids.len()));
            }
        }
        self.send(Command::SendToPlayer { message, open_ids })
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Whether the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Whether the session is active (initialized and not destroyed).
    pub fn is_active(&self) -> bool {
        self.state.lifecycle.load(Ordering::Acquire) == LIFECYCLE_ACTIVE
    }

    // ── Shutdown ────────────────────────────────────────────────────

    /// Shut the session loop down, closing the transport.
    ///
    /// Unlike [`destroy`](Self::destroy), which is part of the session state
    /// machine, this tears down the host-side resources (task, transport).
    pub async fn shutdown(&mut self) {
        debug!("NearbySession: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout; abort if it fails to exit so the
        // task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn require_active(&self) -> Result<()> {
        match self.state.lifecycle.load(Ordering::Acquire) {
            LIFECYCLE_ACTIVE => Ok(()),
            _ => Err(NearbyError::NotInitialized),
        }
    }

    fn check_message_len(&self, message: &str) -> Result<()> {
        let len = message.chars().count();
        if len > MAX_MESSAGE_LEN {
            return Err(NearbyError::PayloadTooLarge(len));
        }
        Ok(())
    }

    fn send(&self, cmd: Command) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(NearbyError::NotConnected);
        }
        self.cmd_tx
            .send(cmd)
            .map_err(|_| NearbyError::NotConnected)
    }

    fn lock_dispatcher(&self) -> std::sync::MutexGuard<'_, EventDispatcher> {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for NearbySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NearbySession")
            .field("connected", &self.is_connected())
            .field("active", &self.is_active())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for NearbySession {
    fn drop(&mut self) {
        // `Drop` is synchronous, so the only safe action is to abort the
        // spawned task; the graceful path needs an executor to drive
        // `transport.close()`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.holds_guard {
            MANAGER_LIVE.store(false, Ordering::Release);
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// A nearby room this device has discovered but not joined.
struct NearbyEntry {
    owner: String,
    summary: RoomSummary,
    seen: Instant,
}

/// An in-flight `join_room`, alive until accepted, rejected, or expired.
struct PendingJoin {
    room_id: String,
    /// Owner address resolved from the advert at request time; `None` when
    /// the request went out as a broadcast (no live advert for the room).
    owner: Option<String>,
    /// Past this instant the join fails on the next tick; covers a target
    /// that never answers.
    deadline: Instant,
}

/// All state owned by the session loop task.
struct SessionCtx<T: NearbyTransport> {
    transport: T,
    dispatcher: Arc<StdMutex<EventDispatcher>>,
    shared: Arc<SharedState>,
    config: SessionConfig,
    /// Local identity, set by `init`.
    open_id: Option<String>,
    /// The room this device owns or mirrors. Exclusive: at most one.
    room: Option<Room>,
    /// In-flight `join_room`, if any.
    pending_join: Option<PendingJoin>,
    /// Whether the last discovery state we broadcast was "joinable".
    advertised: bool,
    /// Discoverable nearby rooms, keyed by room id.
    nearby: HashMap<String, NearbyEntry>,
}

/// Background loop multiplexing commands, transport events, and the
/// discovery tick.
///
/// Exits when the command channel closes (handle dropped), the transport
/// returns `None`, or the shutdown signal fires.
async fn session_loop<T: NearbyTransport>(
    mut ctx: SessionCtx<T>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!("session loop started");

    // Synthetic Connected before entering the loop; the adapter reports only
    // changes from here on.
    ctx.emit(SessionEvent::ConnectionChanged {
        status: ConnectionStatus::Connected,
        reason: "transport attached".to_string(),
    });

    let mut tick = tokio::time::interval(ctx.config.advert_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => ctx.handle_command(cmd).await,
                    // Handle dropped.
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        ctx.teardown("session handle dropped").await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                ctx.teardown("session shut down").await;
                break;
            }

            incoming = ctx.transport.recv() => {
                match incoming {
                    Some(Ok(event)) => ctx.handle_transport_event(event).await,
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        ctx.disconnected(format!("transport receive error: {e}"));
                        break;
                    }
                    None => {
                        debug!("transport closed");
                        ctx.disconnected("transport closed".to_string());
                        break;
                    }
                }
            }

            _ = tick.tick() => {
                ctx.discovery_tick().await;
            }
        }
    }

    debug!("session loop exited");
}

impl<T: NearbyTransport> SessionCtx<T> {
    // ── Event emission ──────────────────────────────────────────────

    fn emit(&self, event: SessionEvent) {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(event);
    }

    fn emit_ok(&self, build: impl FnOnce(i32, String) -> SessionEvent) {
        let (code, reason) = ok();
        self.emit(build(code, reason));
    }

    fn emit_fail(
        &self,
        code: ErrorCode,
        build: impl FnOnce(i32, String) -> SessionEvent,
    ) {
        let (code, reason) = fail(code);
        self.emit(build(code, reason));
    }

    fn disconnected(&mut self, reason: String) {
        self.shared.connected.store(false, Ordering::Release);
        self.nearby.clear();
        self.emit(SessionEvent::ConnectionChanged {
            status: ConnectionStatus::Disconnected,
            reason,
        });
    }

    // ── Wire helpers ────────────────────────────────────────────────

    async fn send_frame(&mut self, peer: &str, frame: &WireMessage) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        self.transport.send_to(peer, json).await
    }

    /// Send a batch of planned deliveries, logging (not failing on) per-peer
    /// errors; membership repair happens via `PeerLost`.
    async fn send_all(&mut self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            if let Err(e) = self.send_frame(&delivery.peer, &delivery.frame).await {
                warn!(peer = %delivery.peer, "notify delivery failed: {e}");
            }
        }
    }

    async fn broadcast_frame(&mut self, frame: &WireMessage) {
        match serde_json::to_string(frame) {
            Ok(json) => {
                if let Err(e) = self.transport.broadcast(json).await {
                    warn!("broadcast failed: {e}");
                }
            }
            Err(e) => error!("failed to serialize broadcast frame: {e}"),
        }
    }

    // ── Discovery ───────────────────────────────────────────────────

    /// Broadcast the advert or advert-stop matching the room's current
    /// joinability, deduplicating repeats of the stop.
    async fn sync_advert(&mut self) {
        let Some(room) = &self.room else {
            if self.advertised {
                // Room is gone entirely; the dismiss path sent the stop.
                self.advertised = false;
            }
            return;
        };
        if room.is_joinable() {
            let frame = WireMessage::RoomAdvert {
                owner: room.owner_id.clone(),
                summary: room.summary(),
            };
            self.advertised = true;
            self.broadcast_frame(&frame).await;
        } else if self.advertised {
            let frame = WireMessage::RoomAdvertStop {
                room_id: room.room_id.clone(),
            };
            self.advertised = false;
            self.broadcast_frame(&frame).await;
        }
    }

    async fn discovery_tick(&mut self) {
        self.expire_pending_join();
        let owns_room = self
            .room
            .as_ref()
            .zip(self.open_id.as_ref())
            .is_some_and(|(room, id)| room.is_owner(id));
        if owns_room {
            self.sync_advert().await;
            return;
        }
        if self.room.is_none() {
            let ttl = self.config.advert_ttl;
            let before = self.nearby.len();
            self.nearby.retain(|_, entry| entry.seen.elapsed() < ttl);
            if self.nearby.len() != before {
                self.emit_nearby_list();
            }
        }
    }

    /// Fail a pending join whose target never answered.
    fn expire_pending_join(&mut self) {
        let expired = self
            .pending_join
            .as_ref()
            .is_some_and(|pending| Instant::now() >= pending.deadline);
        if expired {
            if let Some(pending) = self.pending_join.take() {
                debug!(room_id = %pending.room_id, "join request expired unanswered");
                self.emit_fail(ErrorCode::RoomNotFound, |code, reason| {
                    SessionEvent::JoinRoom {
                        room_id: pending.room_id,
                        code,
                        reason,
                    }
                });
            }
        }
    }

    fn emit_nearby_list(&self) {
        let mut rooms: Vec<RoomSummary> = self
            .nearby
            .values()
            .map(|entry| entry.summary.clone())
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms.truncate(self.config.max_nearby_rooms);
        self.emit(SessionEvent::NearbyRoomList { rooms });
    }

    /// Allocate a room id not currently discoverable nearby.
    fn alloc_room_id(&self) -> String {
        loop {
            let id: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(MAX_ROOM_ID_LEN)
                .map(char::from)
                .collect();
            if !self.nearby.contains_key(&id) {
                return id;
            }
        }
    }

    // ── Command handling ────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Init { open_id } => {
                debug!(%open_id, "session initialized");
                self.open_id = Some(open_id);
                self.emit_ok(|code, reason| SessionEvent::Init { code, reason });
            }
            Command::Destroy => self.handle_destroy().await,
            Command::CreateRoom(params) => self.handle_create_room(params).await,
            Command::JoinRoom { room_id } => self.handle_join_room(room_id).await,
            Command::LeaveRoom { room_id } => self.handle_leave_room(room_id).await,
            Command::GetRoom { room_id } => self.handle_get_room(room_id),
            Command::UpdateRoom { action } => self.handle_update_room(action).await,
            Command::UpdatePlayer { action } => self.handle_update_player(action).await,
            Command::SendToMaster { message } => self.handle_send_to_master(message).await,
            Command::SendToPlayer { message, open_ids } => {
                self.handle_send_to_player(message, open_ids).await;
            }
        }
    }

    async fn handle_destroy(&mut self) {
        if let Some(room_id) = self.room.as_ref().map(|r| r.room_id.clone()) {
            self.leave_current_room(&room_id, true).await;
        }
        self.pending_join = None;
        self.nearby.clear();
        self.emit_ok(|code, reason| SessionEvent::Destroy { code, reason });
        // Subscriptions die with the session; a later destroy still fires
        // the completion above, into an empty registry.
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("session destroyed");
    }

    async fn handle_create_room(&mut self, params: CreateRoomParams) {
        let Some(open_id) = self.open_id.clone() else {
            return self.emit_fail(ErrorCode::NotInitialized, |code, reason| {
                SessionEvent::CreateRoom { room: None, code, reason }
            });
        };
        if self.room.is_some() {
            return self.emit_fail(ErrorCode::AlreadyInRoom, |code, reason| {
                SessionEvent::CreateRoom { room: None, code, reason }
            });
        }
        if self.pending_join.is_some() {
            // An acceptance may be in flight; owning a room at the same time
            // would leave two rooms claiming this device.
            return self.emit_fail(ErrorCode::InvalidState, |code, reason| {
                SessionEvent::CreateRoom { room: None, code, reason }
            });
        }
        let room_id = self.alloc_room_id();
        let room = match Room::create(
            room_id,
            params.room_name,
            params.min_player_num,
            params.max_player_num,
            params.room_type,
            params.custom_properties,
            open_id,
        ) {
            Ok(room) => room,
            Err(code) => {
                return self.emit_fail(code, |code, reason| SessionEvent::CreateRoom {
                    room: None,
                    code,
                    reason,
                });
            }
        };
        debug!(room_id = %room.room_id, "room created");
        let snapshot = room.clone();
        self.room = Some(room);
        // In a room now; stop tracking nearby adverts.
        self.nearby.clear();
        self.sync_advert().await;
        self.emit_ok(|code, reason| SessionEvent::CreateRoom {
            room: Some(snapshot),
            code,
            reason,
        });
    }

    async fn handle_join_room(&mut self, room_id: String) {
        let Some(open_id) = self.open_id.clone() else {
            return self.emit_fail(ErrorCode::NotInitialized, |code, reason| {
                SessionEvent::JoinRoom { room_id, code, reason }
            });
        };
        if self.room.is_some() {
            return self.emit_fail(ErrorCode::AlreadyInRoom, |code, reason| {
                SessionEvent::JoinRoom { room_id, code, reason }
            });
        }
        if self.pending_join.is_some() {
            return self.emit_fail(ErrorCode::InvalidState, |code, reason| {
                SessionEvent::JoinRoom { room_id, code, reason }
            });
        }
        let frame = WireMessage::JoinRequest {
            room_id: room_id.clone(),
            open_id,
        };
        // A live advert gives the owner's address; without one (private room,
        // advert expired) the request goes out as a broadcast and only the
        // owning device answers.
        let owner = self.nearby.get(&room_id).map(|e| e.owner.clone());
        let sent = match &owner {
            Some(owner) => self.send_frame(owner, &frame).await,
            None => {
                self.broadcast_frame(&frame).await;
                Ok(())
            }
        };
        match sent {
            Ok(()) => {
                debug!(%room_id, ?owner, "join request sent");
                self.pending_join = Some(PendingJoin {
                    room_id,
                    owner,
                    deadline: Instant::now() + self.config.advert_ttl,
                });
            }
            Err(e) => {
                warn!("join request failed: {e}");
                self.emit_fail(ErrorCode::SendFailed, |code, reason| {
                    SessionEvent::JoinRoom { room_id, code, reason }
                });
            }
        }
    }

    async fn handle_leave_room(&mut self, room_id: String) {
        let is_current = self
            .room
            .as_ref()
            .is_some_and(|room| room.room_id == room_id);
        if !is_current {
            return self.emit_fail(ErrorCode::NotMember, |code, reason| {
                SessionEvent::LeaveRoom { room_id, code, reason }
            });
        }
        self.leave_current_room(&room_id, false).await;
        self.emit_ok(|code, reason| SessionEvent::LeaveRoom {
            room_id,
            code,
            reason,
        });
    }

    /// Shared leave path for `leave_room` and `destroy`. Owner: dismiss the
    /// room and notify every former member. Member: notify the owner.
    async fn leave_current_room(&mut self, room_id: &str, during_destroy: bool) {
        let Some(room) = self.room.take() else { return };
        let Some(open_id) = self.open_id.clone() else { return };

        if room.is_owner(&open_id) {
            let frame = WireMessage::DismissNotify {
                room_id: room_id.to_string(),
                open_id: open_id.clone(),
            };
            let deliveries = relay::fan_out(&room, &open_id, &frame);
            self.send_all(deliveries).await;
            if self.advertised {
                let stop = WireMessage::RoomAdvertStop {
                    room_id: room_id.to_string(),
                };
                self.advertised = false;
                self.broadcast_frame(&stop).await;
            }
            debug!(%room_id, "room dismissed");
        } else {
            let frame = WireMessage::LeaveRequest {
                room_id: room_id.to_string(),
                open_id: open_id.clone(),
            };
            if let Err(e) = self.send_frame(&room.owner_id, &frame).await {
                // Still left locally; the owner will see a PeerLost instead.
                warn!("leave request failed: {e}");
            }
            debug!(%room_id, during_destroy, "left room");
        }
    }

    fn handle_get_room(&mut self, room_id: String) {
        match self.room.as_ref().filter(|room| room.room_id == room_id) {
            Some(room) => {
                let snapshot = room.clone();
                self.emit_ok(|code, reason| SessionEvent::GetRoom {
                    room: Some(snapshot),
                    code,
                    reason,
                });
            }
            None => self.emit_fail(ErrorCode::RoomNotFound, |code, reason| {
                SessionEvent::GetRoom { room: None, code, reason }
            }),
        }
    }

    async fn handle_update_room(&mut self, action: RoomAction) {
        let Some(open_id) = self.open_id.clone() else {
            return self.emit_fail(ErrorCode::NotInitialized, |code, reason| {
                SessionEvent::UpdateRoom { room_id: String::new(), code, reason }
            });
        };
        let Some(room) = self.room.as_mut() else {
            return self.emit_fail(ErrorCode::NotMember, |code, reason| {
                SessionEvent::UpdateRoom { room_id: String::new(), code, reason }
            });
        };
        let room_id = room.room_id.clone();
        if !room.is_owner(&open_id) {
            return self.emit_fail(ErrorCode::NotOwner, |code, reason| {
                SessionEvent::UpdateRoom { room_id, code, reason }
            });
        }
        let result = match action {
            RoomAction::Start => room.start_game(),
            RoomAction::End => room.end_game(),
        };
        match result {
            Ok(()) => {
                let status = room.status;
                let notify = WireMessage::UpdateRoomNotify {
                    room_id: room_id.clone(),
                    open_id: open_id.clone(),
                    status,
                };
                let deliveries = relay::fan_out(room, &open_id, &notify);
                self.send_all(deliveries).await;
                self.sync_advert().await;
                self.emit_ok(|code, reason| SessionEvent::UpdateRoom {
                    room_id: room_id.clone(),
                    code,
                    reason,
                });
                self.emit(SessionEvent::UpdateRoomNotify {
                    room_id,
                    open_id,
                    status,
                });
            }
            Err(code) => self.emit_fail(code, |code, reason| SessionEvent::UpdateRoom {
                room_id,
                code,
                reason,
            }),
        }
    }

    async fn handle_update_player(&mut self, action: PlayerAction) {
        let Some(open_id) = self.open_id.clone() else {
            return self.emit_fail(ErrorCode::NotInitialized, |code, reason| {
                SessionEvent::UpdatePlayer { room_id: String::new(), code, reason }
            });
        };
        let Some(room) = self.room.as_mut() else {
            return self.emit_fail(ErrorCode::NotMember, |code, reason| {
                SessionEvent::UpdatePlayer { room_id: String::new(), code, reason }
            });
        };
        let room_id = room.room_id.clone();

        if room.is_owner(&open_id) {
            match room.apply_player_action(&open_id, action) {
                Ok(status) => {
                    let notify = WireMessage::UpdatePlayerNotify {
                        room_id: room_id.clone(),
                        open_id: open_id.clone(),
                        status,
                    };
                    let deliveries = relay::fan_out(room, &open_id, &notify);
                    self.send_all(deliveries).await;
                    self.emit_ok(|code, reason| SessionEvent::UpdatePlayer {
                        room_id: room_id.clone(),
                        code,
                        reason,
                    });
                    self.emit(SessionEvent::UpdatePlayerNotify {
                        room_id,
                        open_id,
                        status,
                    });
                }
                Err(code) => self.emit_fail(code, |code, reason| SessionEvent::UpdatePlayer {
                    room_id,
                    code,
                    reason,
                }),
            }
            return;
        }

        // Member path: validate against the mirror, then ask the owner; the
        // authoritative change comes back as an UpdatePlayerNotify.
        if room.status != RoomStatus::Idle {
            return self.emit_fail(ErrorCode::InvalidState, |code, reason| {
                SessionEvent::UpdatePlayer { room_id, code, reason }
            });
        }
        let owner = room.owner_id.clone();
        let frame = WireMessage::UpdatePlayerRequest {
            room_id: room_id.clone(),
            open_id,
            action,
        };
        match self.send_frame(&owner, &frame).await {
            Ok(()) => self.emit_ok(|code, reason| SessionEvent::UpdatePlayer {
                room_id,
                code,
                reason,
            }),
            Err(e) => {
                warn!("update player request failed: {e}");
                self.emit_fail(ErrorCode::SendFailed, |code, reason| {
                    SessionEvent::UpdatePlayer { room_id, code, reason }
                });
            }
        }
    }

    async fn handle_send_to_master(&mut self, message: String) {
        let Some(open_id) = self.open_id.clone() else {
            return self.emit_fail(ErrorCode::NotInitialized, |code, reason| {
                SessionEvent::SendToMaster { room_id: String::new(), code, reason }
            });
        };
        let Some(room) = self.room.as_ref() else {
            return self.emit_fail(ErrorCode::NotMember, |code, reason| {
                SessionEvent::SendToMaster { room_id: String::new(), code, reason }
            });
        };
        let room_id = room.room_id.clone();
        match relay::plan_to_master(room, &open_id, &message) {
            Ok(ToMasterPlan::Local) => {
                self.emit(SessionEvent::ReceiveFromPlayer {
                    room_id: room_id.clone(),
                    open_id,
                    message,
                });
                self.emit_ok(|code, reason| SessionEvent::SendToMaster {
                    room_id,
                    code,
                    reason,
                });
            }
            Ok(ToMasterPlan::Forward(delivery)) => {
                match self.send_frame(&delivery.peer, &delivery.frame).await {
                    Ok(()) => self.emit_ok(|code, reason| SessionEvent::SendToMaster {
                        room_id,
                        code,
                        reason,
                    }),
                    Err(e) => {
                        warn!("relay to master failed: {e}");
                        self.emit_fail(
                            ErrorCode::SendFailed,
                            |code, reason| SessionEvent::SendToMaster { room_id, code, reason },
                        );
                    }
                }
            }
            Err(code) => self.emit_fail(code, |code, reason| SessionEvent::SendToMaster {
                room_id,
                code,
                reason,
            }),
        }
    }

    async fn handle_send_to_player(&mut self, message: String, open_ids: Option<Vec<String>>) {
        let Some(open_id) = self.open_id.clone() else {
            return self.emit_fail(ErrorCode::NotInitialized, |code, reason| {
                SessionEvent::SendToPlayer { room_id: String::new(), code, reason }
            });
        };
        let Some(room) = self.room.as_ref() else {
            return self.emit_fail(ErrorCode::NotMember, |code, reason| {
                SessionEvent::SendToPlayer { room_id: String::new(), code, reason }
            });
        };
        let room_id = room.room_id.clone();
        match relay::plan_from_master(room, &open_id, &message, open_ids.as_deref()) {
            Ok(deliveries) => {
                let mut failed = false;
                for delivery in deliveries {
                    if let Err(e) = self.send_frame(&delivery.peer, &delivery.frame).await {
                        warn!(peer = %delivery.peer, "relay to player failed: {e}");
                        failed = true;
                    }
                }
                if failed {
                    self.emit_fail(ErrorCode::SendFailed, |code, reason| {
                        SessionEvent::SendToPlayer { room_id, code, reason }
                    });
                } else {
                    self.emit_ok(|code, reason| SessionEvent::SendToPlayer {
                        room_id,
                        code,
                        reason,
                    });
                }
            }
            Err(code) => self.emit_fail(code, |code, reason| SessionEvent::SendToPlayer {
                room_id,
                code,
                reason,
            }),
        }
    }

    // ── Transport event handling ────────────────────────────────────

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame { from, payload } => {
                match serde_json::from_str::<WireMessage>(&payload) {
                    Ok(frame) => self.handle_frame(from, frame).await,
                    Err(e) => {
                        warn!(%from, "failed to deserialize frame: {e} — raw: {payload}");
                    }
                }
            }
            TransportEvent::PeerLost { peer } => self.handle_peer_lost(peer).await,
            TransportEvent::Connectivity { status, reason } => {
                self.shared
                    .connected
                    .store(status == ConnectionStatus::Connected, Ordering::Release);
                if status == ConnectionStatus::Disconnected {
                    self.nearby.clear();
                }
                self.emit(SessionEvent::ConnectionChanged { status, reason });
            }
        }
    }

    async fn handle_frame(&mut self, from: String, frame: WireMessage) {
        match frame {
            WireMessage::RoomAdvert { owner, summary } => self.on_room_advert(owner, summary),
            WireMessage::RoomAdvertStop { room_id } => self.on_room_advert_stop(&room_id),
            WireMessage::JoinRequest { room_id, open_id } => {
                self.on_join_request(from, room_id, open_id).await;
            }
            WireMessage::JoinAccepted { room } => self.on_join_accepted(*room),
            WireMessage::JoinRejected {
                room_id,
                code,
                reason,
            } => {
                let matches_pending = self
                    .pending_join
                    .as_ref()
                    .is_some_and(|pending| pending.room_id == room_id);
                if matches_pending {
                    self.pending_join = None;
                    self.emit(SessionEvent::JoinRoom {
                        room_id,
                        code: code.code(),
                        reason,
                    });
                }
            }
            WireMessage::JoinNotify { room_id, open_id } => {
                if let Some(room) = self
                    .room
                    .as_mut()
                    .filter(|room| room.room_id == room_id)
                {
                    room.apply_join(&open_id);
                    self.emit(SessionEvent::JoinRoomNotify { room_id, open_id });
                }
            }
            WireMessage::LeaveRequest { room_id, open_id } => {
                self.on_leave_request(room_id, open_id).await;
            }
            WireMessage::LeaveNotify {
                room_id,
                open_id,
                leave_type,
            } => {
                if let Some(room) = self
                    .room
                    .as_mut()
                    .filter(|room| room.room_id == room_id)
                {
                    room.apply_leave(&open_id);
                    self.emit(SessionEvent::LeaveRoomNotify {
                        room_id,
                        open_id,
                        leave_type,
                    });
                }
            }
            WireMessage::DismissNotify { room_id, open_id } => {
                if self
                    .room
                    .as_ref()
                    .is_some_and(|room| room.room_id == room_id)
                {
                    self.room = None;
                    self.emit(SessionEvent::DismissRoomNotify { room_id, open_id });
                }
            }
            WireMessage::UpdatePlayerRequest {
                room_id,
                open_id,
                action,
            } => {
                self.on_update_player_request(room_id, open_id, action).await;
            }
            WireMessage::UpdateRejected {
                room_id: _,
                code,
                reason,
            } => {
                self.emit(SessionEvent::Error {
                    code: code.code(),
                    reason,
                });
            }
            WireMessage::UpdatePlayerNotify {
                room_id,
                open_id,
                status,
            } => {
                if let Some(room) = self
                    .room
                    .as_mut()
                    .filter(|room| room.room_id == room_id)
                {
                    room.apply_player_status(&open_id, status);
                    self.emit(SessionEvent::UpdatePlayerNotify {
                        room_id,
                        open_id,
                        status,
                    });
                }
            }
            WireMessage::UpdateRoomNotify {
                room_id,
                open_id,
                status,
            } => {
                if let Some(room) = self
                    .room
                    .as_mut()
                    .filter(|room| room.room_id == room_id)
                {
                    room.apply_room_status(status);
                    self.emit(SessionEvent::UpdateRoomNotify {
                        room_id,
                        open_id,
                        status,
                    });
                }
            }
            WireMessage::ToMaster {
                room_id,
                open_id,
                message,
            } => {
                let is_owner_of = self
                    .room
                    .as_ref()
                    .zip(self.open_id.as_ref())
                    .is_some_and(|(room, id)| {
                        room.room_id == room_id && room.is_owner(id) && room.is_member(&open_id)
                    });
                if is_owner_of {
                    self.emit(SessionEvent::ReceiveFromPlayer {
                        room_id,
                        open_id,
                        message,
                    });
                } else {
                    debug!(%open_id, "dropping relayed payload for a room we do not own");
                }
            }
            WireMessage::FromMaster {
                room_id,
                open_id,
                message,
            } => {
                if self
                    .room
                    .as_ref()
                    .is_some_and(|room| room.room_id == room_id && room.is_owner(&open_id))
                {
                    self.emit(SessionEvent::ReceiveFromMaster {
                        room_id,
                        open_id,
                        message,
                    });
                }
            }
        }
    }

    fn on_room_advert(&mut self, owner: String, summary: RoomSummary) {
        // Devices in a room ignore discovery traffic.
        if self.room.is_some() {
            return;
        }
        let room_id = summary.room_id.clone();
        let changed = match self.nearby.get(&room_id) {
            Some(entry) => entry.owner != owner || entry.summary != summary,
            None => true,
        };
        self.nearby.insert(
            room_id,
            NearbyEntry {
                owner,
                summary,
                seen: Instant::now(),
            },
        );
        if changed {
            self.emit_nearby_list();
        }
    }

    fn on_room_advert_stop(&mut self, room_id: &str) {
        if self.room.is_none() && self.nearby.remove(room_id).is_some() {
            self.emit_nearby_list();
        }
    }

    async fn on_join_request(&mut self, from: String, room_id: String, open_id: String) {
        let owns_room = self
            .room
            .as_ref()
            .zip(self.open_id.as_ref())
            .is_some_and(|(room, id)| room.room_id == room_id && room.is_owner(id));
        if !owns_room {
            // Join requests may arrive as broadcasts; only the owning device
            // answers. The joiner's deadline covers a room nobody owns.
            debug!(%room_id, "ignoring join request for a room we do not own");
            return;
        }
        // `owns_room` guarantees both are present.
        let Some(room) = self.room.as_mut() else { return };
        let Some(owner_id) = self.open_id.clone() else { return };

        match room.admit(open_id.clone()) {
            Ok(_) => {
                let accept = WireMessage::JoinAccepted {
                    room: Box::new(room.clone()),
                };
                let notify = WireMessage::JoinNotify {
                    room_id: room_id.clone(),
                    open_id: open_id.clone(),
                };
                let deliveries = relay::fan_out(room, &owner_id, &notify);
                debug!(%room_id, joiner = %open_id, "player admitted");
                if let Err(e) = self.send_frame(&from, &accept).await {
                    warn!("join acceptance failed: {e}");
                }
                self.send_all(deliveries).await;
                self.emit(SessionEvent::JoinRoomNotify { room_id, open_id });
                self.sync_advert().await;
            }
            Err(code) => {
                let reject = WireMessage::JoinRejected {
                    room_id,
                    code,
                    reason: code.description().to_string(),
                };
                if let Err(e) = self.send_frame(&from, &reject).await {
                    warn!("join rejection failed: {e}");
                }
            }
        }
    }

    fn on_join_accepted(&mut self, room: Room) {
        let matches_pending = self
            .pending_join
            .as_ref()
            .is_some_and(|pending| pending.room_id == room.room_id);
        if !matches_pending || self.room.is_some() {
            debug!(room_id = %room.room_id, "unsolicited join acceptance ignored");
            return;
        }
        self.pending_join = None;
        let room_id = room.room_id.clone();
        self.room = Some(room);
        self.nearby.clear();
        self.emit_ok(|code, reason| SessionEvent::JoinRoom {
            room_id,
            code,
            reason,
        });
    }

    async fn on_leave_request(&mut self, room_id: String, open_id: String) {
        self.member_departed(&room_id, &open_id, LeaveType::Active)
            .await;
    }

    /// Owner side of a member's readiness request: apply and broadcast, or
    /// send a targeted rejection back.
    async fn on_update_player_request(
        &mut self,
        room_id: String,
        open_id: String,
        action: PlayerAction,
    ) {
        let owns_room = self
            .room
            .as_ref()
            .zip(self.open_id.as_ref())
            .is_some_and(|(room, id)| room.room_id == room_id && room.is_owner(id));
        if !owns_room {
            debug!(%room_id, "ignoring readiness request for a room we do not own");
            return;
        }
        let Some(room) = self.room.as_mut() else { return };
        let Some(owner_id) = self.open_id.clone() else { return };

        match room.apply_player_action(&open_id, action) {
            Ok(status) => {
                let notify = WireMessage::UpdatePlayerNotify {
                    room_id: room_id.clone(),
                    open_id: open_id.clone(),
                    status,
                };
                let deliveries = relay::fan_out(room, &owner_id, &notify);
                self.send_all(deliveries).await;
                self.emit(SessionEvent::UpdatePlayerNotify {
                    room_id,
                    open_id,
                    status,
                });
            }
            Err(code) => {
                // Stale mirror race (e.g. the game started while the request
                // was in flight); refuse just this requester.
                let reject = WireMessage::UpdateRejected {
                    room_id,
                    code,
                    reason: code.description().to_string(),
                };
                if let Err(e) = self.send_frame(&open_id, &reject).await {
                    warn!("readiness rejection failed: {e}");
                }
            }
        }
    }

    async fn handle_peer_lost(&mut self, peer: String) {
        // Stale adverts from the lost peer.
        if self.room.is_none() {
            let before = self.nearby.len();
            self.nearby.retain(|_, entry| entry.owner != peer);
            if self.nearby.len() != before {
                self.emit_nearby_list();
            }
        }

        // Only the join's own target going away kills a pending join; an
        // unrelated peer dropping must not. Broadcast joins (unknown owner)
        // are bounded by the deadline instead.
        let target_lost = self
            .pending_join
            .as_ref()
            .is_some_and(|pending| pending.owner.as_deref() == Some(peer.as_str()));
        if target_lost {
            if let Some(pending) = self.pending_join.take() {
                self.emit_fail(ErrorCode::PeerUnreachable, |code, reason| {
                    SessionEvent::JoinRoom {
                        room_id: pending.room_id,
                        code,
                        reason,
                    }
                });
            }
        }

        let Some(room) = self.room.as_ref() else { return };
        let room_id = room.room_id.clone();
        let Some(open_id) = self.open_id.clone() else { return };

        if room.is_owner(&open_id) {
            if room.is_member(&peer) {
                self.member_departed(&room_id, &peer, LeaveType::Dropped)
                    .await;
            }
        } else if room.owner_id == peer {
            // Lost the owner: the room is gone from this device's view.
            self.room = None;
            self.emit(SessionEvent::DismissRoomNotify {
                room_id,
                open_id: peer,
            });
        }
        // A fellow member dropping is reported by the owner's LeaveNotify.
    }

    /// Owner-side removal of a member, shared by explicit leaves and drops.
    async fn member_departed(&mut self, room_id: &str, open_id: &str, leave_type: LeaveType) {
        let owns_room = self
            .room
            .as_ref()
            .zip(self.open_id.as_ref())
            .is_some_and(|(room, id)| room.room_id == room_id && room.is_owner(id));
        if !owns_room {
            return;
        }
        let Some(room) = self.room.as_mut() else { return };
        let Some(owner_id) = self.open_id.clone() else { return };

        if room.remove_member(open_id).is_err() {
            return;
        }
        debug!(%room_id, leaver = %open_id, ?leave_type, "member departed");
        let notify = WireMessage::LeaveNotify {
            room_id: room_id.to_string(),
            open_id: open_id.to_string(),
            leave_type,
        };
        let deliveries = relay::fan_out(room, &owner_id, &notify);
        self.send_all(deliveries).await;
        self.emit(SessionEvent::LeaveRoomNotify {
            room_id: room_id.to_string(),
            open_id: open_id.to_string(),
            leave_type,
        });
        // The departure may have reopened a seat.
        self.sync_advert().await;
    }

    // ── Teardown ────────────────────────────────────────────────────

    async fn teardown(&mut self, reason: &str) {
        if let Some(room_id) = self.room.as_ref().map(|r| r.room_id.clone()) {
            self.leave_current_room(&room_id, true).await;
        }
        if let Err(e) = self.transport.close().await {
            debug!("transport close failed: {e}");
        }
        self.disconnected(reason.to_string());
    }
}
