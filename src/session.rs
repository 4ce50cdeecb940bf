//! # Connection State
//!
//! Per-device mirror connection state.
//!
//! ```text
//! Disconnected ─▶ ServerStarting ─▶ StreamConnecting ─▶ Connected
//!       ▲               │                  │                │
//!       └───────────────┴──────────────────┴────────────────┘
//!                  failure / disconnect (always releases)
//! ```
//!
//! Resources live only in [`ConnectionState::Connected`], bundled in a
//! [`MirrorSession`], so a stream without a server (or the reverse) cannot be
//! stored. Transitional states carry nothing: the in-flight call holds the
//! partially acquired resources in a [`MirrorGuard`], whose destructor
//! releases them if the call is cancelled part way.

use std::fmt;
use std::time::Duration;

use crate::mirror::{MirrorServer, ServerHandle, VideoStream};

/// The server process and video stream of an open session, released together.
#[derive(Debug)]
pub struct MirrorSession {
    pub(crate) server: ServerHandle,
    pub(crate) stream: VideoStream,
}

impl MirrorSession {
    pub fn new(server: ServerHandle, stream: VideoStream) -> Self {
        Self { server, stream }
    }

    pub fn into_parts(self) -> (ServerHandle, VideoStream) {
        (self.server, self.stream)
    }
}

/// Connection state of one device.
#[derive(Debug, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    ServerStarting,
    StreamConnecting,
    Connected(MirrorSession),
}

impl ConnectionState {
    /// Data-free view of the state.
    pub fn phase(&self) -> ConnectionPhase {
        match self {
            Self::Disconnected => ConnectionPhase::Disconnected,
            Self::ServerStarting => ConnectionPhase::ServerStarting,
            Self::StreamConnecting => ConnectionPhase::StreamConnecting,
            Self::Connected(_) => ConnectionPhase::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Takes the session out, leaving `Disconnected` behind.
    pub fn take_session(&mut self) -> Option<MirrorSession> {
        match std::mem::take(self) {
            Self::Connected(session) => Some(session),
            _ => None,
        }
    }
}

/// Moves `state` to `next`, logging phase changes.
pub(crate) fn transition(serial: &str, state: &mut ConnectionState, next: ConnectionState) {
    let (from, to) = (state.phase(), next.phase());
    if from != to {
        log::debug!("[{}] {} -> {}", serial, from, to);
    }
    *state = next;
}

/// Mirror resources held by an in-flight call, together with the state that
/// call drives.
///
/// Finish with [`release`](Self::release) or [`commit`](Self::commit). If the
/// guard is dropped instead (an error path, or the caller's future being
/// cancelled), the state goes back to `Disconnected` and
/// [`MirrorServer::stop`] is scheduled on the runtime.
pub(crate) struct MirrorGuard<'a> {
    serial: &'a str,
    mirror: &'a MirrorServer,
    state: &'a mut ConnectionState,
    server: Option<ServerHandle>,
    stream: Option<VideoStream>,
    finished: bool,
}

impl<'a> MirrorGuard<'a> {
    /// Guard for a new setup; nothing is held yet.
    pub(crate) fn new(serial: &'a str, mirror: &'a MirrorServer, state: &'a mut ConnectionState) -> Self {
        Self {
            serial,
            mirror,
            state,
            server: None,
            stream: None,
            finished: false,
        }
    }

    /// Guard holding the open session taken out of `state`, if any.
    pub(crate) fn from_session(
        serial: &'a str,
        mirror: &'a MirrorServer,
        state: &'a mut ConnectionState,
    ) -> Self {
        let (server, stream) = match state.take_session() {
            Some(session) => {
                let (server, stream) = session.into_parts();
                (Some(server), Some(stream))
            }
            None => (None, None),
        };
        Self {
            serial,
            mirror,
            state,
            server,
            stream,
            finished: false,
        }
    }

    pub(crate) fn serial(&self) -> &str {
        self.serial
    }

    /// Pushes and launches the server, then waits for it to settle.
    ///
    /// The handle is held before the wait so a cancelled wait still kills it.
    pub(crate) async fn start(&mut self) -> bool {
        transition(self.serial, self.state, ConnectionState::ServerStarting);
        self.server = self.mirror.launch(self.serial).await;
        if self.server.is_none() {
            return false;
        }
        self.mirror.settle().await;
        true
    }

    /// Connects the video stream on the forwarded port.
    pub(crate) async fn connect(&mut self, timeout: Duration) -> bool {
        transition(self.serial, self.state, ConnectionState::StreamConnecting);
        self.stream = VideoStream::connect(self.mirror.port(), timeout).await;
        self.stream.is_some()
    }

    pub(crate) fn stream_mut(&mut self) -> Option<&mut VideoStream> {
        self.stream.as_mut()
    }

    /// Stores the server and stream as the open session.
    ///
    /// Returns `false` if either is missing; the guard then drops and tears
    /// down what it held.
    pub(crate) fn commit(mut self) -> bool {
        match (self.server.take(), self.stream.take()) {
            (Some(server), Some(stream)) => {
                let session = MirrorSession::new(server, stream);
                transition(self.serial, self.state, ConnectionState::Connected(session));
                self.finished = true;
                true
            }
            (server, stream) => {
                self.server = server;
                self.stream = stream;
                false
            }
        }
    }

    /// Releases everything held and leaves the state `Disconnected`.
    ///
    /// The forward removal is attempted even when nothing is held.
    pub(crate) async fn release(mut self) {
        let (server, stream) = (self.server.take(), self.stream.take());
        self.mirror.stop(self.serial, server, stream).await;
        transition(self.serial, self.state, ConnectionState::Disconnected);
        self.finished = true;
    }
}

impl Drop for MirrorGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        log::debug!("[{}] mirror call interrupted, releasing resources", self.serial);
        transition(self.serial, self.state, ConnectionState::Disconnected);
        self.mirror
            .stop_detached(self.serial, self.server.take(), self.stream.take());
    }
}

/// Copyable tag of a [`ConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    ServerStarting,
    StreamConnecting,
    Connected,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::ServerStarting => "server_starting",
            Self::StreamConnecting => "stream_connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}
