use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Events emitted by the core to UI shell listeners.
#[derive(Debug, Clone)]
pub enum KioskEvent {
    CallPhaseChanged(CallPhase),
    NavigateToSession(SessionRoute),
    RedirectRequested(String), // browser URL for legacy meeting clients
    SessionStateChanged(SessionState),
    SessionFailed(String), // user-facing message
    MediaStateChanged(MediaState),
    ParticipantJoined(Participant),
    ParticipantLeft(String), // participant id
    TileVideoStarted(String),
    TileVideoStopped(String),
}

/// Lifecycle of one call request, as driven by the status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Requesting,
    Ringing { call_id: String },
    Accepted { call_id: String },
    NoDoctor,
    Failed { message: String },
}

/// Lifecycle of one video session attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Resolving,
    Joining,
    Joined,
    Active,
    AudioBlocked,
    VideoBlocked,
    Leaving,
    Left,
}

/// Local media channel state. Mutated only by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaState {
    pub audio_connected: bool,
    pub microphone_muted: bool,
    pub camera_on: bool,
    pub gesture_required: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            audio_connected: false,
            microphone_muted: true,
            camera_on: false,
            gesture_required: false,
        }
    }
}

/// Who is joining the session. Serialized into the join request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Physician,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Physician => "physician",
            Role::Patient => "patient",
        }
    }
}

/// A participant as seen through the SDK roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub participant_id: String,
    pub display_name: Option<String>,
    pub video_enabled: bool,
}

/// Navigation handoff from the call-request view to the session view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRoute {
    pub call_id: String,
    pub token: Option<String>,
    pub role: Role,
    pub user_id: Option<String>,
    pub location_name: Option<String>,
}

impl SessionRoute {
    /// Render the session view query string.
    pub fn query_string(&self) -> String {
        let mut parts = vec![format!("callId={}", urlencoding::encode(&self.call_id))];
        if let Some(token) = &self.token {
            parts.push(format!("token={}", urlencoding::encode(token)));
        }
        parts.push(format!("role={}", self.role.as_str()));
        if let Some(user_id) = &self.user_id {
            parts.push(format!("user_id={}", urlencoding::encode(user_id)));
        }
        if let Some(location_name) = &self.location_name {
            parts.push(format!("location_name={}", urlencoding::encode(location_name)));
        }
        parts.join("&")
    }
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait KioskEventListener: Send + Sync {
    fn on_event(&self, event: KioskEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone)]
pub struct EventEmitter {
    listeners: Arc<std::sync::RwLock<Vec<Arc<dyn KioskEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(std::sync::RwLock::new(Vec::new())),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn KioskEventListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    pub fn emit(&self, event: KioskEvent) {
        let listeners = self.listeners.read().unwrap();
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
