//! Capability surface of the vendor video SDK.
//!
//! The session manager consumes the SDK through this trait; nothing in
//! this crate implements transport or codecs. Roster events arrive over
//! the channel returned by `join`, in SDK delivery order.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::auth::SessionCredentials;
use crate::errors::KioskError;
use crate::events::Participant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaChannel {
    Audio,
    Video,
}

/// What a render surface currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFill {
    Placeholder,
    Live,
}

/// A render target handed to the SDK. Owned by exactly one tile (or by
/// the session manager, for the local self-view).
#[derive(Debug)]
pub struct RenderSurface {
    id: Uuid,
    fill: std::sync::Mutex<SurfaceFill>,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            fill: std::sync::Mutex::new(SurfaceFill::Placeholder),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn fill(&self) -> SurfaceFill {
        *self.fill.lock().unwrap()
    }

    /// Refill with the placeholder color.
    pub fn fill_placeholder(&self) {
        *self.fill.lock().unwrap() = SurfaceFill::Placeholder;
    }

    pub fn mark_live(&self) {
        *self.fill.lock().unwrap() = SurfaceFill::Live;
    }
}

impl Default for RenderSurface {
    fn default() -> Self {
        Self::new()
    }
}

/// Roster and video-state events delivered by the SDK.
#[derive(Debug, Clone)]
pub enum RosterEvent {
    ParticipantsAdded(Vec<Participant>),
    ParticipantUpdated(Participant),
    ParticipantRemoved(String),
    VideoStateChanged { participant_id: String, on: bool },
}

/// Client, media and render operations of the video SDK.
///
/// All operations are async and non-blocking. Media-start rejections
/// surface as `KioskError::MediaBlocked` so the session manager can
/// transition to a gesture-gated retry instead of failing the join.
#[async_trait]
pub trait VideoSdk: Send + Sync {
    /// Join a session. Returns the roster event stream for its lifetime.
    async fn join(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<UnboundedReceiver<RosterEvent>, KioskError>;

    async fn leave(&self) -> Result<(), KioskError>;

    async fn start_audio(&self) -> Result<(), KioskError>;
    async fn stop_audio(&self) -> Result<(), KioskError>;
    async fn set_microphone_muted(&self, muted: bool) -> Result<(), KioskError>;

    async fn start_video(&self) -> Result<(), KioskError>;
    async fn stop_video(&self) -> Result<(), KioskError>;
    async fn attach_local(&self, surface: Arc<RenderSurface>) -> Result<(), KioskError>;
    async fn detach_local(&self) -> Result<(), KioskError>;

    async fn render_remote(
        &self,
        participant_id: &str,
        surface: Arc<RenderSurface>,
    ) -> Result<(), KioskError>;
    async fn stop_remote(&self, participant_id: &str) -> Result<(), KioskError>;

    async fn roster(&self) -> Vec<Participant>;
    async fn current_user(&self) -> Option<Participant>;
}
