use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::auth::{CredentialResolver, Resolution, ResolveArgs, SessionCredentials};
use crate::errors::KioskError;
use crate::events::{EventEmitter, KioskEvent, MediaState, Role, SessionState};
use crate::sdk::{RenderSurface, RosterEvent, VideoSdk};
use crate::tiles::TileRegistry;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub deep_link_token: Option<String>,
    pub call_id: String,
    pub role: Role,
    pub location_name: Option<String>,
    pub user_id: Option<String>,
    /// Set by the host shell for environments that refuse unprompted
    /// media start (mobile browsers). Media is then only attempted from
    /// `enable_media_via_gesture`.
    pub media_gesture_required: bool,
}

/// Manages the lifecycle of one video session.
///
/// Owns the SDK client handle, credential resolution, local media, the
/// tile registry and the roster event loop. At most one manager is
/// active per view; every async result is gated on the liveness flag so
/// navigation away never races a stale completion into live state.
pub struct SessionManager {
    sdk: Arc<dyn VideoSdk>,
    resolver: CredentialResolver,
    emitter: EventEmitter,
    state: Arc<Mutex<SessionState>>,
    media: Arc<Mutex<MediaState>>,
    tiles: Arc<Mutex<TileRegistry>>,
    credentials: Arc<Mutex<Option<SessionCredentials>>>,
    local_surface: Arc<RenderSurface>,
    live: Arc<AtomicBool>,
    audio_started: AtomicBool,
    video_started: AtomicBool,
    event_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(sdk: Arc<dyn VideoSdk>, resolver: CredentialResolver, emitter: EventEmitter) -> Self {
        Self {
            sdk,
            resolver,
            emitter,
            state: Arc::new(Mutex::new(SessionState::Uninitialized)),
            media: Arc::new(Mutex::new(MediaState::default())),
            tiles: Arc::new(Mutex::new(TileRegistry::new())),
            credentials: Arc::new(Mutex::new(None)),
            local_surface: Arc::new(RenderSurface::new()),
            live: Arc::new(AtomicBool::new(false)),
            audio_started: AtomicBool::new(false),
            video_started: AtomicBool::new(false),
            event_task: std::sync::Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub async fn media_state(&self) -> MediaState {
        self.media.lock().await.clone()
    }

    /// Surface for the local self-view tile.
    pub fn local_surface(&self) -> Arc<RenderSurface> {
        self.local_surface.clone()
    }

    /// Shared tile registry, for shells that enumerate remote tiles.
    pub fn tiles(&self) -> Arc<Mutex<TileRegistry>> {
        self.tiles.clone()
    }

    /// Whether the roster event loop is currently subscribed.
    pub fn has_event_loop(&self) -> bool {
        self.event_task
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Resolve credentials, join the session and attempt local media.
    ///
    /// Audio and video attempts are independent: either failing moves
    /// that channel into a gesture-gated blocked substate instead of
    /// failing the join. A resolution or SDK join failure surfaces one
    /// user-facing error and tears down before any media attempt.
    pub async fn join(&self, options: &SessionOptions) -> Result<(), KioskError> {
        {
            let state = self.state.lock().await;
            if !matches!(*state, SessionState::Uninitialized | SessionState::Left) {
                return Err(KioskError::Session(
                    "a session is already active for this view".into(),
                ));
            }
        }
        self.live.store(true, Ordering::SeqCst);

        if options.media_gesture_required {
            let mut media = self.media.lock().await;
            media.gesture_required = true;
            self.emitter.emit(KioskEvent::MediaStateChanged(media.clone()));
        }

        self.set_state(SessionState::Resolving).await;
        let resolution = match self
            .resolver
            .resolve(&ResolveArgs {
                deep_link_token: options.deep_link_token.clone(),
                call_id: options.call_id.clone(),
                role: options.role,
                location_name: options.location_name.clone(),
                user_id: options.user_id.clone(),
            })
            .await
        {
            Ok(resolution) => resolution,
            Err(e) => {
                self.emitter.emit(KioskEvent::SessionFailed(e.to_string()));
                self.leave().await;
                return Err(e);
            }
        };
        if !self.live.load(Ordering::SeqCst) {
            return Ok(());
        }

        let credentials = match resolution {
            Resolution::Redirect(redirect) => {
                self.emitter.emit(KioskEvent::RedirectRequested(redirect.url));
                self.leave().await;
                return Ok(());
            }
            Resolution::Credentials(credentials) => credentials,
        };

        self.set_state(SessionState::Joining).await;
        let events = match self.sdk.join(&credentials).await {
            Ok(events) => events,
            Err(e) => {
                self.emitter.emit(KioskEvent::SessionFailed(e.to_string()));
                self.leave().await;
                return Err(e);
            }
        };
        if !self.live.load(Ordering::SeqCst) {
            self.leave().await;
            return Ok(());
        }

        *self.credentials.lock().await = Some(credentials);
        self.set_state(SessionState::Joined).await;
        self.tiles.lock().await.set_client(self.sdk.clone());

        // Seed tiles for participants already in the session.
        let self_id = self.sdk.current_user().await.map(|p| p.participant_id);
        for participant in self.sdk.roster().await {
            if self_id.as_deref() == Some(participant.participant_id.as_str()) {
                continue;
            }
            {
                let mut registry = self.tiles.lock().await;
                registry.ensure_tile(&participant);
                registry.render_participant(&participant.participant_id).await;
            }
            self.emitter.emit(KioskEvent::ParticipantJoined(participant));
        }

        self.spawn_event_loop(events);

        let gesture_required = self.media.lock().await.gesture_required;
        if gesture_required {
            tracing::info!("media start deferred until user gesture");
        } else {
            self.try_start_audio().await;
            self.try_start_video().await;
        }
        self.recompute_state().await;
        Ok(())
    }

    /// (Re)attempt whichever local media channels are not yet active.
    ///
    /// Idempotent; a no-op when both channels are already up. Must be
    /// invoked from a direct user-interaction context in gesture-gated
    /// environments.
    pub async fn enable_media_via_gesture(&self) {
        if !self.live.load(Ordering::SeqCst) {
            return;
        }
        let media = self.media.lock().await.clone();
        if media.audio_connected && media.camera_on {
            return;
        }
        if !media.audio_connected {
            self.try_start_audio().await;
        }
        if !media.camera_on {
            self.try_start_video().await;
        }
        {
            let mut media = self.media.lock().await;
            media.gesture_required = !(media.audio_connected && media.camera_on);
            self.emitter.emit(KioskEvent::MediaStateChanged(media.clone()));
        }
        self.recompute_state().await;
    }

    pub async fn toggle_microphone(&self) -> Result<(), KioskError> {
        if !self.audio_started.load(Ordering::SeqCst) {
            // never connected: go through the gesture-enable path
            self.enable_media_via_gesture().await;
            return Ok(());
        }
        let next_muted = !self.media.lock().await.microphone_muted;
        self.sdk.set_microphone_muted(next_muted).await?;
        let mut media = self.media.lock().await;
        media.microphone_muted = next_muted;
        self.emitter.emit(KioskEvent::MediaStateChanged(media.clone()));
        Ok(())
    }

    pub async fn toggle_camera(&self) -> Result<(), KioskError> {
        if !self.video_started.load(Ordering::SeqCst) {
            self.enable_media_via_gesture().await;
            return Ok(());
        }
        let camera_on = self.media.lock().await.camera_on;
        if camera_on {
            // detach before stopping so the surface never keeps a stale frame
            if let Err(e) = self.sdk.detach_local().await {
                tracing::warn!("detach local surface: {e}");
            }
            self.sdk.stop_video().await?;
            self.local_surface.fill_placeholder();
            let mut media = self.media.lock().await;
            media.camera_on = false;
            self.emitter.emit(KioskEvent::MediaStateChanged(media.clone()));
        } else {
            self.sdk.start_video().await?;
            if let Err(e) = self.sdk.attach_local(self.local_surface.clone()).await {
                tracing::warn!("attach local surface: {e}");
            }
            self.local_surface.mark_live();
            let mut media = self.media.lock().await;
            media.camera_on = true;
            self.emitter.emit(KioskEvent::MediaStateChanged(media.clone()));
        }
        self.recompute_state().await;
        Ok(())
    }

    /// Tear the session down. Runs on every exit path and is safe to
    /// call repeatedly; each step is best-effort and a failure in one
    /// never prevents the ones after it.
    pub async fn leave(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.set_state(SessionState::Leaving).await;

        if let Some(handle) = self.event_task.lock().unwrap().take() {
            handle.abort();
        }

        {
            let mut registry = self.tiles.lock().await;
            registry.clear().await;
            registry.clear_client();
        }

        if let Err(e) = self.sdk.detach_local().await {
            tracing::warn!("teardown: detach local surface: {e}");
        }
        if let Err(e) = self.sdk.stop_video().await {
            tracing::warn!("teardown: stop video: {e}");
        }
        if let Err(e) = self.sdk.set_microphone_muted(true).await {
            tracing::warn!("teardown: mute microphone: {e}");
        }
        if let Err(e) = self.sdk.stop_audio().await {
            tracing::warn!("teardown: stop audio: {e}");
        }
        if let Err(e) = self.sdk.leave().await {
            tracing::warn!("teardown: sdk leave: {e}");
        }

        *self.credentials.lock().await = None;
        self.local_surface.fill_placeholder();
        self.audio_started.store(false, Ordering::SeqCst);
        self.video_started.store(false, Ordering::SeqCst);
        {
            let mut media = self.media.lock().await;
            *media = MediaState::default();
            self.emitter.emit(KioskEvent::MediaStateChanged(media.clone()));
        }
        self.set_state(SessionState::Left).await;
        tracing::info!("session torn down");
    }

    async fn try_start_audio(&self) {
        match self.sdk.start_audio().await {
            Ok(()) => {
                if let Err(e) = self.sdk.set_microphone_muted(false).await {
                    tracing::warn!("unmute after audio start: {e}");
                }
                self.audio_started.store(true, Ordering::SeqCst);
                let mut media = self.media.lock().await;
                media.audio_connected = true;
                media.microphone_muted = false;
                self.emitter.emit(KioskEvent::MediaStateChanged(media.clone()));
            }
            Err(e) => {
                tracing::warn!("audio start blocked: {e}");
                let mut media = self.media.lock().await;
                media.gesture_required = true;
                self.emitter.emit(KioskEvent::MediaStateChanged(media.clone()));
            }
        }
    }

    async fn try_start_video(&self) {
        match self.sdk.start_video().await {
            Ok(()) => {
                if let Err(e) = self.sdk.attach_local(self.local_surface.clone()).await {
                    tracing::warn!("attach local surface: {e}");
                }
                self.local_surface.mark_live();
                self.video_started.store(true, Ordering::SeqCst);
                let mut media = self.media.lock().await;
                media.camera_on = true;
                self.emitter.emit(KioskEvent::MediaStateChanged(media.clone()));
            }
            Err(e) => {
                tracing::warn!("video start blocked: {e}");
                let mut media = self.media.lock().await;
                media.gesture_required = true;
                self.emitter.emit(KioskEvent::MediaStateChanged(media.clone()));
            }
        }
    }

    async fn recompute_state(&self) {
        if !self.live.load(Ordering::SeqCst) {
            return;
        }
        let media = self.media.lock().await.clone();
        let next = if media.audio_connected && media.camera_on {
            SessionState::Active
        } else if !media.audio_connected {
            SessionState::AudioBlocked
        } else {
            SessionState::VideoBlocked
        };
        self.set_state(next).await;
    }

    async fn set_state(&self, next: SessionState) {
        *self.state.lock().await = next;
        self.emitter.emit(KioskEvent::SessionStateChanged(next));
    }

    fn spawn_event_loop(&self, mut events: UnboundedReceiver<RosterEvent>) {
        let live = self.live.clone();
        let tiles = self.tiles.clone();
        let emitter = self.emitter.clone();
        let sdk = self.sdk.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !live.load(Ordering::SeqCst) {
                    break;
                }
                match event {
                    RosterEvent::ParticipantsAdded(added) => {
                        let self_id = sdk.current_user().await.map(|p| p.participant_id);
                        for participant in added {
                            if self_id.as_deref() == Some(participant.participant_id.as_str()) {
                                continue;
                            }
                            {
                                let mut registry = tiles.lock().await;
                                registry.ensure_tile(&participant);
                                registry
                                    .render_participant(&participant.participant_id)
                                    .await;
                            }
                            emitter.emit(KioskEvent::ParticipantJoined(participant));
                        }
                    }
                    RosterEvent::ParticipantUpdated(participant) => {
                        // metadata-only: no re-render
                        tiles.lock().await.update_label(
                            &participant.participant_id,
                            participant.display_name.as_deref(),
                        );
                    }
                    RosterEvent::ParticipantRemoved(participant_id) => {
                        tiles.lock().await.remove_tile(&participant_id).await;
                        emitter.emit(KioskEvent::ParticipantLeft(participant_id));
                    }
                    RosterEvent::VideoStateChanged { participant_id, on } => {
                        if on {
                            {
                                let mut registry = tiles.lock().await;
                                if registry.tile(&participant_id).is_none() {
                                    if let Some(p) = sdk
                                        .roster()
                                        .await
                                        .into_iter()
                                        .find(|p| p.participant_id == participant_id)
                                    {
                                        registry.ensure_tile(&p);
                                    }
                                }
                                registry.render_participant(&participant_id).await;
                            }
                            emitter.emit(KioskEvent::TileVideoStarted(participant_id));
                        } else {
                            // video-off keeps the tile; only removal destroys it
                            tiles.lock().await.stop_render_only(&participant_id).await;
                            emitter.emit(KioskEvent::TileVideoStopped(participant_id));
                        }
                    }
                }
            }
            tracing::info!("session event loop ended");
        });
        *self.event_task.lock().unwrap() = Some(handle);
    }
}
