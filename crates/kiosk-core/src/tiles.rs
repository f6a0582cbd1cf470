use std::collections::HashMap;
use std::sync::Arc;

use crate::events::Participant;
use crate::sdk::{RenderSurface, VideoSdk};

/// Per-participant rendering state. One tile per live participant id.
#[derive(Debug, Clone)]
pub struct Tile {
    pub participant_id: String,
    pub surface: Arc<RenderSurface>,
    pub label: String,
    pub last_known_video_state: bool,
}

/// Maps participant ids to render surfaces.
///
/// Driven by the session event loop. The SDK client handle is installed
/// on join and cleared on teardown; render requests without a client are
/// no-ops.
pub struct TileRegistry {
    tiles: HashMap<String, Tile>,
    sdk: Option<Arc<dyn VideoSdk>>,
}

impl TileRegistry {
    pub fn new() -> Self {
        Self {
            tiles: HashMap::new(),
            sdk: None,
        }
    }

    pub fn set_client(&mut self, sdk: Arc<dyn VideoSdk>) {
        self.sdk = Some(sdk);
    }

    pub fn clear_client(&mut self) {
        self.sdk = None;
    }

    /// Idempotent tile creation. An existing tile gets its label updated
    /// when a new display name is supplied; otherwise a fresh tile with a
    /// placeholder-filled surface is created.
    pub fn ensure_tile(&mut self, participant: &Participant) -> &Tile {
        let id = participant.participant_id.clone();
        let supplied_name = participant
            .display_name
            .clone()
            .filter(|n| !n.is_empty());

        if self.tiles.contains_key(&id) {
            if let Some(name) = supplied_name {
                let tile = self.tiles.get_mut(&id).unwrap();
                tile.label = name;
            }
        } else {
            let label = supplied_name.unwrap_or_else(|| format!("User {id}"));
            tracing::debug!("creating tile for {id} ({label})");
            self.tiles.insert(
                id.clone(),
                Tile {
                    participant_id: id.clone(),
                    surface: Arc::new(RenderSurface::new()),
                    label,
                    last_known_video_state: false,
                },
            );
        }
        self.tiles.get(&id).unwrap()
    }

    /// Update an existing tile's label. Metadata-only: never re-renders.
    pub fn update_label(&mut self, participant_id: &str, display_name: Option<&str>) {
        if let (Some(tile), Some(name)) = (self.tiles.get_mut(participant_id), display_name) {
            if !name.is_empty() {
                tile.label = name.to_string();
            }
        }
    }

    /// Render a participant into its tile.
    ///
    /// No-op without an active client or tile. Audio-only participants
    /// (roster shows video disabled) get the placeholder fill without an
    /// SDK call. Render failures are logged and contained so one broken
    /// remote cannot break the rest of the roster.
    pub async fn render_participant(&mut self, participant_id: &str) {
        let Some(sdk) = self.sdk.clone() else {
            return;
        };
        let Some(tile) = self.tiles.get_mut(participant_id) else {
            return;
        };

        let video_on = sdk
            .roster()
            .await
            .iter()
            .find(|p| p.participant_id == participant_id)
            .map(|p| p.video_enabled)
            .unwrap_or(false);

        if !video_on {
            tile.surface.fill_placeholder();
            tile.last_known_video_state = false;
            return;
        }

        match sdk.render_remote(participant_id, tile.surface.clone()).await {
            Ok(()) => {
                tile.surface.mark_live();
                tile.last_known_video_state = true;
            }
            Err(e) => {
                tracing::warn!("render failed for {participant_id}: {e}");
            }
        }
    }

    /// Stop active rendering but keep the tile (placeholder and label
    /// persist). The SDK stop is best-effort.
    pub async fn stop_render_only(&mut self, participant_id: &str) {
        let Some(tile) = self.tiles.get_mut(participant_id) else {
            return;
        };
        if let Some(sdk) = self.sdk.clone() {
            if let Err(e) = sdk.stop_remote(participant_id).await {
                tracing::debug!("stop render for {participant_id}: {e}");
            }
        }
        tile.surface.fill_placeholder();
        tile.last_known_video_state = false;
    }

    /// Tear down a tile and release its surface. Safe for unknown ids.
    pub async fn remove_tile(&mut self, participant_id: &str) {
        self.stop_render_only(participant_id).await;
        if self.tiles.remove(participant_id).is_some() {
            tracing::debug!("tile removed for {participant_id}");
        }
    }

    /// Best-effort render stop for every tracked participant, then drop
    /// all tiles. Used by session teardown.
    pub async fn clear(&mut self) {
        let ids: Vec<String> = self.tiles.keys().cloned().collect();
        for id in ids {
            self.stop_render_only(&id).await;
        }
        self.tiles.clear();
    }

    pub fn tile(&self, participant_id: &str) -> Option<&Tile> {
        self.tiles.get(participant_id)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl Default for TileRegistry {
    fn default() -> Self {
        Self::new()
    }
}
