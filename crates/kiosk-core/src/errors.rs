use thiserror::Error;

use crate::sdk::MediaChannel;

#[derive(Debug, Error)]
pub enum KioskError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed deep-link token: {0}")]
    MalformedToken(String),
    #[error("unexpected join payload: {0}")]
    UnexpectedJoinPayload(String),
    #[error("media start blocked for {channel:?}")]
    MediaBlocked { channel: MediaChannel },
    #[error("render failed: {0}")]
    Render(String),
    #[error("session error: {0}")]
    Session(String),
}
