//! Telehealth intake kiosk core business logic.
//!
//! Pure Rust crate with no platform dependencies: call-request polling,
//! session credential resolution, and the video-session lifecycle over
//! an opaque SDK capability surface. Consumed by kiosk UI shells.

pub mod api;
pub mod auth;
pub mod call_request;
pub mod config;
pub mod errors;
pub mod events;
pub mod sdk;
pub mod session;
pub mod tiles;

pub use errors::KioskError;
pub use events::KioskEvent;
