//! Moderation for Voice Warden
//!
//! The punishment dispatcher used by the dashboard, the append-only punishment log
//! and the background task that lifts timed voice sanctions.

mod action;
mod error;
mod record;
mod sanctions;
mod service;

pub use action::{PunishmentKind, UnknownAction, permission_names};
pub use error::{ModerationError, ModerationResult};
pub use record::{DEFAULT_REASON, PunishmentLog};
pub use sanctions::{
    SanctionCheckRequest, SanctionStore, TimedSanction, check_sanctions, spawn_sanction_task,
};
pub use service::{
    Actor, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS, PunishmentRequest, WARN_LIMIT, perform_punishment,
};
