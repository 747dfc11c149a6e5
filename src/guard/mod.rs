//! Friction layers in front of sensitive actions

pub mod confirm;
pub mod cooldown;

pub use confirm::ConfirmationGate;
pub use cooldown::{CooldownConfig, CooldownLimiter, CooldownPolicy};
