//! Robot Teleop Library
//!
//! Realtime remote-control driver for the OpenMind teleops WebSocket API:
//! keyboard input becomes a continuously republished velocity command
//! stream while an independent loop drains the video/telemetry channel.

pub mod command;
pub mod config;
pub mod error;
pub mod input;
pub mod session;
pub mod telemetry;
pub mod velocity;

// Re-export commonly used types
pub use config::Config;
pub use error::TeleopError;
pub use session::{ChannelState, Session, SessionCounters, ShutdownFlag};
pub use velocity::{ControlKey, KeyState, Velocity, VelocityCommand};
