pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod messages;
pub mod motor;
pub mod moving;
pub mod runtime;
pub mod sensors;
pub mod sequencer;
pub mod telemetry;
