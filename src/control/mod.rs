// Mechanism control for Spencer
//
// Provides:
// - Mechanism actions and the motor commands they expand to
// - A per-mechanism state latch that suppresses repeated commands
// - The drive/lift controller
// - Closed-loop wall alignment

pub mod align;
mod command;
mod controller;
mod latch;

pub use align::{AlignMode, AlignStep, WallAligner};
pub use command::{Action, Mechanism, MotorCommand, scale_to_pct};
pub use controller::{Controller, Guarded, Motion};
pub use latch::StateLatch;
