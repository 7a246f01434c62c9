//! Light show: mode state machine, effects and throttled dispatch

pub mod color;
pub mod director;
pub mod dispatch;
pub mod effects;
pub mod mode;
