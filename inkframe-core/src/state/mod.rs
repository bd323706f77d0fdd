//! Update/failure state machine
//!
//! Decides when to fetch a new picture, when to retry, and when the frame
//! has gone without a good picture for so long that it should say so on
//! screen. All device state lives in one [`DeviceState`] value owned by
//! [`UpdateMachine`]; collaborators only ever see [`StatusView`] copies.

pub mod events;
pub mod machine;
pub mod update;

pub use events::Event;
pub use machine::State;
pub use update::{DeviceState, Schedule, StatusView, UpdateMachine};
