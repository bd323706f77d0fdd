//! Hardware and collaborator abstraction traits
//!
//! These traits define the interface between the application logic
//! and hardware-specific or network-specific implementations.

pub mod display;
pub mod network;
pub mod services;
pub mod storage;

pub use display::{PagedPanel, PanelError};
pub use network::{FetchError, HttpClient, ResponseSink, TransportError};
pub use services::FrameServices;
pub use storage::{ImageStore, StorageError};
