//! # session
//!
//! Client-side session engine for collaborative 3D scene editing. Owns the
//! handle-based attribute store, the peer and entity registries, ownership
//! arbitration, the command dispatcher, outbound edit coalescing, and the
//! websocket session client. Rendering stays behind the [`scene`] traits so
//! the engine runs headless in tests.

pub mod client;
pub mod dispatch;
pub mod entities;
pub mod handle;
pub mod peers;
pub mod publish;
pub mod scene;

pub use client::{ClientError, ConnectionEvent, Intent, SessionClient, SessionConfig, SessionHandle};
pub use dispatch::Session;
pub use entities::{DeselectPolicy, EntityError, EntityRegistry};
pub use handle::{Handle, HandleStore, StaleHandle};
pub use peers::PeerRegistry;
pub use publish::EditPublisher;
pub use scene::{NullScene, PresenceView, SceneMutator};
