//! External-collaborator contracts for the transfer engine's transport and
//! signaling boundaries, plus an in-memory loopback channel used by tests
//! and the CLI's demo mode.
//!
//! The engine never opens a socket itself: a real deployment supplies its
//! own `Channel`/`Signaling` implementations (WebRTC data channel, raw TCP,
//! whatever the host application already uses for connectivity).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod loopback;
pub mod signaling;
pub mod sink;

pub use channel::{Channel, ChannelError, Inbound};
pub use loopback::LoopbackChannel;
pub use signaling::{Signaling, SignalingError};
pub use sink::{Sink, SinkError};
