pub mod handler;
pub mod node;
pub mod signal;
pub mod wire;

pub use handler::{Call, Handler, HandlerFlags, HandlerTable, Protocol, ProtocolId};
pub use node::{ApiNode, ApiPeer, ClientFuture, NodeSettings, PollContext, TalkOutcome};
pub use signal::{Signal, SignalQueue};
pub use wire::{ApiHeader, Verdict};
