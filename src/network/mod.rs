pub mod connection;
pub(crate) mod events;
pub mod listener;
pub mod message;

pub use connection::{needs_swap, Connection, Timeouts, NATIVE_BIG_ENDIAN};
pub use listener::bind_listener;
pub use message::{
    Ack, ExchangeReply, PeerReport, RegState, RegisterReply, Request, StatusReport, Wish,
    WishKind,
};
