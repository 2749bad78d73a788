//! NICE public prelude.
//! Import with: `use nice::prelude::*;`

pub use crate::api::{
    ApiNode, ApiPeer, Call, Handler, HandlerFlags, NodeSettings, PollContext, Protocol, TalkOutcome,
};
pub use crate::config::{Config, ConfigOverrides, Settings};
pub use crate::daemon::{Daemon, DaemonHandle, RegisterOutcome};
pub use crate::error::{NiceError, Result};
pub use crate::network::{Connection, RegState, StatusReport, Wish, WishKind};
pub use crate::topology::{PeerInfo, SchedWindow, Slot, Topology};
