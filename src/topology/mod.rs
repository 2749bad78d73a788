pub mod matching;
pub mod peer;
pub mod table;
pub mod window;

pub use matching::{best_match, best_match_where, strictly_better, MatchPrefs, Prefer, Target};
pub use peer::{PeerInfo, Slot};
pub use table::{Topology, TopologyError};
pub use window::SchedWindow;
