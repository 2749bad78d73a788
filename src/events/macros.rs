/// Emit a [`TopologyEvent`](crate::events::model::TopologyEvent) from inside the daemon.
///
/// `emit_topology_event!(level, action, peer, depth, children, detail)`
#[macro_export]
macro_rules! emit_topology_event {
    ($level:expr, $action:expr, $peer:expr, $depth:expr, $children:expr, $detail:expr) => {{
        use $crate::events::{dispatcher, model::*};
        let mut meta = dispatcher::meta("topology", $level);
        meta.corr_id = Some(dispatcher::correlation_id());
        let evt = TopologyEvent {
            meta,
            action: $action.to_string(),
            peer: $peer.map(|p| p.to_string()),
            depth: $depth,
            children: $children,
            detail: $detail,
        };
        dispatcher::emit(LogEvent::Topology(evt));
    }};
}
