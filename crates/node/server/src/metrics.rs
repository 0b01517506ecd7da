use metrics::{Counter, Gauge};

#[derive(Clone, Debug)]
pub(crate) struct ServerMetrics {
    pub(crate) peers: Gauge,
    pub(crate) peers_added: Counter,
    pub(crate) peers_removed: Counter,
    pub(crate) accept_errors: Counter,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self {
            peers: metrics::gauge!("server.peers"),
            peers_added: metrics::counter!("server.peers_added_total"),
            peers_removed: metrics::counter!("server.peers_removed_total"),
            accept_errors: metrics::counter!("listener.accept_errors_total"),
        }
    }
}
