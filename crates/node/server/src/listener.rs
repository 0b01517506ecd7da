//! Accept loops, one per bound listener.

use std::{sync::Arc, time::Duration};

use ember_net_peer_registry::Direction;
use ember_net_transport::{Listener, TransportError};
use ember_tasks::{GracefulShutdown, or_shutdown};
use tracing::{debug, error, warn};

use crate::server::Shared;

/// Pause after an i/o accept error, e.g. when out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accept until the listener closes or the server shuts down.
///
/// Accept errors other than [`TransportError::ListenerClosed`] are logged and the loop goes on. A
/// closed listener ends the loop silently once teardown has begun.
pub(crate) async fn accept_loop(
    listener: Arc<dyn Listener>,
    shared: Arc<Shared>,
    shutdown: GracefulShutdown,
) {
    let addr = listener.local_addr();
    let signal = shutdown.signal();
    debug!(%addr, "accepting connections");

    loop {
        let Some(accepted) = or_shutdown(listener.accept(), signal.clone()).await else {
            break;
        };

        match accepted {
            Ok(conn) => {
                let remote = conn.remote_address();
                match shared.publish(conn, Direction::Inbound).await {
                    Ok(id) => debug!(%addr, peer = %id, %remote, "inbound peer"),
                    Err(err) => {
                        debug!(%addr, %remote, %err, "dropping inbound connection");
                        if shared.lifecycle.is_stopping() {
                            break;
                        }
                    }
                }
            }
            Err(TransportError::ListenerClosed) => {
                if !shared.lifecycle.is_stopping() {
                    error!(%addr, "listener closed outside of shutdown");
                }
                break;
            }
            Err(TransportError::Handshake(err)) => {
                shared.metrics.accept_errors.increment(1);
                debug!(%addr, %err, "inbound handshake failed");
            }
            Err(err) => {
                shared.metrics.accept_errors.increment(1);
                warn!(%addr, %err, "accept failed");
                if or_shutdown(tokio::time::sleep(ACCEPT_ERROR_BACKOFF), signal.clone())
                    .await
                    .is_none()
                {
                    break;
                }
            }
        }
    }

    debug!(%addr, "accept loop finished");
    drop(shutdown);
}
