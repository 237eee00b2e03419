//! Verifies the configured port is free before anything touches disk.

use std::net::{Ipv4Addr, TcpListener};

use tracing::debug;

use crate::PostgresError;
use crate::lifecycle::LIFECYCLE_TARGET;

/// Binds and immediately releases `127.0.0.1:<port>`.
///
/// The engine listens on `localhost`, so a successful bind on the loopback
/// address is enough to show nothing else owns the port.
///
/// # Errors
///
/// Returns [`PostgresError::PortUnavailable`] when the bind fails.
pub fn ensure_port_available(port: u16) -> Result<(), PostgresError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
        .map_err(|source| PostgresError::PortUnavailable { port, source })?;
    drop(listener);
    debug!(target: LIFECYCLE_TARGET, port, "port is available");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupied_port_is_rejected() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind probe listener");
        let port = listener.local_addr().expect("local addr").port();
        let Err(PostgresError::PortUnavailable { port: reported, .. }) = ensure_port_available(port)
        else {
            panic!("expected PortUnavailable for an occupied port");
        };
        assert_eq!(reported, port);
    }

    #[test]
    fn released_port_is_accepted() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind probe listener");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);
        ensure_port_available(port).expect("port should be free again");
    }
}
