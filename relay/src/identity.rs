use std::net::IpAddr;

use tracing::debug;

use share_socket::message::Identity;

use crate::spawn_blocking_with_tracing;

/// Resolves the display name per the name → host → clientId priority and trims
/// the advisory fields. Total and idempotent; never fails.
pub fn normalize(identity: &Identity) -> Identity {
    let name = identity.name.trim();
    let host = identity.host.trim();
    let display = if !name.is_empty() {
        name.to_string()
    } else if !host.is_empty() {
        host.to_string()
    } else {
        identity.client_id.clone()
    };
    Identity {
        client_id: identity.client_id.clone(),
        name: display,
        mac: identity.mac.clone(),
        ip: identity.ip.clone(),
        host: host.to_string(),
    }
}

/// Best-effort reverse lookup of a connection's source address. The lookup is
/// blocking, so it runs on the blocking pool; any failure resolves to `None`
/// and is never retried.
pub async fn resolve_host(ip: IpAddr) -> Option<String> {
    match spawn_blocking_with_tracing(move || dns_lookup::lookup_addr(&ip)).await {
        Ok(Ok(host)) => Some(host),
        Ok(Err(e)) => {
            debug!("reverse lookup for {ip} failed: {e}");
            None
        }
        Err(e) => {
            debug!("reverse lookup task for {ip} failed: {e}");
            None
        }
    }
}
