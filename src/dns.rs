//! Hostname resolution: the one piece of this crate that talks to the
//! system resolver. Literal IPs and hostnames are both accepted; the first
//! resolved address is used.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::Error;

pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::Resolve(host.to_string()))?
        .next()
        .ok_or_else(|| Error::Resolve(host.to_string()))
}
