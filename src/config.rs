//! Configuration utilities (ports, data directory, env vars).

use std::path::PathBuf;
use std::{
    env,
    net::{Ipv4Addr, SocketAddr},
};

/// Socket address to bind the server to.
///
/// Reads the `PORT` env var or defaults to 8080, binds to 0.0.0.0.
pub fn server_addr() -> SocketAddr {
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Directory holding the saved-game database.
///
/// Reads the `DATA_PATH` env var or defaults to `./data`.
pub fn data_path() -> PathBuf {
    env::var("DATA_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"))
}
