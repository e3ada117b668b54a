use std::net::{IpAddr, SocketAddr};

use crate::ACTIVE_PORT;

const ZABBIX_SERVER: &str = "ZABBIX_SERVER";

pub fn get_server() -> Option<String> {
    std::env::var(ZABBIX_SERVER)
        .ok()
        .filter(|server| !server.trim().is_empty())
}

const ZABBIX_PORT: &str = "ZABBIX_PORT";

pub fn get_default_port() -> u16 {
    ACTIVE_PORT
}

pub fn get_port() -> Option<u16> {
    let port_from_env = std::env::var(ZABBIX_PORT);
    port_from_env.ok().and_then(|res| res.parse().ok())
}

const ZABBIX_SIM_TIMEOUT: &str = "ZABBIX_SIM_TIMEOUT";

pub fn get_timeout() -> Option<u64> {
    let timeout_from_env = std::env::var(ZABBIX_SIM_TIMEOUT);
    timeout_from_env
        .ok()
        .and_then(|res| res.parse().ok())
        .filter(|secs| *secs > 0)
}

/// Build the `host:port` address of the server's active-agent listener.
///
/// The configured server may be written as a URL (`https://zabbix.example/zabbix`),
/// a bare host, an IP address, or any of these with an explicit port. An explicit
/// port wins over `port`.
pub fn server_address(server: &str, port: u16) -> String {
    let without_scheme = server
        .split_once("://")
        .map_or(server, |(_, rest)| rest);
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .trim();

    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(IpAddr::V6(ip)) = bare.parse::<IpAddr>() {
        return format!("[{ip}]:{port}");
    }

    match host.rsplit_once(':') {
        Some((name, explicit)) if explicit.parse::<u16>().is_ok() => format!("{name}:{explicit}"),
        Some((name, _)) => format!("{name}:{port}"),
        None => format!("{host}:{port}"),
    }
}
