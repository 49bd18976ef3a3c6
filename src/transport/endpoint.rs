// src/transport/endpoint.rs

use crate::errors::ConfigError;

/// Turn a `tcp://host:port` (or bare `host:port`) URL into a socket address
/// string. A `*` host binds every interface.
pub fn parse_endpoint(url: &str) -> Result<String, ConfigError> {
    let addr = match url.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some(_) => return Err(ConfigError::Endpoint(url.to_string())),
        None => url,
    };

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::Endpoint(url.to_string()))?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(ConfigError::Endpoint(url.to_string()));
    }

    let host = if host == "*" { "0.0.0.0" } else { host };
    Ok(format!("{host}:{port}"))
}
