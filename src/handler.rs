//! WebSocket connection handler
//!
//! Accepts TCP connections, performs the HTTP upgrade on `/ws?name=...`,
//! and hands each upgraded socket to a new `Client` actor.

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::client::{Client, ClientHandle};
use crate::config::Config;
use crate::error::AppError;
use crate::hub::HubHandle;

/// Path that accepts upgrade requests
pub const WS_PATH: &str = "/ws";

/// Accept loop
///
/// Spawns one handler task per connection. Accept errors are logged and
/// never end the loop.
pub async fn serve(listener: TcpListener, hub: HubHandle, config: Config) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("New connection from {}", addr);
                let hub = hub.clone();
                let capacity = config.outbound_capacity;

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, hub, capacity).await {
                        match e {
                            AppError::MissingName => {}
                            e => warn!("Connection from {} ended: {}", addr, e),
                        }
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the client with the hub and
/// runs it until the connection closes.
pub async fn handle_connection(
    stream: TcpStream,
    hub: HubHandle,
    outbound_capacity: usize,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut name = None;
    let handshake = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp| {
        check_upgrade(req, resp, &mut name)
    })
    .await;
    let ws_stream = match handshake {
        Ok(ws) => ws,
        Err(e) if name.is_none() => {
            debug!("Rejected upgrade from {}: {}", peer_addr, e);
            return Err(AppError::MissingName);
        }
        Err(e) => return Err(e.into()),
    };
    let Some(name) = name else {
        return Err(AppError::MissingName);
    };

    let (handle, outbound) = ClientHandle::new(name, outbound_capacity);
    info!(
        "Client {} ({}) connected from {}",
        handle.id(),
        handle.name(),
        peer_addr
    );

    hub.register(handle.clone()).await?;
    Client::new(handle, hub).run(ws_stream, outbound).await;

    Ok(())
}

/// Handshake callback: route check and `name` extraction
fn check_upgrade(
    req: &Request,
    resp: Response,
    name: &mut Option<String>,
) -> Result<Response, ErrorResponse> {
    if req.uri().path() != WS_PATH {
        warn!("Upgrade requested on unknown path {}", req.uri().path());
        return Err(reject(StatusCode::NOT_FOUND, "not found"));
    }

    match req.uri().query().and_then(name_param) {
        Some(value) => {
            *name = Some(value);
            Ok(resp)
        }
        None => {
            warn!("Url Param 'name' is missing");
            Err(reject(StatusCode::BAD_REQUEST, "missing 'name' query parameter"))
        }
    }
}

/// First non-empty `name` value in a query string
fn name_param(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == "name" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(reason.to_string()));
    *resp.status_mut() = status;
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        Request::builder().uri(uri).body(()).unwrap()
    }

    #[test]
    fn test_name_param() {
        assert_eq!(name_param("name=alice"), Some("alice".to_string()));
        assert_eq!(name_param("x=1&name=bob%20b"), Some("bob b".to_string()));
        assert_eq!(name_param("name="), None);
        assert_eq!(name_param("other=1"), None);
    }

    #[test]
    fn test_check_upgrade_accepts_named_client() {
        let mut name = None;
        let result = check_upgrade(&request("/ws?name=alice"), Response::new(()), &mut name);
        assert!(result.is_ok());
        assert_eq!(name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_check_upgrade_rejects_missing_name() {
        let mut name = None;
        let err = check_upgrade(&request("/ws"), Response::new(()), &mut name).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(name.is_none());
    }

    #[test]
    fn test_check_upgrade_rejects_other_path() {
        let mut name = None;
        let err = check_upgrade(&request("/chat?name=alice"), Response::new(()), &mut name)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
