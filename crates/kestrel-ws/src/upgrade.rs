//! HTTP upgrade handshake (RFC 6455 section 4.2).

use base64::Engine;
use http::{header, HeaderMap, Request, Response, StatusCode};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::{WsError, WsResult};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Check if a request asks for a WebSocket upgrade.
pub fn is_websocket_request<B>(request: &Request<B>) -> bool {
    validate_upgrade_request(request).is_ok()
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Validate an upgrade request and return the `Sec-WebSocket-Accept` value.
pub fn validate_upgrade_request<B>(request: &Request<B>) -> WsResult<String> {
    let headers = request.headers();

    let connection_upgrade = header_str(headers, header::CONNECTION)
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    if !connection_upgrade {
        return Err(WsError::not_websocket("missing Connection: Upgrade header"));
    }

    let upgrade_websocket = header_str(headers, header::UPGRADE)
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    if !upgrade_websocket {
        return Err(WsError::not_websocket("missing Upgrade: websocket header"));
    }

    let key = header_str(headers, header::SEC_WEBSOCKET_KEY)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WsError::not_websocket("missing Sec-WebSocket-Key header"))?;

    if header_str(headers, header::SEC_WEBSOCKET_VERSION) != Some("13") {
        return Err(WsError::not_websocket(
            "missing or invalid Sec-WebSocket-Version header (must be 13)",
        ));
    }

    Ok(accept_key(key))
}

/// Compute the `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Build the `101 Switching Protocols` response for a validated request.
pub fn switching_protocols<B>(request: &Request<B>) -> WsResult<Response<()>> {
    let accept = validate_upgrade_request(request).map_err(|e| {
        debug!(error = %e, "websocket upgrade validation failed");
        e
    })?;

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_ACCEPT, accept)
        .body(())
        .map_err(|e| WsError::HandshakeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_request() -> http::request::Builder {
        Request::builder()
            .uri("/ws")
            .header(header::CONNECTION, "keep-alive, Upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
    }

    #[test]
    fn test_accept_key_matches_rfc_example() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_valid_request() {
        let request = upgrade_request()
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .body(())
            .unwrap();
        assert!(is_websocket_request(&request));

        let response = switching_protocols(&request).unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(
            response.headers()[header::SEC_WEBSOCKET_ACCEPT],
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_wrong_version() {
        let request = upgrade_request()
            .header(header::SEC_WEBSOCKET_VERSION, "8")
            .body(())
            .unwrap();
        assert!(!is_websocket_request(&request));
        assert!(matches!(
            switching_protocols(&request),
            Err(WsError::NotWebSocketRequest { .. })
        ));
    }

    #[test]
    fn test_plain_request() {
        let request = Request::get("/").body(()).unwrap();
        let err = validate_upgrade_request(&request).unwrap_err();
        assert_eq!(
            err.to_string(),
            "not a WebSocket upgrade request: missing Connection: Upgrade header"
        );
    }
}
