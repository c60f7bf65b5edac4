//! Browser-based OAuth authorization code flow with PKCE (spec §4.3,
//! RFC 7636), modeled directly on the teacher's `PKCEFlow` +
//! `LocalCallbackServer` shape: a loopback HTTP listener accepts exactly
//! one redirect, the CSRF state is validated, and the browser receives a
//! small fixed HTML page.

use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet,
    EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use tracing::{debug, info, warn};
use warehouse_core::domain::WarehouseError;
use warehouse_core::ports::{SessionParameters, TokenMaterial};

#[derive(Debug, Clone)]
pub struct OAuthAuthorizationCodeConfig {
    pub client_id: String,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub redirect_port: Option<u16>,
    pub external_browser_timeout: std::time::Duration,
    pub single_authentication_prompt: bool,
}

type OAuthClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

fn build_client(config: &OAuthAuthorizationCodeConfig, redirect_uri: &str) -> Result<OAuthClient, WarehouseError> {
    let client = BasicClient::new(ClientId::new(config.client_id.clone()))
        .set_auth_uri(
            AuthUrl::new(config.authorize_url.clone())
                .map_err(|e| WarehouseError::InvalidConfig(format!("invalid authorize url: {e}")))?,
        )
        .set_token_uri(
            TokenUrl::new(config.token_url.clone())
                .map_err(|e| WarehouseError::InvalidConfig(format!("invalid token url: {e}")))?,
        )
        .set_redirect_uri(
            RedirectUrl::new(redirect_uri.to_string())
                .map_err(|e| WarehouseError::InvalidConfig(format!("invalid redirect uri: {e}")))?,
        );
    Ok(client)
}

struct CallbackParams {
    code: String,
    state: String,
}

/// Parses `code`/`state` out of the loopback request URI, exactly as the
/// teacher's `parse_callback_params` does.
fn parse_callback_params(uri: &str) -> Option<CallbackParams> {
    let url = url::Url::parse(&format!("http://localhost{uri}")).ok()?;
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            _ => {}
        }
    }
    Some(CallbackParams {
        code: code?,
        state: state.unwrap_or_default(),
    })
}

fn success_html() -> &'static str {
    "<!DOCTYPE html><html><head><title>Authentication Successful</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding-top: 50px;\">\
<h1>Authentication Successful</h1><p>You can close this window.</p>\
<script>setTimeout(function(){window.close();},3000);</script></body></html>"
}

fn error_html(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Authentication Error</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding-top: 50px;\">\
<h1>Authentication Error</h1><p>{message}</p></body></html>"
    )
}

/// Binds the loopback listener up front so the caller can learn the real
/// port before constructing the redirect URI sent to the IDP (spec §4.3
/// step 1: "bind a free port unless one is pinned"). Splitting bind from
/// accept lets `login` build its `redirect_uri`/`auth_url` from the port
/// the OS actually handed back instead of a placeholder.
async fn bind_loopback_listener(
    port: Option<u16>,
    timeout: std::time::Duration,
) -> Result<(tokio::net::TcpListener, u16), WarehouseError> {
    use tokio::net::TcpListener;

    let bind_addr = format!("127.0.0.1:{}", port.unwrap_or(0));
    let listener = tokio::time::timeout(timeout, TcpListener::bind(&bind_addr))
        .await
        .map_err(|_| WarehouseError::AuthorizationFlowFailed("timed out binding loopback listener".into()))?
        .map_err(|e| WarehouseError::AuthorizationFlowFailed(format!("failed to bind loopback listener: {e}")))?;
    let bound_port = listener
        .local_addr()
        .map_err(|e| WarehouseError::AuthorizationFlowFailed(e.to_string()))?
        .port();
    Ok((listener, bound_port))
}

/// Accepts exactly one connection on an already-bound loopback listener,
/// serves it, and returns the parsed OAuth redirect params (spec §4.3
/// steps 1/4).
async fn accept_loopback_callback(
    listener: tokio::net::TcpListener,
    timeout: std::time::Duration,
) -> Result<CallbackParams, WarehouseError> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;

    let (tx, rx) = tokio::sync::oneshot::channel::<CallbackParams>();
    let tx = std::sync::Arc::new(tokio::sync::Mutex::new(Some(tx)));

    let accept = tokio::time::timeout(timeout, listener.accept());
    let (stream, _addr) = accept
        .await
        .map_err(|_| WarehouseError::AuthorizationFlowFailed("timed out waiting for oauth redirect".into()))?
        .map_err(|e| WarehouseError::AuthorizationFlowFailed(format!("accept failed: {e}")))?;

    let io = TokioIo::new(stream);
    let tx_clone = tx.clone();
    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
        let tx_inner = tx_clone.clone();
        async move {
            let uri = req.uri().to_string();
            debug!(uri, "loopback server received redirect");
            match parse_callback_params(&uri) {
                Some(params) => {
                    if let Some(sender) = tx_inner.lock().await.take() {
                        let _ = sender.send(params);
                    }
                    Ok::<_, hyper::Error>(
                        Response::builder()
                            .status(StatusCode::OK)
                            .header("Content-Type", "text/html; charset=utf-8")
                            .body(Full::new(Bytes::from(success_html())))
                            .unwrap(),
                    )
                }
                None => Ok(Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .header("Content-Type", "text/html; charset=utf-8")
                    .body(Full::new(Bytes::from(error_html(
                        "Missing authorization code in callback",
                    ))))
                    .unwrap()),
            }
        }
    });

    tokio::spawn(async move {
        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            warn!(%err, "loopback server connection error");
        }
    });

    tokio::time::timeout(timeout, rx)
        .await
        .map_err(|_| WarehouseError::AuthorizationFlowFailed("timed out waiting for oauth code".into()))?
        .map_err(|_| WarehouseError::AuthorizationFlowFailed("loopback channel closed".into()))
}

/// Opens the browser and waits for the exchange to complete end to end
/// (spec §4.3 steps 1-6). `open_browser` is a seam for tests to avoid an
/// actual system browser launch.
pub async fn login(
    config: &OAuthAuthorizationCodeConfig,
    open_browser: impl Fn(&str) -> Result<(), WarehouseError>,
) -> Result<TokenMaterial, WarehouseError> {
    let _guard = crate::lock::acquire_if_enabled(config.single_authentication_prompt).await;

    let (listener, bound_port) =
        bind_loopback_listener(config.redirect_port, config.external_browser_timeout).await?;
    let redirect_uri = format!("http://127.0.0.1:{bound_port}/callback");
    let client = build_client(config, &redirect_uri)?;

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
    let mut auth_request = client.authorize_url(CsrfToken::new_random);
    for scope in &config.scopes {
        auth_request = auth_request.add_scope(Scope::new(scope.clone()));
    }
    let (auth_url, csrf_token) = auth_request.set_pkce_challenge(pkce_challenge).url();

    info!("opening browser for oauth authorization code flow");
    open_browser(auth_url.as_str())?;

    let callback = accept_loopback_callback(listener, config.external_browser_timeout).await?;

    if callback.state != *csrf_token.secret() {
        return Err(WarehouseError::AuthorizationFlowFailed(
            "invalid oauth state".to_string(),
        ));
    }

    let http_client = reqwest::Client::new();
    let token_result = client
        .exchange_code(AuthorizationCode::new(callback.code))
        .set_pkce_verifier(pkce_verifier)
        .request_async(&http_client)
        .await
        .map_err(|e| WarehouseError::AuthorizationFlowFailed(format!("token exchange failed: {e}")))?;

    let expires_in = token_result
        .expires_in()
        .map(|d| d.as_secs())
        .unwrap_or(3600);

    Ok(TokenMaterial {
        session_token: token_result.access_token().secret().to_string(),
        master_token: token_result
            .refresh_token()
            .map(|t| t.secret().to_string())
            .unwrap_or_default(),
        id_token: None,
        session_id: uuid::Uuid::new_v4().to_string(),
        parameters: SessionParameters::default(),
        master_validity_seconds: expires_in,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_code_and_state_from_redirect_uri() {
        let params = parse_callback_params("/callback?code=abc123&state=xyz789").unwrap();
        assert_eq!(params.code, "abc123");
        assert_eq!(params.state, "xyz789");
    }

    #[test]
    fn missing_code_yields_none() {
        assert!(parse_callback_params("/callback?state=xyz789").is_none());
    }

    #[test]
    fn missing_state_defaults_to_empty() {
        let params = parse_callback_params("/callback?code=abc123").unwrap();
        assert_eq!(params.state, "");
    }

    #[tokio::test]
    async fn loopback_server_rejects_state_mismatch_end_to_end() {
        let (listener, bound_port) = bind_loopback_listener(None, std::time::Duration::from_secs(5))
            .await
            .unwrap();
        let server = tokio::spawn(accept_loopback_callback(
            listener,
            std::time::Duration::from_secs(5),
        ));

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", bound_port))
            .await
            .unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(
                b"GET /callback?code=somecode&state=wrong-state HTTP/1.1\r\n\
                  Host: 127.0.0.1\r\nConnection: close\r\n\r\n",
            )
            .await
            .unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200"));

        let callback = server.await.unwrap().unwrap();
        assert_eq!(callback.code, "somecode");
        assert_ne!(callback.state, "expected-state");
    }
}
