//! API listener
//!
//! Serves the network API on every enabled local server with API mode.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::{ApiError, ApiErrorKind, ApiFormat, ApiRequest, ApiResponse, NetworkApi};
use crate::network::LocalServerConfig;

/// Largest request body read
const MAX_BODY_LENGTH: usize = 1024 * 1024;

/// API listeners bound to the local servers
pub struct ApiServer {
    api: NetworkApi,
    listeners: Vec<(SocketAddr, JoinHandle<()>)>,
}

impl ApiServer {
    pub fn new(api: NetworkApi) -> Self {
        Self {
            api,
            listeners: Vec::new(),
        }
    }

    /// Bind the main proxy and every enabled server that serves the API
    pub async fn start_local_servers(&mut self) -> Result<Vec<SocketAddr>> {
        let servers: Vec<LocalServerConfig> = {
            let extension = self.api.extension().read();
            let options = extension.local_servers_options();
            std::iter::once(options.main_proxy())
                .chain(options.servers())
                .filter(|s| s.enabled && s.mode.has_api())
                .cloned()
                .collect()
        };

        let mut addresses = Vec::with_capacity(servers.len());
        for server in &servers {
            match self.start(server).await {
                Ok(addr) => addresses.push(addr),
                Err(e) => tracing::error!("Failed to start the API on {}: {:#}", server.authority(), e),
            }
        }
        Ok(addresses)
    }

    /// Bind one server and spawn its accept loop
    pub async fn start(&mut self, server: &LocalServerConfig) -> Result<SocketAddr> {
        let listener = TcpListener::bind((server.address.as_str(), server.port))
            .await
            .with_context(|| format!("Failed to bind {}", server.authority()))?;
        let addr = listener.local_addr().context("Failed to read the bound address")?;
        tracing::info!("API listening on {}", addr);

        let api = self.api.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        tracing::debug!("API: new connection from {}", peer_addr);
                        let api = api.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, api).await {
                                tracing::warn!("API connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    }
                }
            }
        });
        self.listeners.push((addr, handle));
        Ok(addr)
    }

    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|(addr, _)| *addr).collect()
    }

    /// Stop all the listeners
    pub fn stop(&mut self) {
        for (addr, handle) in self.listeners.drain(..) {
            handle.abort();
            tracing::info!("API on {} stopped", addr);
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read one request, answer it and close the connection
async fn handle_connection(mut stream: TcpStream, api: NetworkApi) -> Result<()> {
    let mut reader = BufReader::new(&mut stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(anyhow::anyhow!("Invalid request line"));
    }
    let method = parts[0].to_string();
    let target = parts[1].to_string();

    let mut host = None;
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        if line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("host") {
                host = Some(host_without_port(value).to_string());
            } else if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0u8; content_length.min(MAX_BODY_LENGTH)];
    reader.read_exact(&mut body).await?;
    tracing::debug!("API: {} {}", method, target);

    let result = ApiRequest::parse(&target).and_then(|mut request| {
        request.host = host;
        if method == "POST" {
            request
                .params
                .extend(url::form_urlencoded::parse(&body).into_owned());
        }
        let format = request.format;
        api.handle(&request).map(|response| (format, response))
    });

    let (status, content_type, body, filename) = match result {
        Ok((format, response)) => render_response(format, response)?,
        Err(error) => render_error(&error)?,
    };

    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        reason_phrase(status),
        content_type,
        body.len()
    );
    if let Some(filename) = filename {
        head.push_str(&format!("Content-Disposition: attachment; filename=\"{}\"\r\n", filename));
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

type Rendered = (u16, String, Vec<u8>, Option<String>);

fn render_response(format: ApiFormat, response: ApiResponse) -> Result<Rendered> {
    if let ApiResponse::Other {
        content_type,
        body,
        filename,
    } = response
    {
        return Ok((200, content_type, body, filename));
    }
    if format == ApiFormat::Other {
        return render_error(&ApiError::new(ApiErrorKind::BadFormat));
    }
    let json = response.to_json().unwrap_or_default();
    Ok((200, "application/json; charset=UTF-8".to_string(), serde_json::to_vec(&json)?, None))
}

fn render_error(error: &ApiError) -> Result<Rendered> {
    tracing::debug!("API error: {}", error);
    Ok((
        error.kind.status(),
        "application/json; charset=UTF-8".to_string(),
        serde_json::to_vec(&error.to_json())?,
        None,
    ))
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

/// Host of a `Host` header value, bracketed IPv6 literals kept whole
fn host_without_port(value: &str) -> &str {
    if value.starts_with('[') {
        return match value.find(']') {
            Some(end) => &value[..=end],
            None => value,
        };
    }
    match value.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ExtensionNetwork;
    use parking_lot::RwLock;
    use std::sync::Arc;

    async fn send(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn start() -> (ApiServer, SocketAddr) {
        let api = NetworkApi::new(Arc::new(RwLock::new(ExtensionNetwork::default())));
        let mut server = ApiServer::new(api);
        let addr = server
            .start(&LocalServerConfig::new("127.0.0.1", 0))
            .await
            .unwrap();
        (server, addr)
    }

    #[test]
    fn test_host_without_port() {
        assert_eq!(host_without_port("example.org:8090"), "example.org");
        assert_eq!(host_without_port("example.org"), "example.org");
        assert_eq!(host_without_port("[::1]"), "[::1]");
        assert_eq!(host_without_port("[::1]:8080"), "[::1]");
        assert_eq!(host_without_port("::1"), "::1");
    }

    #[tokio::test]
    async fn test_view_over_http() {
        let (_server, addr) = start().await;
        let response = send(
            addr,
            "GET /JSON/network/view/getConnectionTimeout/ HTTP/1.1\r\nHost: zap\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with(r#"{"getConnectionTimeout":"20"}"#));
    }

    #[tokio::test]
    async fn test_error_over_http() {
        let (_server, addr) = start().await;
        let response = send(addr, "GET /JSON/network/action/unknown/ HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
        assert!(response.contains(r#""code":"bad_action""#));
    }

    #[tokio::test]
    async fn test_post_params() {
        let (server, addr) = start().await;
        let body = "name=example.org";
        let request = format!(
            "POST /JSON/network/action/addAlias/ HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let response = send(addr, &request).await;
        assert!(response.ends_with(r#"{"Result":"OK"}"#));
        assert!(server
            .api
            .extension()
            .read()
            .local_servers_options()
            .is_alias("example.org"));
    }

    #[tokio::test]
    async fn test_proxy_pac_uses_host() {
        let (server, addr) = start().await;
        server
            .api
            .extension()
            .write()
            .local_servers_options_mut()
            .set_main_proxy(LocalServerConfig::new("0.0.0.0", 8090));
        let response = send(
            addr,
            "GET /OTHER/network/other/proxy.pac/ HTTP/1.1\r\nHost: example.org:8090\r\n\r\n",
        )
        .await;
        assert!(response.contains("Content-Type: application/x-ns-proxy-autoconfig"));
        assert!(response.contains("PROXY example.org:8090"));
    }
}
