//! STOMP 1.2 broker transport
//!
//! Each publish opens a fresh connection, sends one `SEND` frame with a
//! receipt request, waits for the receipt and disconnects. Frames travel over
//! plain TCP (`tcp://host:port`) or as WebSocket text messages
//! (`ws://host:port/path`), which is what ActiveMQ's STOMP connectors accept.

use super::BrokerTransport;
use crate::error::{Error, Result};
use async_net::TcpStream;
use async_trait::async_trait;
use async_tungstenite::{WebSocketStream, client_async};
use futures::io::{AsyncReadExt, AsyncWriteExt};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};
use tungstenite::Message;
use uuid::Uuid;

const NUL: u8 = 0;

/// A STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command (`CONNECT`, `SEND`, ...)
    pub command: String,
    /// Headers in wire order
    pub headers: Vec<(String, String)>,
    /// Frame body
    pub body: Vec<u8>,
}

impl Frame {
    /// Create a frame with no headers or body
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    // CONNECT and CONNECTED headers are never escaped
    fn escapes_headers(&self) -> bool {
        self.command != "CONNECT" && self.command != "CONNECTED"
    }

    /// Serialize to wire bytes, including the trailing NUL
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 64);
        out.extend_from_slice(self.command.as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            if self.escapes_headers() {
                out.extend_from_slice(escape(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(NUL);
        out
    }

    /// Parse one frame
    ///
    /// Leading end-of-line heart-beats are skipped and the trailing NUL is
    /// optional.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let start = bytes
            .iter()
            .position(|b| *b != b'\n' && *b != b'\r')
            .ok_or_else(|| protocol_error("empty frame"))?;
        let bytes = &bytes[start..];

        let (head_len, separator_len) = find_head_end(bytes)
            .ok_or_else(|| protocol_error("frame has no header terminator"))?;
        let head = std::str::from_utf8(&bytes[..head_len])
            .map_err(|_| protocol_error("frame head is not UTF-8"))?;

        let mut lines = head.lines();
        let command = lines
            .next()
            .map(|line| line.trim_end_matches('\r').to_string())
            .filter(|command| !command.is_empty())
            .ok_or_else(|| protocol_error("frame has no command"))?;

        let mut frame = Frame::new(command);
        let unescape_headers = frame.escapes_headers();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| protocol_error("malformed header"))?;
            if unescape_headers {
                frame.headers.push((unescape(name)?, unescape(value)?));
            } else {
                frame.headers.push((name.to_string(), value.to_string()));
            }
        }

        let rest = &bytes[head_len + separator_len..];
        let body = match frame.get("content-length").and_then(|len| len.parse::<usize>().ok()) {
            Some(len) if len <= rest.len() => &rest[..len],
            _ => rest.split(|b| *b == NUL).next().unwrap_or_default(),
        };
        frame.body = body.to_vec();
        Ok(frame)
    }
}

fn find_head_end(bytes: &[u8]) -> Option<(usize, usize)> {
    for i in 0..bytes.len() {
        if bytes[i..].starts_with(b"\n\n") {
            return Some((i, 2));
        }
        if bytes[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
    }
    None
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(protocol_error("invalid header escape")),
        }
    }
    Ok(out)
}

fn protocol_error(message: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("STOMP protocol error: {}", message),
    ))
}

/// Where the broker listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEndpoint {
    /// Plain TCP, `host:port`
    Tcp(String),
    /// WebSocket URL and the `host:port` to dial
    WebSocket {
        /// Full `ws://` URL
        url: String,
        /// Address to connect to
        authority: String,
    },
}

impl BrokerEndpoint {
    /// Parse `tcp://host:port`, `host:port` or `ws://host[:port]/path`
    pub fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();
        if let Some(rest) = endpoint.strip_prefix("ws://") {
            let host = rest.split('/').next().unwrap_or_default();
            if host.is_empty() {
                return Err(Error::Config(format!("Invalid broker endpoint: {}", endpoint)));
            }
            let authority = if host.contains(':') {
                host.to_string()
            } else {
                format!("{}:80", host)
            };
            return Ok(Self::WebSocket {
                url: endpoint.to_string(),
                authority,
            });
        }

        let address = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
        if address.contains("://") || !address.contains(':') {
            return Err(Error::Config(format!(
                "Invalid broker endpoint: {} (expected tcp://host:port or ws://host:port/path)",
                endpoint
            )));
        }
        Ok(Self::Tcp(address.to_string()))
    }
}

/// An open broker connection
enum StompConnection {
    /// Frames over raw TCP
    Tcp {
        stream: TcpStream,
        buffer: Vec<u8>,
    },
    /// One frame per WebSocket text message
    WebSocket(WebSocketStream<TcpStream>),
}

impl StompConnection {
    async fn open(endpoint: &BrokerEndpoint) -> Result<Self> {
        match endpoint {
            BrokerEndpoint::Tcp(address) => {
                let stream = TcpStream::connect(address.as_str()).await?;
                debug!("Connected to broker at {} (tcp)", address);
                Ok(Self::Tcp {
                    stream,
                    buffer: Vec::new(),
                })
            }
            BrokerEndpoint::WebSocket { url, authority } => {
                let stream = TcpStream::connect(authority.as_str()).await?;
                let (ws, _) = client_async(url.as_str(), stream).await?;
                debug!("Connected to broker at {} (websocket)", url);
                Ok(Self::WebSocket(ws))
            }
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        match self {
            Self::Tcp { stream, .. } => {
                stream.write_all(&frame.encode()).await?;
                stream.flush().await?;
            }
            Self::WebSocket(ws) => {
                let text = String::from_utf8_lossy(&frame.encode()).into_owned();
                ws.send(Message::Text(text.into())).await?;
            }
        }
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        match self {
            Self::Tcp { stream, buffer } => loop {
                let content = buffer
                    .iter()
                    .position(|b| *b != b'\n' && *b != b'\r')
                    .unwrap_or(buffer.len());
                if let Some(offset) = buffer[content..].iter().position(|b| *b == NUL) {
                    let end = content + offset + 1;
                    let frame = Frame::decode(&buffer[..end]);
                    buffer.drain(..end);
                    return frame;
                }

                let mut chunk = [0u8; 4096];
                let read = stream.read(&mut chunk).await?;
                if read == 0 {
                    return Err(protocol_error("connection closed by broker"));
                }
                buffer.extend_from_slice(&chunk[..read]);
            },
            Self::WebSocket(ws) => loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if text.trim().is_empty() {
                            continue;
                        }
                        return Frame::decode(text.as_bytes());
                    }
                    Some(Ok(Message::Binary(data))) => return Frame::decode(&data),
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(protocol_error("connection closed by broker"));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                }
            },
        }
    }

    async fn close(self) {
        match self {
            Self::Tcp { mut stream, .. } => {
                let _ = stream.close().await;
            }
            Self::WebSocket(mut ws) => {
                let _ = ws.close(None).await;
            }
        }
    }
}

/// STOMP publisher for ActiveMQ-style brokers
#[derive(Debug, Clone)]
pub struct StompTransport {
    endpoint: BrokerEndpoint,
    virtual_host: String,
    login: Option<String>,
    passcode: Option<String>,
    destination_prefix: String,
}

impl StompTransport {
    /// Create a transport for a broker endpoint
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = BrokerEndpoint::parse(endpoint)?;
        Ok(Self {
            endpoint,
            virtual_host: "/".to_string(),
            login: None,
            passcode: None,
            destination_prefix: "/topic/".to_string(),
        })
    }

    /// Authenticate with the broker
    pub fn with_credentials(mut self, login: Option<String>, passcode: Option<String>) -> Self {
        self.login = login;
        self.passcode = passcode;
        self
    }

    /// Prefix prepended to topic names to form destinations
    pub fn with_destination_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.destination_prefix = prefix.into();
        self
    }

    fn connect_frame(&self) -> Frame {
        let mut frame = Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", self.virtual_host.as_str())
            .header("heart-beat", "0,0");
        if let Some(login) = &self.login {
            frame = frame.header("login", login.as_str());
        }
        if let Some(passcode) = &self.passcode {
            frame = frame.header("passcode", passcode.as_str());
        }
        frame
    }

    /// The `SEND` frame for a publish
    pub fn send_frame(&self, topic: &str, payload: &[u8], receipt: &str) -> Frame {
        Frame::new("SEND")
            .header("destination", format!("{}{}", self.destination_prefix, topic))
            .header("content-type", "application/json")
            .header("content-length", payload.len().to_string())
            .header("receipt", receipt)
            .body(payload)
    }

    async fn publish(
        &self,
        connection: &mut StompConnection,
        topic: &str,
        payload: &[u8],
    ) -> Result<()> {
        connection.write_frame(&self.connect_frame()).await?;
        let reply = connection.read_frame().await?;
        expect_frame(&reply, "CONNECTED", topic)?;

        let receipt = Uuid::new_v4().to_string();
        connection
            .write_frame(&self.send_frame(topic, payload, &receipt))
            .await?;
        let reply = connection.read_frame().await?;
        expect_frame(&reply, "RECEIPT", topic)?;
        if reply.get("receipt-id") != Some(receipt.as_str()) {
            return Err(Error::Transport {
                topic: topic.to_string(),
                message: "broker acknowledged a different receipt".to_string(),
            });
        }

        if let Err(e) = connection.write_frame(&Frame::new("DISCONNECT")).await {
            warn!("Failed to disconnect cleanly from broker: {}", e);
        }
        Ok(())
    }
}

fn expect_frame(frame: &Frame, command: &str, topic: &str) -> Result<()> {
    if frame.command == command {
        return Ok(());
    }
    let message = if frame.command == "ERROR" {
        frame
            .get("message")
            .map(str::to_string)
            .unwrap_or_else(|| String::from_utf8_lossy(&frame.body).into_owned())
    } else {
        format!("expected {} frame, got {}", command, frame.command)
    };
    Err(Error::Transport {
        topic: topic.to_string(),
        message,
    })
}

#[async_trait]
impl BrokerTransport for StompTransport {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let mut connection = StompConnection::open(&self.endpoint)
            .await
            .map_err(|e| Error::Transport {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        let result = self.publish(&mut connection, topic, payload).await;
        connection.close().await;

        result.map_err(|e| match e {
            Error::Transport { .. } => e,
            other => Error::Transport {
                topic: topic.to_string(),
                message: other.to_string(),
            },
        })
    }
}
