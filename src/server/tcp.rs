//! Line-delimited JSON protocol over TCP
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! → {"cmd":"chat","message":"What is 6 divided by 3?"}
//! ← {"ok":true,"provider":"local_tool","reply":"2.0",...}
//! ```
//!
//! Every response carries an `ok` flag; failures add an `error` code. A line
//! longer than `MAX_LINE_BYTES` gets a `line_too_long` error and the
//! connection is closed.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, info_span, warn, Instrument};

use super::{ProtocolError, ServiceContext};
use crate::router::{ChatRequest, ChatRouter};
use crate::status;

/// Longest accepted request line, excluding the newline
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Accept connections until the listener fails permanently
pub async fn serve(listener: TcpListener, ctx: ServiceContext) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "Line protocol server listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept error");
                // Back off briefly so fd exhaustion does not spin the loop
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let ctx = ctx.clone();
        let span = info_span!("connection", peer = %peer);
        tokio::spawn(handle_connection(stream, peer, ctx).instrument(span));
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: ServiceContext) {
    debug!("Client connected");
    let router = ctx.routers.resolve();
    let recipient = peer.to_string();

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64 + 1);
        match limited.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Read failed, dropping connection");
                break;
            }
        }

        if line.len() > MAX_LINE_BYTES && line.last() != Some(&b'\n') {
            warn!(limit = MAX_LINE_BYTES, "Request line too long, closing connection");
            if let Err(e) = send_line(&mut writer, &ProtocolError::LineTooLong.to_response()).await {
                debug!(error = %e, "Client disconnected before response was delivered");
            }
            break;
        }

        let response = match parse_line(&line) {
            Ok(Some(payload)) => handle_command(&payload, &router, &ctx, &recipient).await,
            Ok(None) => continue,
            Err(e) => e.to_response(),
        };

        if let Err(e) = send_line(&mut writer, &response).await {
            debug!(error = %e, "Client disconnected before response was delivered");
            break;
        }
    }

    debug!("Client disconnected");
}

/// Decode one raw line. Blank lines yield `Ok(None)`.
pub fn parse_line(raw: &[u8]) -> Result<Option<Map<String, Value>>, ProtocolError> {
    let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidEncoding)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(payload)) => Ok(Some(payload)),
        Ok(_) => Err(ProtocolError::InvalidMessageType),
        Err(_) => Err(ProtocolError::InvalidJson),
    }
}

/// Dispatch one decoded request to the router, sandbox or status module
pub async fn handle_command(
    payload: &Map<String, Value>,
    router: &ChatRouter,
    ctx: &ServiceContext,
    recipient: &str,
) -> Value {
    let field = |name: &str| payload.get(name).and_then(Value::as_str);

    match field("cmd") {
        Some("ping") => json!({ "ok": true, "reply": "pong" }),
        Some("chat") => {
            let Some(message) = field("message") else {
                return ProtocolError::InvalidPayload.to_response();
            };
            let mut request = ChatRequest::new(message).with_recipient(recipient);
            if let Some(request_id) = field("request_id") {
                request = request.with_request_id(request_id);
            }
            with_ok(serde_json::to_value(router.route_chat(request).await))
        }
        Some("run") => {
            if field("language") != Some("python") {
                return ProtocolError::UnsupportedLanguage.to_response();
            }
            let Some(code) = field("code") else {
                return ProtocolError::InvalidPayload.to_response();
            };
            serde_json::to_value(ctx.runner.run(code, &ctx.sandbox_policy).await)
                .unwrap_or_else(|e| internal_error(&e))
        }
        Some("status") => status_response(status::status_report(&ctx.changelog)),
        Some("get_phase_1_status") => status_response(status::phase_1_status(&ctx.changelog)),
        Some("get_phase_2_status") => status_response(status::phase_2_status(&ctx.changelog)),
        Some("get_phase_3_status") => status_response(status::phase_3_status(&ctx.changelog)),
        _ => ProtocolError::UnknownCommand.to_response(),
    }
}

fn status_response(status: impl serde::Serialize) -> Value {
    match serde_json::to_value(status) {
        Ok(status) => json!({ "ok": true, "status": status }),
        Err(e) => internal_error(&e),
    }
}

/// Merge `ok: true` into a serialized result object
fn with_ok(value: serde_json::Result<Value>) -> Value {
    match value {
        Ok(Value::Object(mut fields)) => {
            fields.insert("ok".to_string(), Value::Bool(true));
            Value::Object(fields)
        }
        Ok(other) => json!({ "ok": true, "result": other }),
        Err(e) => internal_error(&e),
    }
}

fn internal_error(e: &serde_json::Error) -> Value {
    warn!(error = %e, "Failed to serialize response");
    json!({ "ok": false, "error": "internal_error" })
}

async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, response: &Value) -> std::io::Result<()> {
    let mut line = response.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_classifies_errors() {
        assert_eq!(parse_line(b"\xff\xfe\n"), Err(ProtocolError::InvalidEncoding));
        assert_eq!(parse_line(b"{not json\n"), Err(ProtocolError::InvalidJson));
        assert_eq!(parse_line(b"[1, 2]\n"), Err(ProtocolError::InvalidMessageType));
        assert_eq!(parse_line(b"   \r\n"), Ok(None));
    }

    #[test]
    fn test_parse_line_accepts_object() {
        let payload = parse_line(b"{\"cmd\":\"ping\"}\n").unwrap().unwrap();
        assert_eq!(payload["cmd"], "ping");
    }

    #[test]
    fn test_with_ok_merges_flag() {
        let value = with_ok(Ok(json!({ "reply": "hi" })));
        assert_eq!(value["ok"], true);
        assert_eq!(value["reply"], "hi");
    }
}
