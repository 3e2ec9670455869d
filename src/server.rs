//! The relay server: accepts WebSocket connections from chat panels, forwards
//! user messages to the completion backend and answers with typed frames.
//!
//! Each connection is served by its own task and is strictly sequential: one
//! completion call is fully processed before the next inbound frame is read.
//! Connections share nothing; the backend is stateless per call.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::completion::CompletionBackend;
use crate::protocol::{ChatMessage, Kind};
use crate::tools::{self, FileTools};

const GREETING: &str =
    "Bonjour ! Je suis votre assistant IA. Comment puis-je vous aider aujourd'hui ?";

const COMPLETION_FAILURE_PREFIX: &str = "Désolé, je n'ai pas pu traiter votre demande.";

/// Upstream completion calls are bounded; expiry is surfaced to the client as
/// an error frame instead of hanging the connection.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<TcpStream>;

/// Bind the relay on `addr` and serve until the process is stopped. A bind
/// failure is the one fatal startup error.
pub async fn run<C>(addr: &str, backend: C, tools: FileTools) -> Result<()>
where
    C: CompletionBackend + Clone + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind relay server on {}", addr))?;
    info!("relay server listening on ws://{}", addr);
    serve_on(listener, backend, Arc::new(tools)).await
}

async fn serve_on<C>(listener: TcpListener, backend: C, tools: Arc<FileTools>) -> Result<()>
where
    C: CompletionBackend + Clone + 'static,
{
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept error: {}", e);
                continue;
            }
        };
        let backend = backend.clone();
        let tools = tools.clone();
        tokio::spawn(async move {
            info!("client connected from {}", peer);
            if let Err(e) = handle_connection(stream, peer, backend, tools).await {
                warn!("connection error from {}: {}", peer, e);
            }
        });
    }
}

async fn handle_connection<C>(
    stream: TcpStream,
    peer: SocketAddr,
    backend: C,
    tools: Arc<FileTools>,
) -> Result<()>
where
    C: CompletionBackend,
{
    let mut ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake failed")?;

    send(&mut ws, &ChatMessage::ai(GREETING)).await?;

    while let Some(frame) = ws.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("websocket error from {}: {}", peer, e);
                break;
            }
        };
        match frame {
            Message::Text(text) => handle_frame(&mut ws, &text, &backend, &tools).await?,
            Message::Ping(data) => ws.send(Message::Pong(data)).await?,
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!("client {} disconnected", peer);
    Ok(())
}

async fn handle_frame<C>(
    ws: &mut WsStream,
    raw: &str,
    backend: &C,
    tools: &FileTools,
) -> Result<()>
where
    C: CompletionBackend,
{
    let message = match ChatMessage::from_json(raw) {
        Ok(message) => message,
        Err(e) => {
            // Non-fatal: report and keep serving the connection.
            let reply = ChatMessage::error(format!("Format de message invalide : {e:#}"));
            return send(ws, &reply).await;
        }
    };

    // Only user messages have defined behavior; everything else is a no-op.
    if message.kind != Kind::User {
        debug!("ignoring inbound {:?} frame", message.kind);
        return Ok(());
    }
    debug!("user message: {}", truncate(&message.content, 80));

    let reply = match tokio::time::timeout(COMPLETION_TIMEOUT, backend.complete(&message.content))
        .await
    {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            warn!("completion failed: {:#}", e);
            let reply = ChatMessage::error(format!("{} {e:#}", COMPLETION_FAILURE_PREFIX));
            return send(ws, &reply).await;
        }
        Err(_) => {
            warn!("completion timed out after {:?}", COMPLETION_TIMEOUT);
            let reply = ChatMessage::error(format!(
                "{} Délai d'attente dépassé.",
                COMPLETION_FAILURE_PREFIX
            ));
            return send(ws, &reply).await;
        }
    };

    match tools::parse_invocation(&reply) {
        Some(invocation) => {
            // Forward the raw reply first so the panel can show a placeholder,
            // then run the tool and send its result as a separate frame.
            send(ws, &ChatMessage::ai(reply.clone())).await?;
            match tools.execute(&invocation) {
                Ok(output) => send(ws, &ChatMessage::tool_output(output)).await,
                Err(e) => {
                    warn!("tool {:?} failed: {:#}", invocation, e);
                    let reply = ChatMessage::error(
                        "Une erreur est survenue lors du traitement de votre message.",
                    );
                    send(ws, &reply).await
                }
            }
        }
        None => send(ws, &ChatMessage::ai(reply)).await,
    }
}

async fn send(ws: &mut WsStream, message: &ChatMessage) -> Result<()> {
    ws.send(Message::Text(message.to_json()?)).await?;
    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::future::Future;
    use tokio::net::TcpStream;
    use tokio_tungstenite::MaybeTlsStream;

    #[derive(Clone)]
    struct MockBackend {
        reply: String,
        fail: bool,
    }

    impl MockBackend {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                reply: String::new(),
                fail: true,
            }
        }
    }

    impl CompletionBackend for MockBackend {
        fn complete(&self, _prompt: &str) -> impl Future<Output = Result<String>> + Send {
            let reply = self.reply.clone();
            let fail = self.fail;
            async move {
                if fail {
                    Err(anyhow!("mock backend failure"))
                } else {
                    Ok(reply)
                }
            }
        }
    }

    type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start(backend: MockBackend, tools_dir: &std::path::Path) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let tools = Arc::new(FileTools::new(tools_dir).unwrap());
        tokio::spawn(serve_on(listener, backend, tools));
        format!("ws://{}", addr)
    }

    async fn connect(url: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        ws
    }

    async fn next_message(ws: &mut ClientWs) -> ChatMessage {
        loop {
            let frame = ws.next().await.expect("stream ended").unwrap();
            if let Message::Text(text) = frame {
                return ChatMessage::from_json(&text).unwrap();
            }
        }
    }

    async fn send_raw(ws: &mut ClientWs, raw: &str) {
        ws.send(Message::Text(raw.to_string())).await.unwrap();
    }

    #[tokio::test]
    async fn test_greeting_then_reply_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let url = start(MockBackend::replying("hi there"), dir.path()).await;
        let mut ws = connect(&url).await;

        let greeting = next_message(&mut ws).await;
        assert_eq!(greeting.kind, Kind::Ai);
        assert!(greeting.content.starts_with("Bonjour"));

        send_raw(&mut ws, r#"{"type":"user-message","content":"hello"}"#).await;
        let reply = next_message(&mut ws).await;
        assert_eq!(reply, ChatMessage::ai("hi there"));
    }

    #[tokio::test]
    async fn test_malformed_frame_reports_error_and_keeps_serving() {
        let dir = tempfile::tempdir().unwrap();
        let url = start(MockBackend::replying("still here"), dir.path()).await;
        let mut ws = connect(&url).await;
        next_message(&mut ws).await; // greeting

        send_raw(&mut ws, "not json").await;
        let error = next_message(&mut ws).await;
        assert_eq!(error.kind, Kind::Error);
        assert!(error.content.contains("Format de message invalide"));

        // The connection survives and the next valid frame is processed.
        send_raw(&mut ws, r#"{"type":"user-message","content":"hello"}"#).await;
        let reply = next_message(&mut ws).await;
        assert_eq!(reply, ChatMessage::ai("still here"));
    }

    #[tokio::test]
    async fn test_non_user_kinds_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let url = start(MockBackend::replying("only for users"), dir.path()).await;
        let mut ws = connect(&url).await;
        next_message(&mut ws).await; // greeting

        send_raw(&mut ws, r#"{"type":"status","content":"ping"}"#).await;
        send_raw(&mut ws, r#"{"type":"ai-message","content":"loopback"}"#).await;
        send_raw(&mut ws, r#"{"type":"user-message","content":"hello"}"#).await;

        // The first reply after the greeting answers the user message, which
        // proves the status and ai frames produced nothing.
        let reply = next_message(&mut ws).await;
        assert_eq!(reply, ChatMessage::ai("only for users"));
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_error_frame() {
        let dir = tempfile::tempdir().unwrap();
        let url = start(MockBackend::failing(), dir.path()).await;
        let mut ws = connect(&url).await;
        next_message(&mut ws).await; // greeting

        send_raw(&mut ws, r#"{"type":"user-message","content":"hello"}"#).await;
        let reply = next_message(&mut ws).await;
        assert_eq!(reply.kind, Kind::Error);
        assert!(reply.content.starts_with(COMPLETION_FAILURE_PREFIX));
        assert!(reply.content.contains("mock backend failure"));
    }

    #[tokio::test]
    async fn test_tool_invocation_reply_runs_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let invocation = r#"{"tool": "list_directory", "path": "."}"#;
        let url = start(MockBackend::replying(invocation), dir.path()).await;
        let mut ws = connect(&url).await;
        next_message(&mut ws).await; // greeting

        send_raw(&mut ws, r#"{"type":"user-message","content":"liste le dossier"}"#).await;

        // The raw assistant reply comes first, then the tool result.
        let raw_reply = next_message(&mut ws).await;
        assert_eq!(raw_reply.kind, Kind::Ai);
        assert!(raw_reply.content.contains("list_directory"));

        let output = next_message(&mut ws).await;
        assert_eq!(output.kind, Kind::ToolOutput);
        assert_eq!(output.content, "[FILE] a.txt");
    }
}
