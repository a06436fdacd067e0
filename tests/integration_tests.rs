//! End-to-end tests that drive a chat session against a local HTTP stub.
//! The live test at the bottom requires an API key in the environment.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use ai_repl::chat::{ChatSession, Config, InterruptHandle, LineOutcome, Renderer, TurnState};
    use ai_repl::{ChatBackend, ChatClient, ChatCompletionParams, Message, history};
    use futures::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct CaptureRenderer {
        text: String,
        info: Vec<String>,
        errors: Vec<String>,
        interrupted: bool,
        interrupt_on_text: Option<Arc<InterruptHandle>>,
    }

    impl Renderer for CaptureRenderer {
        fn print_text(&mut self, text: &str) {
            self.text.push_str(text);
            if let Some(interrupts) = &self.interrupt_on_text {
                interrupts.interrupt();
            }
        }

        fn print_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }

        fn print_info(&mut self, info: &str) {
            self.info.push(info.to_string());
        }

        fn finish_response(&mut self) {}

        fn print_interrupted(&mut self) {
            self.interrupted = true;
        }
    }

    fn sse_event(content: &str) -> String {
        let chunk = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4-1106-preview",
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}],
        });
        format!("data: {chunk}\n\n")
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).into_owned();
                }
            }
        }
        String::new()
    }

    /// Serves one request and returns the base URL plus the request body.
    async fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: String,
        hold_open: bool,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = tx.send(request);
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n"
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            if hold_open {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });
        (format!("http://{addr}/v1"), rx)
    }

    fn session_for(base_url: &str) -> ChatSession<ChatClient> {
        let mut config = Config::new("sk-test-key");
        config.base_url = Some(base_url.to_string());
        ChatSession::from_config(config, InterruptHandle::new()).unwrap()
    }

    #[tokio::test]
    async fn streamed_reply_is_rendered_and_committed() {
        let body = format!(
            "{}{}data: [DONE]\n\n",
            sse_event("Hi"),
            sse_event(" there")
        );
        let (base_url, request) = serve_once("200 OK", "text/event-stream", body, false).await;
        let mut session = session_for(&base_url);
        let mut renderer = CaptureRenderer::default();

        let outcome = session.evaluate_line("hello", &mut renderer).await;
        assert_eq!(outcome, LineOutcome::Continue);
        assert_eq!(renderer.text, "Hi there");
        assert!(renderer.errors.is_empty(), "{:?}", renderer.errors);
        assert_eq!(
            session.transcript(),
            &[Message::user("hello"), Message::assistant("Hi there")]
        );
        assert!(renderer.info.iter().any(|l| l.starts_with("Token count: ")));
        assert!(renderer.info.iter().any(|l| l.starts_with("Response token count: ")));

        let request: serde_json::Value = serde_json::from_str(&request.await.unwrap()).unwrap();
        assert_eq!(request["stream"], true);
        assert_eq!(request["model"], "gpt-4-1106-preview");
        assert_eq!(request["messages"][0]["role"], "user");
        assert_eq!(request["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn client_stream_yields_chunks() {
        let body = format!("{}data: [DONE]\n\n", sse_event("pong"));
        let (base_url, _request) = serve_once("200 OK", "text/event-stream", body, false).await;
        let client = ChatClient::with_options("sk-test-key", Some(&base_url), None).unwrap();
        let params = ChatCompletionParams::new(
            "gpt-4-1106-preview",
            0.7,
            1.0,
            vec![Message::user("ping")],
        );
        let chunks: Vec<_> = client.stream(params).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().content(), Some("pong"));
    }

    #[tokio::test]
    async fn rejected_request_reports_error() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        let (base_url, _request) =
            serve_once("401 Unauthorized", "application/json", body.to_string(), false).await;
        let mut session = session_for(&base_url);
        let mut renderer = CaptureRenderer::default();

        let err = session
            .send_streaming("hello", &mut renderer)
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("Incorrect API key"));
        assert_eq!(
            session.transcript(),
            &[Message::user("hello"), Message::assistant("")]
        );
    }

    #[tokio::test]
    async fn interrupt_mid_stream_keeps_partial_reply() {
        let (base_url, _request) =
            serve_once("200 OK", "text/event-stream", sse_event("partial"), true).await;
        let mut session = session_for(&base_url);
        let mut renderer = CaptureRenderer {
            interrupt_on_text: Some(Arc::clone(session.interrupts())),
            ..CaptureRenderer::default()
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            session.send_streaming("tell me a story", &mut renderer),
        )
        .await
        .expect("interrupted turn should finish promptly")
        .unwrap();
        assert!(outcome.interrupted);
        assert!(renderer.interrupted);
        assert_eq!(outcome.response, "partial");
        assert_eq!(session.state(), TurnState::Idle);
        assert_eq!(
            session.transcript(),
            &[
                Message::user("tell me a story"),
                Message::assistant("partial")
            ]
        );
    }

    #[tokio::test]
    async fn next_turn_after_interrupt_is_not_cancelled() {
        let (base_url, _request) =
            serve_once("200 OK", "text/event-stream", sse_event("partial"), true).await;
        let mut session = session_for(&base_url);
        let mut renderer = CaptureRenderer {
            interrupt_on_text: Some(Arc::clone(session.interrupts())),
            ..CaptureRenderer::default()
        };
        session
            .send_streaming("first", &mut renderer)
            .await
            .unwrap();

        let body = format!("{}data: [DONE]\n\n", sse_event("second reply"));
        let (base_url, _request) = serve_once("200 OK", "text/event-stream", body, false).await;
        let mut config = session.config().clone();
        config.base_url = Some(base_url);
        let interrupts = Arc::clone(session.interrupts());
        let mut next = ChatSession::from_config(config, interrupts).unwrap();
        let mut renderer = CaptureRenderer::default();
        let outcome = next.send_streaming("second", &mut renderer).await.unwrap();
        assert!(!outcome.interrupted);
        assert_eq!(outcome.response, "second reply");
    }

    #[tokio::test]
    async fn stream_failure_keeps_partial_reply() {
        let body = format!("{}data: {{not json\n\n", sse_event("half"));
        let (base_url, _request) = serve_once("200 OK", "text/event-stream", body, false).await;
        let mut session = session_for(&base_url);
        let mut renderer = CaptureRenderer::default();

        session.evaluate_line("hello", &mut renderer).await;
        assert_eq!(renderer.errors.len(), 1);
        assert_eq!(
            session.transcript(),
            &[Message::user("hello"), Message::assistant("half")]
        );
    }

    #[tokio::test]
    async fn meta_commands_never_touch_the_network() {
        // Nothing listens on this port; any request would fail with an error.
        let mut session = session_for("http://127.0.0.1:9/v1");
        let mut renderer = CaptureRenderer::default();
        for line in [".help", ".config", ".history", ".clear"] {
            assert_eq!(
                session.evaluate_line(line, &mut renderer).await,
                LineOutcome::Continue
            );
        }
        assert!(renderer.errors.is_empty());
        assert_eq!(session.message_count(), 0);
        assert!(renderer.info.iter().any(|l| l.contains("sk-...-key")));
        assert!(!renderer.info.iter().any(|l| l.contains("sk-test-key")));
        assert_eq!(
            session.evaluate_line(".exit", &mut renderer).await,
            LineOutcome::Exit
        );
        assert_eq!(renderer.info.last().map(String::as_str), Some("Bye!"));
    }

    #[tokio::test]
    async fn config_and_history_files() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{"apiKey": "sk-abc", "systemContext": "Be terse.", "topP": 0.9}"#,
        )
        .unwrap();
        let mut config = Config::load(&config_path).unwrap();
        assert_eq!(config.system_context.as_deref(), Some("Be terse."));
        assert_eq!(config.top_p, 0.9);
        assert!(config.history_path.is_none());
        assert!(config.resolve_history_path().ends_with("ai-repl-history"));

        let history_path = dir.path().join("history");
        let lines = vec!["hello".to_string(), ".config".to_string()];
        history::save(&history_path, &lines).await.unwrap();
        assert_eq!(history::load(&history_path).await.unwrap(), lines);
    }

    #[tokio::test]
    async fn live_streaming_request() {
        let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
            eprintln!("Skipping test: OPENAI_API_KEY not set");
            return;
        };
        let config = Config::new(api_key).with_model("gpt-3.5-turbo");
        let mut session = ChatSession::from_config(config, InterruptHandle::new()).unwrap();
        let mut renderer = CaptureRenderer::default();
        let outcome = session
            .send_streaming("Say 'test passed'", &mut renderer)
            .await
            .expect("streaming request should succeed with a valid API key");
        assert!(!outcome.response.is_empty());
    }
}
