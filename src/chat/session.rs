//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation
//! transcript, dispatches meta-commands, and drives streaming turns against a
//! [`ChatBackend`].

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;

use crate::chat::commands::{MetaCommand, help_text, parse_command};
use crate::chat::config::Config;
use crate::chat::interrupt::InterruptHandle;
use crate::client::{ChatBackend, ChatClient};
use crate::error::{Error, Result};
use crate::observability::{
    SESSION_COMMANDS, SESSION_TURNS, STREAM_CANCELLATIONS, STREAM_DURATION, STREAM_ERRORS,
};
use crate::render::Renderer;
use crate::tokens::TokenCounter;
use crate::types::{ChatCompletionParams, Message};

/// Whether a turn is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Waiting for the next line.
    Idle,
    /// A streaming request is open.
    AwaitingResponse,
}

/// What the driver should do after a line was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Prompt for the next line.
    Continue,
    /// Leave the REPL with status 0.
    Exit,
}

/// The result of a turn that reached the end of its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The assistant content committed to the transcript.
    pub response: String,
    /// True if the user interrupted the stream.
    pub interrupted: bool,
}

/// A chat session that manages conversation state and API interactions.
///
/// The system message is never stored in the transcript; it is rebuilt from
/// the config for every request.
pub struct ChatSession<B: ChatBackend = ChatClient> {
    backend: B,
    config: Config,
    transcript: Vec<Message>,
    tokens: TokenCounter,
    interrupts: Arc<InterruptHandle>,
    state: TurnState,
}

impl ChatSession<ChatClient> {
    /// Creates a session talking to the endpoint named by the config.
    pub fn from_config(config: Config, interrupts: Arc<InterruptHandle>) -> Result<Self> {
        let client = ChatClient::with_options(&config.api_key, config.base_url.as_deref(), None)?;
        Ok(Self::new(client, config, interrupts))
    }
}

impl<B: ChatBackend> ChatSession<B> {
    /// Creates a new chat session over the given backend.
    pub fn new(backend: B, config: Config, interrupts: Arc<InterruptHandle>) -> Self {
        Self {
            backend,
            config,
            transcript: Vec::new(),
            tokens: TokenCounter::new(),
            interrupts,
            state: TurnState::Idle,
        }
    }

    /// Evaluates one input line: a meta-command or a chat turn.
    ///
    /// Per-turn errors are reported through the renderer and never returned;
    /// the REPL keeps running regardless of what happened to the turn.
    pub async fn evaluate_line(&mut self, line: &str, renderer: &mut dyn Renderer) -> LineOutcome {
        let line = line.trim();

        if let Some(command) = parse_command(line) {
            SESSION_COMMANDS.click();
            return self.run_command(command, renderer);
        }

        if let Err(err) = self.send_streaming(line, renderer).await {
            renderer.print_error(&err.to_string());
        }
        LineOutcome::Continue
    }

    fn run_command(&mut self, command: MetaCommand, renderer: &mut dyn Renderer) -> LineOutcome {
        tracing::debug!(command = command.name(), "meta-command");
        match command {
            MetaCommand::Help => {
                renderer.print_info(&help_text());
            }
            MetaCommand::Clear => {
                self.clear();
                renderer.print_info("History cleared");
            }
            MetaCommand::History => match serde_json::to_string_pretty(&self.transcript) {
                Ok(json) => renderer.print_info(&json),
                Err(err) => renderer.print_error(&Error::from(err).to_string()),
            },
            MetaCommand::Config => {
                renderer.print_info(self.config.describe().trim_end());
            }
            MetaCommand::Exit => {
                renderer.print_info("Bye!");
                return LineOutcome::Exit;
            }
        }
        LineOutcome::Continue
    }

    /// Sends a user message and streams the response.
    ///
    /// This method:
    /// 1. Prints the token count of the input
    /// 2. Adds the user message to the transcript before any network traffic
    /// 3. Streams the response, rendering fragments as they arrive
    /// 4. Adds the (possibly partial or empty) assistant response to the
    ///    transcript, whether the stream finished, was interrupted, or failed
    ///
    /// # Errors
    ///
    /// Returns the stream error if the request or the stream failed. The
    /// transcript has already been completed when this happens.
    pub async fn send_streaming(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome> {
        SESSION_TURNS.click();
        self.print_token_count(renderer, "Token count", user_input);

        let user_message = Message::user(user_input);
        let params = ChatCompletionParams::new(
            self.config.model.clone(),
            self.config.temperature,
            self.config.top_p,
            self.request_messages(&user_message),
        );
        self.transcript.push(user_message);
        self.state = TurnState::AwaitingResponse;
        tracing::info!(
            model = %params.model,
            messages = params.messages.len(),
            "starting turn"
        );

        let start = Instant::now();
        let cancellation = self.interrupts.register();
        let token = cancellation.token().clone();

        let mut response = String::new();
        let mut failure: Option<Error> = None;
        let mut interrupted = false;

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.backend.stream(params) => Some(result),
        };

        match opened {
            None => interrupted = true,
            Some(Err(err)) => failure = Some(err),
            Some(Ok(mut stream)) => {
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            interrupted = true;
                            break;
                        }
                        next = stream.next() => match next {
                            Some(Ok(chunk)) => {
                                if let Some(content) = chunk.content().filter(|c| !c.is_empty()) {
                                    response.push_str(content);
                                    renderer.print_text(content);
                                }
                            }
                            Some(Err(err)) => {
                                failure = Some(err);
                                break;
                            }
                            None => break,
                        },
                    }
                }
                // Dropping the stream closes the connection.
                drop(stream);
            }
        }
        drop(cancellation);
        STREAM_DURATION.add(start.elapsed().as_secs_f64());

        renderer.finish_response();
        if interrupted {
            STREAM_CANCELLATIONS.click();
            renderer.print_interrupted();
        }

        self.print_token_count(renderer, "Response token count", &response);
        self.transcript.push(Message::assistant(response.clone()));
        self.state = TurnState::Idle;
        tracing::info!(
            bytes = response.len(),
            interrupted,
            failed = failure.is_some(),
            "finished turn"
        );

        match failure {
            Some(err) => {
                STREAM_ERRORS.click();
                tracing::warn!(error = %err, "chat completion stream failed");
                Err(err)
            }
            None => Ok(TurnOutcome {
                response,
                interrupted,
            }),
        }
    }

    /// The messages sent for a new user turn: system, transcript, new message.
    pub fn request_messages(&self, user_message: &Message) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.transcript.len() + 2);
        if let Some(context) = self.config.system_context.as_deref() {
            messages.push(Message::system(context));
        }
        messages.extend(self.transcript.iter().cloned());
        messages.push(user_message.clone());
        messages
    }

    fn print_token_count(&self, renderer: &mut dyn Renderer, label: &str, text: &str) {
        match self.tokens.count_tokens(&self.config.model, text) {
            Ok(count) => renderer.print_token_count(label, count),
            Err(err) => renderer.print_error(&format!("{label} unavailable: {err}")),
        }
    }

    /// Clears the conversation transcript.
    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// The conversation so far, oldest first.
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Returns the number of messages in the transcript.
    pub fn message_count(&self) -> usize {
        self.transcript.len()
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns whether a turn is in flight.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Returns the interrupt handle turns register with.
    pub fn interrupts(&self) -> &Arc<InterruptHandle> {
        &self.interrupts
    }
}
