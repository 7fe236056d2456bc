//! Streaming response protocol
//!
//! Serializes one generation into an ordered sequence of frames: zero or
//! more token frames carrying newly produced text, then exactly one
//! terminal frame carrying the ranked context. On the wire each frame is
//! one JSON object per line (`text/event-stream`-compatible framing).

use futures::Stream;
use serde::{Deserialize, Serialize};

use super::TokenStream;
use crate::retriever::RetrievalResult;
use crate::{RagError, Result};

/// One frame of a streaming answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StreamFrame {
    /// Newly produced text; never empty, never re-sent
    Token { token: String, finished: bool },
    /// Terminal frame with the full ranked retrieval context
    Context {
        context: Vec<RetrievalResult>,
        finished: bool,
    },
}

impl StreamFrame {
    #[inline]
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token {
            token: token.into(),
            finished: false,
        }
    }

    #[inline]
    pub fn context(context: Vec<RetrievalResult>) -> Self {
        Self::Context {
            context,
            finished: true,
        }
    }

    /// True for the terminal context frame.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Context { .. })
    }

    /// Serialize as one newline-terminated JSON line.
    #[inline]
    pub fn to_ndjson_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to serialize frame: {}", e)))?;
        line.push('\n');
        Ok(line)
    }
}

enum StreamState {
    Streaming,
    Done,
}

/// State machine turning a [`TokenStream`] and its retrieval context
/// into protocol frames.
///
/// While streaming, each text increment becomes one token frame (empty
/// increments emit nothing). When generation is exhausted the terminal
/// context frame is emitted exactly once and the stream ends. If the
/// generation backend fails mid-stream, the failure surfaces as
/// [`RagError::GenerationInterrupted`] and no context frame follows.
/// Dropping the streamer cancels the underlying generation.
pub struct ResponseStreamer {
    tokens: TokenStream,
    context: Option<Vec<RetrievalResult>>,
    state: StreamState,
}

impl ResponseStreamer {
    #[inline]
    pub fn new(tokens: TokenStream, context: Vec<RetrievalResult>) -> Self {
        Self {
            tokens,
            context: Some(context),
            state: StreamState::Streaming,
        }
    }

    /// Next protocol frame, or `None` once the stream has terminated.
    #[inline]
    pub async fn next_frame(&mut self) -> Option<Result<StreamFrame>> {
        loop {
            if matches!(self.state, StreamState::Done) {
                return None;
            }

            match self.tokens.next().await {
                Some(Ok(token)) => {
                    if token.is_empty() {
                        // No empty-token frames
                        continue;
                    }
                    return Some(Ok(StreamFrame::token(token)));
                }
                Some(Err(err)) => {
                    self.state = StreamState::Done;
                    return Some(Err(RagError::GenerationInterrupted(err.to_string())));
                }
                None => {
                    self.state = StreamState::Done;
                    let context = self.context.take().unwrap_or_default();
                    return Some(Ok(StreamFrame::context(context)));
                }
            }
        }
    }

    /// Adapt the streamer into a `futures` stream of frames.
    #[inline]
    pub fn into_frames(self) -> impl Stream<Item = Result<StreamFrame>> {
        futures::stream::unfold(self, |mut streamer| async move {
            let frame = streamer.next_frame().await?;
            Some((frame, streamer))
        })
    }
}
