//! Streamed runs: one provider stream forwarded chunk by chunk.

use tether_core::error::{Error, Result};
use tether_core::message::{Attachment, Message};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::loop_runner::Agent;

/// Text chunks of a streamed answer. A failure arrives as one final `Err`.
pub type ChunkStream = mpsc::Receiver<Result<String>>;

const CHANNEL_CAPACITY: usize = 32;

impl Agent {
    /// Start a streamed run.
    ///
    /// Returns once the user turn is committed and the provider stream is
    /// open. Tools are not offered in this mode. The accumulated answer is
    /// persisted when the provider stream ends cleanly; a failure, a
    /// cancellation or a dropped receiver leaves the partial text unsaved.
    ///
    /// The history lock is held by the producer until it finishes, so the
    /// next call on this agent waits for the stream to complete.
    pub async fn run_stream(&self, input: &str, attachments: Vec<Attachment>) -> Result<ChunkStream> {
        self.run_stream_with_cancellation(input, attachments, CancellationToken::new())
            .await
    }

    /// [`run_stream`](Self::run_stream) with a token scoped to this call.
    ///
    /// Cancelling `token` stops only this stream. The agent's own token
    /// still stops it too. A token already cancelled refuses the call before
    /// any history is written.
    pub async fn run_stream_with_cancellation(
        &self,
        input: &str,
        attachments: Vec<Attachment>,
        token: CancellationToken,
    ) -> Result<ChunkStream> {
        self.ensure_active()?;
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut history = self.history.clone().lock_owned().await;
        self.ensure_active()?;
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        info!(agent = %self.name(), session = ?self.session_id(), "Streaming run started");

        self.prepare_step(&mut history, input, attachments).await?;
        let mut chunks = self.provider().stream(&history, &[]).await?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let store = self.store.clone();
        // Fires when either the agent or this call is cancelled.
        let cancel = self.cancel.child_token();
        let agent_name = self.name().to_string();

        tokio::spawn(async move {
            let cancel_call = async {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = token.cancelled() => {}
                }
            };
            tokio::pin!(cancel_call);

            let mut full_text = String::new();

            loop {
                let next = tokio::select! {
                    _ = &mut cancel_call => {
                        info!(agent = %agent_name, "Stream cancelled");
                        return;
                    }
                    next = chunks.recv() => next,
                };

                match next {
                    Some(Ok(chunk)) => {
                        full_text.push_str(&chunk);
                        let sent = tokio::select! {
                            _ = &mut cancel_call => {
                                info!(agent = %agent_name, "Stream cancelled");
                                return;
                            }
                            sent = tx.send(Ok(chunk)) => sent,
                        };
                        if sent.is_err() {
                            debug!(agent = %agent_name, "Stream receiver dropped");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        error!(agent = %agent_name, error = %e, "Provider stream failed");
                        let _ = tx.send(Err(Error::Provider(e))).await;
                        return;
                    }
                    None => break,
                }
            }

            let reply = Message::assistant(full_text);
            if let Some(store) = &store {
                if let Err(e) = store.save(&reply).await {
                    warn!(agent = %agent_name, error = %e, "Failed to persist streamed answer");
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
            debug!(agent = %agent_name, chars = reply.content.len(), "Stream completed");
            history.push(reply);
        });

        Ok(rx)
    }
}
