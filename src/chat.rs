use crate::ai::ChatModel;
use crate::db::{execute_query, extract_sql, Connector};
use crate::error::{Error, Result};
use crate::session::{Transcript, Turn};
use futures::StreamExt;
use std::sync::Arc;

/// Runs one interaction cycle against a transcript: record the user's input,
/// stream the model's reply, then run whatever SQL the reply contains.
pub struct ConversationDriver {
    model: Arc<dyn ChatModel>,
    connector: Arc<dyn Connector>,
}

impl ConversationDriver {
    pub fn new(model: Arc<dyn ChatModel>, connector: Arc<dyn Connector>) -> Self {
        Self { model, connector }
    }

    /// Returns the new assistant turn, or `None` when the transcript already
    /// ends with one. `on_fragment` sees every streamed fragment in order.
    ///
    /// A model failure leaves the transcript without an assistant turn, so the
    /// next interaction asks again.
    pub async fn interact<F>(
        &self,
        transcript: &mut Transcript,
        input: &str,
        on_fragment: F,
    ) -> Result<Option<Turn>>
    where
        F: FnMut(&str) + Send,
    {
        if transcript.push_user(input) {
            tracing::info!(turns = transcript.len(), "user turn recorded");
        }
        if !transcript.needs_reply() {
            return Ok(None);
        }

        let reply = self.stream_reply(transcript, on_fragment).await?;
        let turn = self.answer(reply).await;
        Ok(Some(transcript.push_assistant(turn).clone()))
    }

    async fn stream_reply<F>(&self, transcript: &Transcript, mut on_fragment: F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let mut fragments = self.model.stream_chat(&transcript.messages()).await?;
        let mut response = String::new();

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            response.push_str(&fragment);
            on_fragment(&fragment);
        }

        tracing::debug!(chars = response.len(), "model reply complete");
        Ok(response)
    }

    /// Build the assistant turn for `reply`, attaching query results or the
    /// reason the query failed.
    pub async fn answer(&self, reply: String) -> Turn {
        let mut turn = Turn::assistant(reply);

        let Some(sql) = extract_sql(&turn.content).map(str::to_string) else {
            tracing::debug!("reply carries no SQL block");
            return turn;
        };

        tracing::debug!(%sql, "running SQL from reply");
        match execute_query(self.connector.as_ref(), &sql).await {
            Ok(results) => {
                tracing::info!(
                    rows = results.row_count,
                    elapsed_ms = results.execution_time_ms as u64,
                    "query from reply succeeded"
                );
                turn.results = Some(results);
            }
            Err(e) => {
                tracing::warn!(error = %e, "query from reply failed");
                let cause = match e {
                    Error::Query(message) => message,
                    other => other.to_string(),
                };
                turn.error = Some(format!("That query could not be run: {}", cause));
            }
        }
        turn
    }
}
