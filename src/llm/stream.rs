// Streaming completions
//
// A stream is a finite, non-restartable sequence of chunks delivered over an
// mpsc channel. When an attempt breaks mid-stream the producer emits
// `StreamChunk::Restart` and replays the request from the beginning; consumers
// must throw away everything they received before the marker.

use tokio::sync::mpsc;

use super::ClientError;

/// One item of a streamed completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Incremental text
    Text(String),
    /// The previous attempt failed; discard partial output
    Restart,
}

/// Receiving half of a streamed completion
pub struct TextStream {
    rx: mpsc::Receiver<Result<StreamChunk, ClientError>>,
}

impl TextStream {
    pub fn new(rx: mpsc::Receiver<Result<StreamChunk, ClientError>>) -> Self {
        Self { rx }
    }

    /// Create a connected sender/stream pair
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<StreamChunk, ClientError>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }

    /// Next chunk, or `None` once the stream is finished.
    ///
    /// Dropping the stream stops consumption; the producer notices on its next send.
    pub async fn next(&mut self) -> Option<Result<StreamChunk, ClientError>> {
        self.rx.recv().await
    }

    /// Concatenate the final attempt's text
    pub async fn collect_text(mut self) -> Result<String, ClientError> {
        let mut text = String::new();
        while let Some(item) = self.next().await {
            match item? {
                StreamChunk::Text(delta) => text.push_str(&delta),
                StreamChunk::Restart => {
                    tracing::debug!("[STREAM] restart, dropping {} buffered chars", text.len());
                    text.clear();
                }
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_concatenates() {
        let (tx, stream) = TextStream::channel(8);
        tx.send(Ok(StreamChunk::Text("Hel".into()))).await.unwrap();
        tx.send(Ok(StreamChunk::Text("lo".into()))).await.unwrap();
        drop(tx);
        assert_eq!(stream.collect_text().await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_restart_discards_partial_output() {
        let (tx, stream) = TextStream::channel(8);
        tx.send(Ok(StreamChunk::Text("partial gar".into()))).await.unwrap();
        tx.send(Ok(StreamChunk::Restart)).await.unwrap();
        tx.send(Ok(StreamChunk::Text("complete".into()))).await.unwrap();
        drop(tx);
        assert_eq!(stream.collect_text().await.unwrap(), "complete");
    }

    #[tokio::test]
    async fn test_error_item_fails_collection() {
        let (tx, stream) = TextStream::channel(8);
        tx.send(Ok(StreamChunk::Text("x".into()))).await.unwrap();
        tx.send(Err(ClientError::InvalidResponse {
            attempts: 3,
            reason: "empty".into(),
        }))
        .await
        .unwrap();
        drop(tx);
        assert!(matches!(
            stream.collect_text().await,
            Err(ClientError::InvalidResponse { .. })
        ));
    }
}
