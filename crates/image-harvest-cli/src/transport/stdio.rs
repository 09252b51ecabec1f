//! Stdout transport: one JSON message per line.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use image_harvest::{HarvestError, HarvestResult, Message, MessageSink};

use super::framing;

/// Writes framed messages to any async writer.
pub struct LineSink<W> {
    out: Mutex<W>,
}

/// The sink the binary uses; stdout stays reserved for messages.
pub type StdoutSink = LineSink<tokio::io::Stdout>;

impl StdoutSink {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W> MessageSink for LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: Message) -> HarvestResult<()> {
        let framed =
            framing::frame_message(&message).map_err(|e| HarvestError::Transport(e.to_string()))?;
        let mut out = self.out.lock().await;
        out.write_all(framed.as_bytes())
            .await
            .map_err(|e| HarvestError::Transport(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| HarvestError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_one_line_per_message() {
        let sink = LineSink::new(Vec::<u8>::new());
        sink.send(Message::SetRequestReferrer {
            referrer: "https://page.example/".into(),
            token: "t".into(),
            url: "https://img.example/a.png".into(),
        })
        .await
        .unwrap();
        sink.send(Message::PageParseError).await.unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<Message> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], Message::PageParseError);
    }
}
