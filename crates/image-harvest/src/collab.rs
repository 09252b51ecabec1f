//! Narrow interfaces to the collaborators around the pipeline.

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::message::Message;
use crate::types::{HarvestError, HarvestResult};

/// One-way channel to the rest of the extension.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: Message) -> HarvestResult<()>;
}

/// Sink backed by an unbounded tokio channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&self, message: Message) -> HarvestResult<()> {
        self.tx
            .send(message)
            .map_err(|e| HarvestError::Transport(format!("Receiver dropped: {e}")))
    }
}

/// "Is this string a fetchable absolute URL?"
pub trait UrlValidator: Send + Sync {
    fn is_valid(&self, reference: &str) -> bool;
}

/// Accepts absolute `http`/`https` URLs that name a host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpUrlValidator;

impl UrlValidator for HttpUrlValidator {
    fn is_valid(&self, reference: &str) -> bool {
        Url::parse(reference)
            .map(|u| {
                matches!(u.scheme(), "http" | "https")
                    && u.host_str().is_some_and(|h| !h.is_empty())
            })
            .unwrap_or(false)
    }
}

/// "Does the destination engine accept reference-by-URL searches?"
pub trait EngineCapabilities: Send + Sync {
    fn supports_url(&self, engine: &str) -> bool;
}

/// Known engines and whether each accepts an image URL instead of an upload.
pub const ENGINES: &[(&str, bool)] = &[
    ("google", true),
    ("bing", true),
    ("yandex", true),
    ("tineye", true),
    ("karmaDecay", true),
    ("saucenao", true),
    ("iqdb", true),
    ("ascii2d", true),
    ("baidu", false),
    ("sogou", false),
    ("shutterstock", false),
    ("pinterest", false),
    ("alamy", false),
    ("mailru", false),
];

/// Static engine table; unknown engines require uploads.
#[derive(Debug, Clone, Default)]
pub struct EngineTable {
    overrides: Vec<(String, bool)>,
}

impl EngineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override (or add) an engine entry.
    pub fn with_engine(mut self, engine: impl Into<String>, supports_url: bool) -> Self {
        self.overrides.push((engine.into(), supports_url));
        self
    }

    /// All known engines, overrides applied, in table order.
    pub fn entries(&self) -> Vec<(String, bool)> {
        let mut entries: Vec<(String, bool)> = ENGINES
            .iter()
            .map(|(name, url)| (name.to_string(), *url))
            .collect();
        for (name, url) in &self.overrides {
            match entries.iter_mut().find(|(n, _)| n == name) {
                Some(entry) => entry.1 = *url,
                None => entries.push((name.clone(), *url)),
            }
        }
        entries
    }
}

impl EngineCapabilities for EngineTable {
    fn supports_url(&self, engine: &str) -> bool {
        self.overrides
            .iter()
            .rev()
            .find(|(name, _)| name == engine)
            .map(|(_, url)| *url)
            .or_else(|| ENGINES.iter().find(|(name, _)| *name == engine).map(|(_, url)| *url))
            .unwrap_or(false)
    }
}
