//! The extraction pipeline: scan, dedup, normalize, validate, report.

use std::sync::Arc;
use std::time::Duration;

use crate::collab::{EngineCapabilities, EngineTable, HttpUrlValidator, MessageSink, UrlValidator};
use crate::document::{Document, NodeKind};
use crate::extract::NodeExtractor;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::loader::ImageLoader;
use crate::message::Message;
use crate::normalize::{self, RemoteResolver, SchemeNormalizer};
use crate::types::{
    Candidate, HarvestError, HarvestResult, InvocationOrigin, Platform, Settings, SpatialRegion,
    TouchTarget,
};
use crate::walker::SpatialWalker;

/// Timeout for fetching remote images that must be embedded.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for probing embed/object/frame sources during extraction.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Root element names of documents the pipeline knows how to scan.
const PAGE_ROOTS: &[&str] = &["html", "svg"];

/// Everything that varies per user gesture.
pub struct Invocation<'a> {
    pub document: &'a Document,
    pub target: Option<TouchTarget>,
    pub origin: InvocationOrigin,
    pub engine: String,
}

/// Runs the pipeline against injected collaborators.
pub struct Harvester {
    settings: Settings,
    platform: Platform,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn MessageSink>,
    validator: Arc<dyn UrlValidator>,
    engines: Arc<dyn EngineCapabilities>,
    fetch_timeout: Duration,
    probe_timeout: Duration,
}

impl Harvester {
    /// Create a harvester with the HTTP fetcher and the built-in engine table.
    pub fn new(settings: Settings, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            settings,
            platform: Platform::default(),
            fetcher: Arc::new(HttpFetcher::new()),
            sink,
            validator: Arc::new(HttpUrlValidator),
            engines: Arc::new(EngineTable::new()),
            fetch_timeout: FETCH_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn UrlValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_engines(mut self, engines: Arc<dyn EngineCapabilities>) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_timeouts(mut self, fetch: Duration, probe: Duration) -> Self {
        self.fetch_timeout = fetch;
        self.probe_timeout = probe;
        self
    }

    /// Run the pipeline and report the outcome to the sink.
    ///
    /// Exactly one of `pageParseSubmit` or `pageParseError` is sent. The
    /// candidates are also returned on success.
    pub async fn run(&self, invocation: &Invocation<'_>) -> HarvestResult<Vec<Candidate>> {
        match self.harvest(invocation).await {
            Ok(images) => {
                tracing::info!(
                    "Submitting {} candidates to engine '{}'",
                    images.len(),
                    invocation.engine
                );
                self.sink
                    .send(Message::PageParseSubmit {
                        engine: invocation.engine.clone(),
                        images: images.clone(),
                    })
                    .await?;
                Ok(images)
            }
            Err(e) => {
                tracing::error!("Page parse failed: {e}");
                self.sink.send(Message::PageParseError).await?;
                Err(e)
            }
        }
    }

    /// Produce the final candidate list without reporting it.
    pub async fn harvest(&self, invocation: &Invocation<'_>) -> HarvestResult<Vec<Candidate>> {
        let document = invocation.document;
        let target = invocation.target.ok_or(HarvestError::MissingTarget)?;

        let root_tag = document.get(document.root()).map_or("", |n| n.tag.as_str());
        if !PAGE_ROOTS.contains(&root_tag) {
            tracing::warn!("Unsupported document root <{root_tag}>, nothing to scan");
            return Ok(Vec::new());
        }

        let must_upload = self.settings.search_mode(invocation.origin).requires_upload();
        let loader = ImageLoader::new(document, self.fetcher.as_ref(), self.probe_timeout);
        let extractor = NodeExtractor::new(&loader);

        let mut candidates = extractor.extract(target.node).await?;
        tracing::info!("Target {} yielded {} candidates", target.node, candidates.len());

        let target_kind = document.node(target.node)?.kind;
        if target_kind != NodeKind::Image || self.settings.img_full_parse {
            let region = SpatialRegion::around(target.x, target.y, document.scroll());
            let walker = SpatialWalker::new(&extractor, region);
            let mut scanned = walker.walk(document.root()).await?;
            tracing::info!("Full scan yielded {} candidates", scanned.len());
            scanned.reverse();
            candidates.extend(scanned);
        }

        let candidates = normalize::dedup(candidates);
        tracing::debug!("{} candidates after dedup", candidates.len());

        let candidates = normalize::normalize_embedded(candidates);
        let schemes = SchemeNormalizer::new(&loader);
        let candidates = schemes.normalize_local_files(candidates).await;
        let candidates = schemes.normalize_blobs(candidates).await;

        let remote = RemoteResolver {
            document,
            fetcher: self.fetcher.as_ref(),
            sink: self.sink.as_ref(),
            validator: self.validator.as_ref(),
            engines: self.engines.as_ref(),
            platform: self.platform,
            timeout: self.fetch_timeout,
        };
        let mut candidates = remote
            .resolve(candidates, &invocation.engine, must_upload)
            .await?;

        let before = candidates.len();
        candidates.retain(Candidate::is_settled);
        if candidates.len() != before {
            tracing::debug!("Discarded {} unresolved candidates", before - candidates.len());
        }

        Ok(candidates)
    }
}
