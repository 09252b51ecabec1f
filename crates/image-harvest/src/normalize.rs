//! Scheme-specific normalization passes.
//!
//! Each pass selects the candidates of one scheme, computes an [`Outcome`]
//! for each of them, and then rebuilds the list once. Candidates of other
//! schemes pass through untouched and keep their position.

use std::time::Duration;

use uuid::Uuid;

use crate::codec::{self, is_jpeg_extension, ImageKind};
use crate::collab::{EngineCapabilities, MessageSink, UrlValidator};
use crate::document::Document;
use crate::fetch::{FetchRequest, Fetcher};
use crate::filename::{extension_of, normalize_filename};
use crate::loader::{short, ImageLoader};
use crate::message::Message;
use crate::surface::Surface;
use crate::types::{Candidate, HarvestError, HarvestResult, Platform, Scheme};

/// What a pass decided for one selected candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Replace(Candidate),
    Drop,
}

/// Rebuild `candidates` from per-index outcomes; unlisted indices are kept as is.
pub(crate) fn rebuild(
    candidates: Vec<Candidate>,
    outcomes: Vec<(usize, Outcome)>,
) -> Vec<Candidate> {
    let mut decided: Vec<Option<Outcome>> = vec![None; candidates.len()];
    for (idx, outcome) in outcomes {
        if let Some(slot) = decided.get_mut(idx) {
            *slot = Some(outcome);
        }
    }

    candidates
        .into_iter()
        .zip(decided)
        .filter_map(|(candidate, outcome)| match outcome {
            None => Some(candidate),
            Some(Outcome::Replace(next)) => Some(next),
            Some(Outcome::Drop) => None,
        })
        .collect()
}

/// Indices and references of candidates whose raw `data` has the given scheme.
pub(crate) fn select(candidates: &[Candidate], scheme: Scheme) -> Vec<(usize, String)> {
    candidates
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| {
            c.data
                .as_deref()
                .filter(|d| Scheme::of(d) == scheme)
                .map(|d| (idx, d.to_string()))
        })
        .collect()
}

/// Remove later candidates that repeat an earlier raw reference.
pub fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| match c.data.as_deref() {
            Some(data) => seen.insert(data.to_string()),
            None => true,
        })
        .collect()
}

/// Re-encode embedded payloads; drop those that are not usable images.
pub fn normalize_embedded(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let selected = select(&candidates, Scheme::Embedded);
    let mut outcomes = Vec::with_capacity(selected.len());

    for (idx, data) in selected {
        let outcome = match codec::normalize_data_url(&data) {
            Ok(normalized) => Outcome::Replace(Candidate {
                filename: Some(normalize_filename(None, normalized.extension())),
                data: Some(normalized.data_url),
                ..candidates[idx].clone()
            }),
            Err(e) => {
                tracing::debug!("Dropping embedded candidate {}: {e}", short(&data));
                Outcome::Drop
            }
        };
        outcomes.push((idx, outcome));
    }

    rebuild(candidates, outcomes)
}

/// Draw-and-re-encode passes for references only meaningful inside the page.
pub struct SchemeNormalizer<'a> {
    loader: &'a ImageLoader<'a>,
}

impl<'a> SchemeNormalizer<'a> {
    pub fn new(loader: &'a ImageLoader<'a>) -> Self {
        Self { loader }
    }

    /// Re-encode `file:` references. Only applies to pages loaded from disk;
    /// elsewhere the list is returned unchanged.
    pub async fn normalize_local_files(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        if !self.loader.document().is_file_resident() {
            return candidates;
        }

        let selected = select(&candidates, Scheme::LocalFile);
        let mut surface = Surface::new();
        let mut outcomes = Vec::with_capacity(selected.len());

        for (idx, data) in selected {
            let ext = extension_of(&data);
            let kind = match ext.as_deref() {
                Some(e) if is_jpeg_extension(e) => ImageKind::Jpeg,
                _ => ImageKind::Png,
            };
            let name = data.rsplit('/').next().map(str::to_string);
            let outcome = self
                .redraw(&mut surface, &data, kind, name.as_deref())
                .await;
            outcomes.push((idx, outcome));
        }

        rebuild(candidates, outcomes)
    }

    /// Re-encode `blob:` references as PNG.
    pub async fn normalize_blobs(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let selected = select(&candidates, Scheme::Blob);
        let mut surface = Surface::new();
        let mut outcomes = Vec::with_capacity(selected.len());

        for (idx, data) in selected {
            let outcome = self.redraw(&mut surface, &data, ImageKind::Png, None).await;
            outcomes.push((idx, outcome));
        }

        rebuild(candidates, outcomes)
    }

    async fn redraw(
        &self,
        surface: &mut Surface,
        reference: &str,
        kind: ImageKind,
        name: Option<&str>,
    ) -> Outcome {
        let img = match self.loader.load(reference).await {
            Ok(img) => img,
            Err(e) => {
                tracing::debug!("Dropping unloadable {}: {e}", short(reference));
                return Outcome::Drop;
            }
        };

        surface.draw(&img);
        match surface.to_data_url(kind) {
            Ok(data_url) => Outcome::Replace(Candidate {
                data: Some(data_url),
                filename: Some(normalize_filename(name, kind.extension())),
                ..Candidate::default()
            }),
            Err(e) => {
                tracing::debug!("Dropping {} after re-encode failure: {e}", short(reference));
                Outcome::Drop
            }
        }
    }
}

/// Fetch-or-reference decision for validated remote URLs.
pub struct RemoteResolver<'a> {
    pub document: &'a Document,
    pub fetcher: &'a dyn Fetcher,
    pub sink: &'a dyn MessageSink,
    pub validator: &'a dyn UrlValidator,
    pub engines: &'a dyn EngineCapabilities,
    pub platform: Platform,
    pub timeout: Duration,
}

impl RemoteResolver<'_> {
    /// Resolve every candidate whose `data` is a valid absolute URL.
    ///
    /// When `must_upload` is set or `engine` cannot take a reference, the
    /// bytes are fetched and embedded; a failed fetch drops the candidate.
    /// Otherwise the candidate becomes a bare `{url}`. Only a failure to
    /// reach the referrer collaborator is returned as an error.
    pub async fn resolve(
        &self,
        candidates: Vec<Candidate>,
        engine: &str,
        must_upload: bool,
    ) -> HarvestResult<Vec<Candidate>> {
        let fetch = must_upload || !self.engines.supports_url(engine);
        let selected: Vec<(usize, String)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| c.data.as_deref().map(|d| (idx, d.to_string())))
            .filter(|(_, d)| self.validator.is_valid(d))
            .collect();

        let mut outcomes = Vec::with_capacity(selected.len());
        for (idx, url) in selected {
            let outcome = if fetch {
                self.embed(&url, must_upload).await?
            } else {
                Outcome::Replace(Candidate::url_only(url))
            };
            outcomes.push((idx, outcome));
        }

        Ok(rebuild(candidates, outcomes))
    }

    async fn embed(&self, url: &str, must_upload: bool) -> HarvestResult<Outcome> {
        let token = if self.platform.requires_referrer_token() {
            let token = Uuid::new_v4().to_string();
            self.sink
                .send(Message::SetRequestReferrer {
                    referrer: self.document.url().to_string(),
                    token: token.clone(),
                    url: url.to_string(),
                })
                .await?;
            Some(token)
        } else {
            None
        };

        let request = FetchRequest::new(url, self.timeout)
            .with_cookie(self.document.cookie())
            .with_referrer_token(token);
        let fetched = tokio::time::timeout(self.timeout, self.fetcher.fetch(&request))
            .await
            .unwrap_or(Err(HarvestError::Timeout(self.timeout.as_millis() as u64)));

        let normalized = match fetched.and_then(|bytes| codec::normalize_bytes(&bytes)) {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::debug!("Dropping remote candidate {}: {e}", short(url));
                return Ok(Outcome::Drop);
            }
        };

        Ok(Outcome::Replace(Candidate {
            filename: Some(normalize_filename(last_segment(url), normalized.extension())),
            data: Some(normalized.data_url),
            url: Some(url.to_string()),
            must_upload,
        }))
    }
}

fn last_segment(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, to_data_url};
    use crate::collab::{ChannelSink, EngineTable, HttpUrlValidator};
    use async_trait::async_trait;
    use base64::Engine;
    use image::DynamicImage;
    use std::sync::Mutex;
    use url::Url;

    struct NoNetwork;

    #[async_trait]
    impl Fetcher for NoNetwork {
        async fn fetch(&self, _request: &FetchRequest) -> HarvestResult<Vec<u8>> {
            Err(HarvestError::Fetch("offline".into()))
        }
    }

    fn png_data_url() -> String {
        to_data_url(&encode(&DynamicImage::new_rgb8(2, 2), ImageKind::Png).unwrap(), ImageKind::Png)
    }

    fn raws(refs: &[&str]) -> Vec<Candidate> {
        refs.iter().map(|r| Candidate::raw(*r)).collect()
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let out = dedup(raws(&["a", "b", "a", "c", "b"]));
        let data: Vec<_> = out.iter().map(|c| c.data.as_deref().unwrap()).collect();
        assert_eq!(data, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rebuild_applies_outcomes_in_place() {
        let out = rebuild(
            raws(&["a", "b", "c"]),
            vec![
                (0, Outcome::Drop),
                (2, Outcome::Replace(Candidate::raw("z"))),
                (9, Outcome::Drop),
            ],
        );
        let data: Vec<_> = out.iter().map(|c| c.data.as_deref().unwrap()).collect();
        assert_eq!(data, vec!["b", "z"]);
    }

    #[test]
    fn test_embedded_pass() {
        let png = png_data_url();
        let out = normalize_embedded(raws(&[
            "https://x/a.png",
            &png,
            "data:image/svg+xml,%3Csvg%3E%3C/svg%3E",
        ]));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].data.as_deref(), Some("https://x/a.png"));
        assert_eq!(out[1].data.as_deref(), Some(png.as_str()));
        assert!(out[1].filename.as_deref().unwrap().ends_with(".png"));
    }

    #[test]
    fn test_embedded_pass_is_a_fixed_point() {
        let bmp = {
            let mut buf = Vec::new();
            DynamicImage::new_rgb8(2, 2)
                .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Bmp)
                .unwrap();
            format!(
                "data:image/bmp;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(buf)
            )
        };
        let once = normalize_embedded(raws(&[&bmp]));
        let twice = normalize_embedded(once.clone());
        assert_eq!(once[0].data, twice[0].data);
    }

    #[tokio::test]
    async fn test_local_files_only_on_file_pages() {
        let dir = tempfile::tempdir().unwrap();
        let jpg_path = dir.path().join("b.jpg");
        DynamicImage::new_rgb8(3, 3).save(&jpg_path).unwrap();
        let jpg_url = Url::from_file_path(&jpg_path).unwrap().to_string();
        let missing = "file:///definitely/missing.png";

        let web = Document::new("https://example.com/");
        let loader = ImageLoader::new(&web, &NoNetwork, Duration::from_secs(1));
        let out = SchemeNormalizer::new(&loader)
            .normalize_local_files(raws(&[&jpg_url, missing]))
            .await;
        assert_eq!(out, raws(&[&jpg_url, missing]));

        let local = Document::new("file:///tmp/page.html");
        let loader = ImageLoader::new(&local, &NoNetwork, Duration::from_secs(1));
        let out = SchemeNormalizer::new(&loader)
            .normalize_local_files(raws(&["https://x/a.png", &jpg_url, missing]))
            .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].data.as_deref(), Some("https://x/a.png"));
        assert!(out[1].data.as_deref().unwrap().starts_with("data:image/jpeg;base64,"));
        let filename = out[1].filename.as_deref().unwrap();
        assert!(filename.starts_with("b_") && filename.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_blob_pass() {
        let png = encode(&DynamicImage::new_rgb8(2, 2), ImageKind::Png).unwrap();
        let json = serde_json::json!({
            "url": "https://example.com/",
            "blobs": { "blob:https://example.com/1": base64::engine::general_purpose::STANDARD.encode(png) },
            "root": { "tag": "html" }
        });
        let doc = Document::from_json(&json.to_string()).unwrap();
        let loader = ImageLoader::new(&doc, &NoNetwork, Duration::from_secs(1));
        let out = SchemeNormalizer::new(&loader)
            .normalize_blobs(raws(&["blob:https://example.com/1", "blob:https://example.com/2"]))
            .await;
        assert_eq!(out.len(), 1);
        assert!(out[0].data.as_deref().unwrap().starts_with("data:image/png;base64,"));
        assert!(out[0].filename.as_deref().unwrap().starts_with("image_"));
    }

    /// Serves a PNG for `/ok*` URLs and records every request it sees.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<FetchRequest>>,
    }

    #[async_trait]
    impl Fetcher for Recorder {
        async fn fetch(&self, request: &FetchRequest) -> HarvestResult<Vec<u8>> {
            self.seen.lock().unwrap().push(request.clone());
            if request.url.contains("/ok") {
                encode(&DynamicImage::new_rgb8(2, 2), ImageKind::Png)
            } else {
                Err(HarvestError::Fetch("nope".into()))
            }
        }
    }

    fn page() -> Document {
        let json = serde_json::json!({
            "url": "https://page.example/",
            "cookie": "sid=1",
            "root": { "tag": "html" }
        });
        Document::from_json(&json.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_remote_reference_only_when_engine_accepts_urls() {
        let doc = page();
        let fetcher = Recorder::default();
        let (sink, _rx) = ChannelSink::channel();
        let resolver = RemoteResolver {
            document: &doc,
            fetcher: &fetcher,
            sink: &sink,
            validator: &HttpUrlValidator,
            engines: &EngineTable::new(),
            platform: Platform::Gecko,
            timeout: Duration::from_secs(1),
        };

        let out = resolver
            .resolve(raws(&["https://img.example/ok.png", "relative.png"]), "google", false)
            .await
            .unwrap();
        assert_eq!(out[0], Candidate::url_only("https://img.example/ok.png"));
        assert_eq!(out[1], Candidate::raw("relative.png"));
        assert!(fetcher.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_fetch_embeds_and_drops_failures() {
        let doc = page();
        let fetcher = Recorder::default();
        let (sink, mut rx) = ChannelSink::channel();
        let resolver = RemoteResolver {
            document: &doc,
            fetcher: &fetcher,
            sink: &sink,
            validator: &HttpUrlValidator,
            engines: &EngineTable::new(),
            platform: Platform::Gecko,
            timeout: Duration::from_secs(1),
        };

        let out = resolver
            .resolve(
                raws(&["https://img.example/ok/cat.png?size=2", "https://img.example/gone.png"]),
                "google",
                true,
            )
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url.as_deref(), Some("https://img.example/ok/cat.png?size=2"));
        assert!(out[0].must_upload);
        assert!(out[0].data.as_deref().unwrap().starts_with("data:image/png;base64,"));
        assert!(out[0].filename.as_deref().unwrap().starts_with("cat_"));

        let seen = fetcher.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].cookie.as_deref(), Some("sid=1"));
        let token = seen[0].referrer_token.clone().unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Message::SetRequestReferrer {
                referrer: "https://page.example/".into(),
                token,
                url: "https://img.example/ok/cat.png?size=2".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_chromium_sends_no_referrer_token() {
        let doc = page();
        let fetcher = Recorder::default();
        let (sink, mut rx) = ChannelSink::channel();
        let resolver = RemoteResolver {
            document: &doc,
            fetcher: &fetcher,
            sink: &sink,
            validator: &HttpUrlValidator,
            engines: &EngineTable::new(),
            platform: Platform::Chromium,
            timeout: Duration::from_secs(1),
        };

        let out = resolver
            .resolve(raws(&["https://img.example/ok.png"]), "baidu", false)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].must_upload);
        assert!(fetcher.seen.lock().unwrap()[0].referrer_token.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("https://x/a/b.png?q=1#f"), Some("b.png"));
        assert_eq!(last_segment("https://x/a/"), None);
    }
}
