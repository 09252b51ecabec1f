//! The `extract` command.

use std::sync::Arc;

use image_harvest::{
    Candidate, Harvester, Invocation, InvocationOrigin, MessageSink, Platform, Settings,
};

use crate::error::CliResult;
use crate::input::{load_document, resolve_target, PageSource};

/// Everything one `extract` run needs.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub source: PageSource,
    pub target_id: Option<String>,
    pub point: Option<(f64, f64)>,
    pub engine: String,
    pub origin: InvocationOrigin,
    pub platform: Platform,
    pub settings: Settings,
}

/// Load the page, run the pipeline, and report through `sink`.
pub async fn run_extract(
    options: ExtractOptions,
    sink: Arc<dyn MessageSink>,
) -> CliResult<Vec<Candidate>> {
    let document = load_document(&options.source)?;
    tracing::info!("Loaded {} ({} nodes)", document.url(), document.len());

    let target = resolve_target(&document, options.target_id.as_deref(), options.point);
    let harvester = Harvester::new(options.settings, sink).with_platform(options.platform);
    let invocation = Invocation {
        document: &document,
        target,
        origin: options.origin,
        engine: options.engine,
    };

    Ok(harvester.run(&invocation).await?)
}
