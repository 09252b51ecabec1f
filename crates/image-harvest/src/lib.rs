//! Image Harvest — discover, normalize, and report image candidates around a
//! touch point in a rendered page.

pub mod codec;
pub mod collab;
pub mod css;
pub mod document;
pub mod extract;
pub mod fetch;
pub mod filename;
pub mod html;
pub mod loader;
pub mod message;
pub mod normalize;
pub mod pipeline;
pub mod surface;
pub mod types;
pub mod walker;

pub use codec::{normalize_bytes, normalize_data_url, ImageKind, NormalizedImage};
pub use collab::{
    ChannelSink, EngineCapabilities, EngineTable, HttpUrlValidator, MessageSink, UrlValidator,
};
pub use document::{Document, Expansion, Node, NodeId, NodeKind, PageSnapshot};
pub use extract::NodeExtractor;
pub use fetch::{FetchRequest, Fetcher, HttpFetcher};
pub use filename::normalize_filename;
pub use html::parse_html;
pub use loader::ImageLoader;
pub use message::Message;
pub use pipeline::{Harvester, Invocation, FETCH_TIMEOUT, PROBE_TIMEOUT};
pub use types::*;
pub use walker::SpatialWalker;
