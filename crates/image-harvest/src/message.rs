//! Messages exchanged with the surrounding extension components.

use serde::{Deserialize, Serialize};

use crate::types::Candidate;

/// One message on the collaborator channel, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Message {
    /// Ask the privileged side to apply `referrer` to requests carrying `token`.
    SetRequestReferrer {
        referrer: String,
        token: String,
        url: String,
    },
    PageParseSubmit {
        engine: String,
        images: Vec<Candidate>,
    },
    PageParseError,
}
