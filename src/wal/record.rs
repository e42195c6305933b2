use serde::{Deserialize, Serialize};

/// One line of the write-ahead log. Serialized as newline-delimited JSON so
/// the log can be inspected with any text tool and recovered by scanning
/// forward without a binary framing layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WalRecord {
    #[serde(rename = "BEGIN")]
    Begin { txn_id: u64 },
    #[serde(rename = "PAGE_WRITE")]
    PageWrite {
        txn_id: u64,
        page_id: u64,
        after_image: String,
    },
    #[serde(rename = "COMMIT")]
    Commit { txn_id: u64 },
}
