use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::storage::{Pager, PAGE_SIZE};

/// A B-tree node, one per page, serialized as a small JSON object. Leaf
/// nodes carry `values` (one posting per key: `(page_id, slot)` for a
/// unique index, or a list of such pairs for a non-unique/secondary index);
/// internal nodes carry `children` and no values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub is_leaf: bool,
    pub keys: Vec<Json>,
    #[serde(default)]
    pub children: Vec<u64>,
    #[serde(default)]
    pub values: Vec<Json>,
}

impl Node {
    pub fn empty_leaf() -> Node {
        Node {
            is_leaf: true,
            keys: Vec::new(),
            children: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn read(pager: &mut Pager, page_id: u64) -> Result<Node> {
        let raw = pager.read_page(page_id)?;
        let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if len == 0 {
            return Ok(Node::empty_leaf());
        }
        let payload = &raw[4..4 + len];
        let node: Node = serde_json::from_slice(payload)?;
        Ok(node)
    }

    pub fn write(&self, pager: &mut Pager, page_id: u64) -> Result<()> {
        let payload = serde_json::to_vec(self)?;
        if payload.len() + 4 > PAGE_SIZE {
            return Err(Error::Corruption("B-tree node too large for page".into()));
        }
        let mut page = vec![0u8; PAGE_SIZE];
        page[0..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        page[4..4 + payload.len()].copy_from_slice(&payload);
        pager.write_page(page_id, &page)
    }
}
