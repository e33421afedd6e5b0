use crate::storage::page::RawPage;

/// Low bit of a node page's raw next link. B-tree nodes keep no sibling
/// links, so the rest of the field stays at its null value.
const LEAF_BIT: u64 = 1;

/// Whether a B-tree node holds only rows (leaf) or rows with child
/// pointers (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Internal,
}

impl NodeKind {
    /// Reads the kind from a raw next link.
    pub fn decode(raw_next: u64) -> Self {
        if raw_next & LEAF_BIT == LEAF_BIT {
            NodeKind::Leaf
        } else {
            NodeKind::Internal
        }
    }

    /// Returns `raw_next` with the kind bit set for this kind. All other
    /// bits are left as they are.
    pub fn encode(self, raw_next: u64) -> u64 {
        match self {
            NodeKind::Leaf => raw_next | LEAF_BIT,
            NodeKind::Internal => raw_next & !LEAF_BIT,
        }
    }

    pub fn is_leaf(self) -> bool {
        self == NodeKind::Leaf
    }
}

impl<B: AsRef<[u8]>> RawPage<B> {
    /// Kind of the B-tree node stored in this page. A freshly initialized
    /// page has a null next link and so reads as a leaf.
    pub fn node_kind(&self) -> NodeKind {
        NodeKind::decode(self.raw_next())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> RawPage<B> {
    pub fn set_node_kind(&mut self, kind: NodeKind) {
        let raw = kind.encode(self.raw_next());
        self.set_raw_next(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, NULL_PAGE_ID};
    use crate::storage::page::PageType;

    #[test]
    fn test_encode_decode() {
        let raw = NULL_PAGE_ID.as_u64();
        assert_eq!(NodeKind::decode(raw), NodeKind::Leaf);

        let internal = NodeKind::Internal.encode(raw);
        assert_eq!(internal, u64::MAX - 1);
        assert_eq!(NodeKind::decode(internal), NodeKind::Internal);
        assert_eq!(NodeKind::Leaf.encode(internal), raw);

        assert_eq!(NodeKind::decode(NodeKind::Leaf.encode(40)), NodeKind::Leaf);
        assert_eq!(NodeKind::Internal.encode(41), 40);
    }

    #[test]
    fn test_page_kind_roundtrip() {
        let mut buf = vec![0u8; 128];
        let mut page = RawPage::new(&mut buf[..]);
        page.init(PageId::new(3), PageType::Mixed);
        assert!(page.node_kind().is_leaf());

        page.set_node_kind(NodeKind::Internal);
        assert_eq!(page.node_kind(), NodeKind::Internal);
        // header fields other than the link are untouched
        assert_eq!(page.page_id(), PageId::new(3));
        assert_eq!(page.page_type().unwrap(), PageType::Mixed);

        page.set_node_kind(NodeKind::Leaf);
        assert_eq!(page.next_page_id(), None);
    }
}
