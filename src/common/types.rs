use std::fmt;

/// Page identifier type - uniquely identifies a page in the store.
/// Ids are handed out monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u64);

impl PageId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns true if this is the null link sentinel.
    pub fn is_null(&self) -> bool {
        *self == NULL_PAGE_ID
    }

    /// Decodes an on-disk link field, mapping the null sentinel to `None`.
    pub fn from_link(raw: u64) -> Option<PageId> {
        if raw == NULL_PAGE_ID.0 {
            None
        } else {
            Some(PageId(raw))
        }
    }

    /// Encodes an optional link into its on-disk representation.
    pub fn to_link(page_id: Option<PageId>) -> u64 {
        page_id.unwrap_or(NULL_PAGE_ID).0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

/// Sentinel used in prev/next link fields for "no page".
pub const NULL_PAGE_ID: PageId = PageId(u64::MAX);

/// Reserved id of the first page in a store. It holds the head of the
/// allocation bitmap chain.
pub const BOOT_PAGE_ID: PageId = PageId(0);

/// Transaction identifier, assigned by whoever hands out transaction handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn({})", self.0)
    }
}

/// Stable address of a string stored in a string heap: the page holding it
/// and the in-page byte offset of its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringPointer {
    pub page_id: PageId,
    pub offset: u32,
}

impl StringPointer {
    pub fn new(page_id: PageId, offset: u32) -> Self {
        Self { page_id, offset }
    }
}

impl fmt::Display for StringPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id.0, self.offset)
    }
}
