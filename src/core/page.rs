// Positional pagination over ordered scan results.

pub const SEARCH_PAGE_SIZE: usize = 10;
pub const KEY_PAGE_SIZE: usize = 200;

/// One page of an ordered result sequence.
///
/// `next_page` is set only when the scan saw at least one item past this page.
/// Pages are a window over the scan performed at call time: a concurrent write
/// between two calls may shift items across page boundaries.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub next_page: Option<u64>,
}

/// Collects the `[page * size, page * size + size)` slice of a stream of items,
/// plus one look-ahead item to decide whether a next page exists.
#[derive(Debug)]
pub(crate) struct PageWindow<T> {
    page: u64,
    skip: usize,
    size: usize,
    items: Vec<T>,
    has_more: bool,
}

impl<T> PageWindow<T> {
    pub(crate) fn new(page: u64, size: usize) -> Self {
        let skip = usize::try_from(page)
            .ok()
            .and_then(|page| page.checked_mul(size))
            .unwrap_or(usize::MAX);
        Self {
            page,
            skip,
            size,
            items: Vec::with_capacity(size.min(64)),
            has_more: false,
        }
    }

    /// Offer the next item in scan order. Returns `false` once the window is
    /// complete and the caller can stop scanning.
    pub(crate) fn offer(&mut self, item: T) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            return true;
        }
        if self.items.len() < self.size {
            self.items.push(item);
            return true;
        }
        self.has_more = true;
        false
    }

    pub(crate) fn finish(self) -> Page<T> {
        let next_page = if self.has_more {
            self.page.checked_add(1)
        } else {
            None
        };
        Page {
            items: self.items,
            page: self.page,
            next_page,
        }
    }
}
