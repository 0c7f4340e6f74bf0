//! Paged memory: the shared page pool and LIFO paged resources.
//!
//! The page pool is the only allocator shared across tasks; every per-task
//! resource draws whole pages from it and returns them on release. A
//! [`LifoPagedMemoryResource`] hands out append-only byte ranges and supports
//! the checkpoint/rewind contract expression evaluation relies on: observe a
//! checkpoint, evaluate, copy the result into a durable location, rewind.

use std::sync::{Arc, Mutex, OnceLock};

/// Size of one pooled page.
pub const PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Global page source with a free list of recycled pages.
#[derive(Debug, Default)]
pub struct PagePool {
    free: Mutex<Vec<Box<[u8]>>>,
}

impl PagePool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires a page, recycling a released one when available.
    pub fn acquire(&self) -> Box<[u8]> {
        let mut free = self.free.lock().expect("poisoned");
        free.pop().unwrap_or_else(|| vec![0u8; PAGE_SIZE].into_boxed_slice())
    }

    /// Returns a page to the free list.
    pub fn release(&self, page: Box<[u8]>) {
        debug_assert_eq!(page.len(), PAGE_SIZE);
        self.free.lock().expect("poisoned").push(page);
    }

    /// Number of pages currently on the free list.
    pub fn free_pages(&self) -> usize {
        self.free.lock().expect("poisoned").len()
    }
}

static GLOBAL_POOL: OnceLock<Arc<PagePool>> = OnceLock::new();

/// The process-wide page pool.
pub fn global_page_pool() -> Arc<PagePool> {
    Arc::clone(GLOBAL_POOL.get_or_init(|| Arc::new(PagePool::new())))
}

/// Location of an allocation inside a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRef {
    page: usize,
    offset: usize,
    len: usize,
}

impl SliceRef {
    /// Length in bytes of the referenced range.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True for zero-length ranges.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Allocation mark used to rewind a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    page: usize,
    offset: usize,
}

/// The checkpoint of a freshly created resource.
pub const INITIAL_CHECKPOINT: Checkpoint = Checkpoint { page: 0, offset: 0 };

/// LIFO paged allocator backed by the page pool.
#[derive(Debug)]
pub struct LifoPagedMemoryResource {
    pool: Arc<PagePool>,
    pages: Vec<Box<[u8]>>,
    top: usize,
}

impl LifoPagedMemoryResource {
    /// Creates a resource drawing from `pool`.
    pub fn new(pool: Arc<PagePool>) -> Self {
        Self { pool, pages: Vec::new(), top: 0 }
    }

    /// Current allocation mark.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint { page: self.pages.len(), offset: self.top }
    }

    /// Releases every allocation made after `checkpoint`.
    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        debug_assert!(checkpoint.page <= self.pages.len());
        while self.pages.len() > checkpoint.page {
            let page = self.pages.pop().expect("page count checked");
            self.pool.release(page);
        }
        self.top = if self.pages.is_empty() { 0 } else { checkpoint.offset };
    }

    /// Copies `bytes` into the resource and returns its location.
    ///
    /// Allocations larger than the page size get a dedicated oversized page.
    pub fn append(&mut self, bytes: &[u8]) -> SliceRef {
        if bytes.len() > PAGE_SIZE {
            // dedicated page, not pooled
            let mut page = vec![0u8; bytes.len()].into_boxed_slice();
            page.copy_from_slice(bytes);
            self.pages.push(page);
            self.top = bytes.len();
            return SliceRef { page: self.pages.len() - 1, offset: 0, len: bytes.len() };
        }
        if self.pages.is_empty() || self.top + bytes.len() > self.current_page_len() {
            self.pages.push(self.pool.acquire());
            self.top = 0;
        }
        let page_index = self.pages.len() - 1;
        let offset = self.top;
        self.pages[page_index][offset..offset + bytes.len()].copy_from_slice(bytes);
        self.top += bytes.len();
        SliceRef { page: page_index, offset, len: bytes.len() }
    }

    /// Reads an allocation back.
    pub fn read(&self, slice: SliceRef) -> &[u8] {
        &self.pages[slice.page][slice.offset..slice.offset + slice.len]
    }

    /// Number of pages currently held.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn current_page_len(&self) -> usize {
        self.pages.last().map_or(0, |p| p.len())
    }
}

impl Drop for LifoPagedMemoryResource {
    fn drop(&mut self) {
        for page in self.pages.drain(..) {
            if page.len() == PAGE_SIZE {
                self.pool.release(page);
            }
        }
    }
}

/// Guard that rewinds a resource to the checkpoint observed at construction.
///
/// Used around expression evaluation when the result is copied out before the
/// guard drops.
pub struct CheckpointHolder<'a> {
    resource: &'a mut LifoPagedMemoryResource,
    checkpoint: Checkpoint,
}

impl<'a> CheckpointHolder<'a> {
    /// Observes the current checkpoint of `resource`.
    pub fn new(resource: &'a mut LifoPagedMemoryResource) -> Self {
        let checkpoint = resource.checkpoint();
        Self { resource, checkpoint }
    }

    /// The wrapped resource.
    pub fn resource(&mut self) -> &mut LifoPagedMemoryResource {
        self.resource
    }
}

impl Drop for CheckpointHolder<'_> {
    fn drop(&mut self) {
        self.resource.rewind(self.checkpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read() {
        let pool = Arc::new(PagePool::new());
        let mut res = LifoPagedMemoryResource::new(pool);
        let a = res.append(b"hello");
        let b = res.append(b"world");
        assert_eq!(res.read(a), b"hello");
        assert_eq!(res.read(b), b"world");
    }

    #[test]
    fn rewind_releases_pages_to_pool() {
        let pool = Arc::new(PagePool::new());
        let mut res = LifoPagedMemoryResource::new(Arc::clone(&pool));
        let cp = res.checkpoint();
        res.append(&vec![7u8; PAGE_SIZE / 2]);
        res.append(&vec![8u8; PAGE_SIZE / 2]);
        res.append(&vec![9u8; PAGE_SIZE / 2]);
        assert_eq!(res.page_count(), 2);
        res.rewind(cp);
        assert_eq!(res.page_count(), 0);
        assert_eq!(pool.free_pages(), 2);
        // pages are recycled on the next acquisition
        res.append(b"x");
        assert_eq!(pool.free_pages(), 1);
    }

    #[test]
    fn oversized_allocations_get_dedicated_pages() {
        let pool = Arc::new(PagePool::new());
        let mut res = LifoPagedMemoryResource::new(Arc::clone(&pool));
        let big = vec![1u8; PAGE_SIZE + 1];
        let r = res.append(&big);
        assert_eq!(res.read(r), big.as_slice());
        drop(res);
        // the oversized page is not recycled
        assert_eq!(pool.free_pages(), 0);
    }

    #[test]
    fn checkpoint_holder_rewinds_on_drop() {
        let pool = Arc::new(PagePool::new());
        let mut res = LifoPagedMemoryResource::new(pool);
        res.append(b"durable");
        let before = res.checkpoint();
        {
            let mut holder = CheckpointHolder::new(&mut res);
            holder.resource().append(b"scratch");
        }
        assert_eq!(res.checkpoint(), before);
    }
}
