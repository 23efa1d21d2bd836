//! Progress events for per-page conversion.
//!
//! Attach an [`Arc<dyn PageProgress>`] with [`crate::Pipeline::with_progress`]
//! to observe a conversion as it runs. The CLI renders these events as an
//! indicatif progress bar; the server does not attach one.
//!
//! # Example
//!
//! ```rust
//! use edgequake_datasheet::PageProgress;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl PageProgress for Counter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num}/{total_pages}: {markdown_len} bytes");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the pipeline as it converts each page.
///
/// Pages run concurrently, so the page methods may be called from several
/// tasks at once. Every method defaults to a no-op.
pub trait PageProgress: Send + Sync {
    /// Called once the selected pages are known, before any model call.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the vision request for a page is sent.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's Markdown is back. `markdown_len` is in bytes.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {
        let _ = (page_num, total_pages, markdown_len);
    }

    /// Called when a page fails. The conversion stops after this.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page succeeded.
    fn on_conversion_complete(&self, total_pages: usize, tables_found: usize) {
        let _ = (total_pages, tables_found);
    }
}

/// Progress sink that ignores every event.
pub struct NoopProgress;

impl PageProgress for NoopProgress {}

/// Shared handle stored by [`crate::Pipeline`].
pub type ProgressHandle = Arc<dyn PageProgress>;
