//! Page selection: turn page-spec strings and numeric bounds into the ordered
//! list of 1-based page numbers to render.
//!
//! A page spec is a comma-separated list of `N` and `N-M` tokens, e.g.
//! `"1,3,5-7"`. Parsing is lenient: tokens that are not numbers, or that fall
//! outside the document, are dropped rather than reported. Only an empty
//! final selection is an error.

use crate::error::DatasheetError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Which pages of a paginated document to convert (1-indexed, inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelection {
    /// First page to consider. Values below 1 are treated as 1.
    pub start: usize,
    /// Last page to consider. `None` means the end of the document.
    pub end: Option<usize>,
    /// Include spec. Empty means "every page in `start..=end`".
    pub include: String,
    /// Exclude spec, applied after everything else.
    pub exclude: String,
}

impl Default for PageSelection {
    fn default() -> Self {
        Self {
            start: 1,
            end: None,
            include: String::new(),
            exclude: String::new(),
        }
    }
}

/// The outcome of [`PageSelection::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPages {
    pub first_page: usize,
    pub last_page: usize,
    /// Strictly increasing, never empty.
    pub pages: Vec<usize>,
}

impl PageSelection {
    /// Resolve the selection against a document with `total_pages` pages.
    ///
    /// `max_pages` caps the window that starts at `start`:
    /// `last = min(total, start + max_pages - 1, end)` and
    /// `first = min(max(1, start), last)`. When an include spec yields pages,
    /// only those inside `[first, last]` survive; otherwise the whole window
    /// is taken. Excluded pages are removed last.
    ///
    /// # Errors
    /// [`DatasheetError::NoPagesSelected`] when nothing remains.
    pub fn resolve(
        &self,
        total_pages: usize,
        max_pages: Option<usize>,
    ) -> Result<ResolvedPages, DatasheetError> {
        let start = self.start.max(1);
        let mut last_page = total_pages;
        if let Some(max) = max_pages {
            last_page = last_page.min(start.saturating_add(max).saturating_sub(1));
        }
        if let Some(end) = self.end {
            last_page = last_page.min(end);
        }
        let first_page = start.min(last_page);

        let include = parse_page_spec(&self.include, total_pages);
        let exclude: BTreeSet<usize> = parse_page_spec(&self.exclude, total_pages)
            .into_iter()
            .collect();

        let in_window = |p: &usize| last_page > 0 && *p >= first_page && *p <= last_page;

        let pages: Vec<usize> = if include.is_empty() {
            (first_page.max(1)..=last_page)
                .filter(|p| !exclude.contains(p))
                .collect()
        } else {
            include
                .into_iter()
                .filter(|p| in_window(p) && !exclude.contains(p))
                .collect()
        };

        debug!(
            "Page selection {}..={} of {} → {:?}",
            first_page, last_page, total_pages, pages
        );

        if pages.is_empty() {
            return Err(DatasheetError::NoPagesSelected { total_pages });
        }

        Ok(ResolvedPages {
            first_page,
            last_page,
            pages,
        })
    }
}

/// Parse a page spec into a sorted, deduplicated list of pages in `[1, total_pages]`.
///
/// Tokens are `N`, `N-M` (reversed ranges are swapped) or `all`. Whitespace
/// and case are ignored; anything unparsable is skipped.
pub fn parse_page_spec(spec: &str, total_pages: usize) -> Vec<usize> {
    let mut pages = BTreeSet::new();

    for token in spec.split(',') {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            continue;
        }
        if token == "all" {
            pages.extend(1..=total_pages);
            continue;
        }

        let (lo, hi) = match token.split_once('-') {
            Some((a, b)) => match (a.trim().parse::<usize>(), b.trim().parse::<usize>()) {
                (Ok(a), Ok(b)) => (a.min(b), a.max(b)),
                _ => continue,
            },
            None => match token.parse::<usize>() {
                Ok(n) => (n, n),
                Err(_) => continue,
            },
        };

        let lo = lo.max(1);
        let hi = hi.min(total_pages);
        if lo <= hi {
            pages.extend(lo..=hi);
        }
    }

    pages.into_iter().collect()
}
