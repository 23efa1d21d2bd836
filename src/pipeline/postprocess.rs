//! Post-processing: clean each page's model answer and assemble the document.
//!
//! Even a well-prompted model sometimes wraps its tables in a code fence,
//! uses CRLF line endings, forgets the GFM separator row or sprinkles
//! zero-width spaces into cells. [`clean_page`] fixes those with cheap,
//! deterministic string rules that never touch cell content. [`assemble`]
//! then drops "no tables" pages and joins the survivors in page order.
//!
//! Rule order matters: fences are stripped before line endings are
//! normalised, and table repair runs on clean, trimmed lines.

use crate::output::PageMarkdown;
use crate::prompts::{NO_TABLES_IN_DOCUMENT, NO_TABLES_IN_IMAGE};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Apply every cleanup rule to one page's raw answer.
///
/// 1. Strip an outer ```` ```markdown ```` fence
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse runs of blank lines to one
/// 5. Insert a missing separator row under a table header
/// 6. Remove separator rows inside a table body
/// 7. Strip invisible Unicode
///
/// The result is trimmed.
pub fn clean_page(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = fix_missing_separators(&s);
    let s = remove_mid_table_separators(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

/// True when the page carries no table: empty, or the sentinel appears
/// anywhere in it (case-insensitive).
pub fn is_no_tables(page: &str) -> bool {
    let trimmed = page.trim();
    trimmed.is_empty()
        || trimmed
            .to_lowercase()
            .contains(&NO_TABLES_IN_IMAGE.to_lowercase())
}

/// Join cleaned pages into the final Markdown.
///
/// Pages must be in ascending page order. "No tables" pages are dropped;
/// survivors of a paginated document get a `## Page N` heading. Returns
/// [`NO_TABLES_IN_DOCUMENT`] when nothing survives.
pub fn assemble(pages: &[PageMarkdown], paginated: bool) -> String {
    let mut parts = Vec::with_capacity(pages.len());

    for page in pages {
        if is_no_tables(&page.markdown) {
            debug!("Page {}: no tables, dropped", page.page_num);
            continue;
        }
        let body = page.markdown.trim();
        if paginated {
            parts.push(format!("## Page {}\n\n{}", page.page_num, body));
        } else {
            parts.push(body.to_string());
        }
    }

    if parts.is_empty() {
        warn!("No tables detected in {} page(s)", pages.len());
        return NO_TABLES_IN_DOCUMENT.to_string();
    }

    parts.join("\n\n")
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse blank-line runs ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 5: Insert missing separator rows ────────────────────────────────────

/// A table whose first row is followed directly by a data row gets a
/// `| --- |` row sized to the header.
fn fix_missing_separators(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut result = Vec::with_capacity(lines.len() + 4);

    for (i, line) in lines.iter().enumerate() {
        result.push(line.to_string());

        let starts_table = is_table_row(line)
            && !is_separator_row(line)
            && (i == 0 || !is_table_row(lines[i - 1]));
        if !starts_table {
            continue;
        }
        let next = lines.get(i + 1).copied().unwrap_or("");
        if is_table_row(next) && !is_separator_row(next) {
            let col_count = line.trim().matches('|').count().saturating_sub(1).max(1);
            let sep: String = std::iter::once("|")
                .chain(std::iter::repeat_n(" --- |", col_count))
                .collect();
            result.push(sep);
        }
    }

    result.join("\n")
}

pub(crate) fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

pub(crate) fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

// ── Rule 6: Remove mid-table separator rows ──────────────────────────────────

fn remove_mid_table_separators(input: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut table_line_count = 0usize;

    for line in input.lines() {
        if is_table_row(line) {
            table_line_count += 1;
            if is_separator_row(line) && table_line_count != 2 {
                continue;
            }
        } else {
            table_line_count = 0;
        }
        result.push(line);
    }

    result.join("\n")
}

// ── Rule 7: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}
