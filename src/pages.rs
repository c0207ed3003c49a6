//! Page selection expressions
//!
//! Accepts the qpdf page-range syntax: `N`, `N-M` (either direction), `z`
//! for the last page, `rN` for the N-th page from the end, an `:odd` or
//! `:even` suffix on any term, and comma-separated lists of terms.

use crate::error::{Error, Result};
use crate::pdf::PageAsset;
use std::collections::BTreeSet;

/// Zero-based indices selected by `range` in a document of `page_count` pages
pub fn parse_selection(range: &str, page_count: usize) -> Result<BTreeSet<usize>> {
    let invalid = || Error::InvalidPageRange {
        range: range.to_string(),
    };

    let mut selected = BTreeSet::new();
    for term in range.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (span, parity) = split_parity(term);

        let (first, last) = match span.split_once('-') {
            Some((start, end)) => (
                page_number(start, page_count).ok_or_else(invalid)?,
                page_number(end, page_count).ok_or_else(invalid)?,
            ),
            None => {
                let page = page_number(span, page_count).ok_or_else(invalid)?;
                (page, page)
            }
        };

        let (low, high) = (first.min(last), first.max(last));
        selected.extend(
            (low..=high)
                .filter(|page| parity.map_or(true, |odd| (page % 2 == 1) == odd))
                .map(|page| page - 1),
        );
    }

    if selected.is_empty() {
        return Err(invalid());
    }
    Ok(selected)
}

/// Mark assets as selected exactly when their index is in `selection`
pub fn apply_selection(assets: &mut [PageAsset], selection: &BTreeSet<usize>) {
    for asset in assets.iter_mut() {
        let selected = selection.contains(&asset.page_index());
        asset.set_selected(selected);
    }
}

/// `Some(true)` for `:odd`, `Some(false)` for `:even`
fn split_parity(term: &str) -> (&str, Option<bool>) {
    if let Some(span) = term.strip_suffix(":odd") {
        (span, Some(true))
    } else if let Some(span) = term.strip_suffix(":even") {
        (span, Some(false))
    } else {
        (term, None)
    }
}

/// One-based page number for `N`, `z` or `rN`, if it lies in the document
fn page_number(reference: &str, page_count: usize) -> Option<usize> {
    let reference = reference.trim();
    let page = if reference == "z" {
        page_count
    } else if let Some(from_end) = reference.strip_prefix('r') {
        let n: usize = from_end.parse().ok()?;
        (page_count + 1).checked_sub(n)?
    } else {
        reference.parse().ok()?
    };

    (1..=page_count).contains(&page).then_some(page)
}
