//! Per-page cut lines, page-end dispositions and the line history
//!
//! Page records are immutable: every update builds a new [`PageAnnotations`]
//! and swaps it into the map. Undo is a pure reducer over the history log and
//! the page map, see [`undo`].

use crate::error::HymnSplitError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type LineId = u64;

/// A horizontal cut line drawn on one page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Line {
    pub id: LineId,
    /// Position in rendered-view units at creation time
    pub y: f64,
    /// `true` starts a new output document at this line
    #[serde(default)]
    pub document_boundary: bool,
}

/// What happens at the bottom edge of a page
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PageEndDisposition {
    /// No implicit cut; content carries into the next page
    Off,
    /// Cut at the page bottom, same output document continues
    #[default]
    PageEnd,
    /// Cut at the page bottom and start a new output document
    DocumentSplit,
}

impl PageEndDisposition {
    /// `off -> pageEnd -> documentSplit -> off`
    pub fn next(self) -> Self {
        match self {
            PageEndDisposition::Off => PageEndDisposition::PageEnd,
            PageEndDisposition::PageEnd => PageEndDisposition::DocumentSplit,
            PageEndDisposition::DocumentSplit => PageEndDisposition::Off,
        }
    }

    pub fn cuts(self) -> bool {
        self != PageEndDisposition::Off
    }

    pub fn splits_document(self) -> bool {
        self == PageEndDisposition::DocumentSplit
    }
}

/// Annotations of a single page. Lines are kept in creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageAnnotations {
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(default)]
    pub disposition: PageEndDisposition,
}

impl PageAnnotations {
    fn with_line(&self, line: Line) -> Self {
        let mut lines = self.lines.clone();
        lines.push(line);
        Self {
            lines,
            disposition: self.disposition,
        }
    }

    fn without_line(&self, id: LineId) -> Self {
        Self {
            lines: self.lines.iter().filter(|l| l.id != id).cloned().collect(),
            disposition: self.disposition,
        }
    }

    fn with_toggled(&self, id: LineId) -> Self {
        Self {
            lines: self
                .lines
                .iter()
                .map(|l| {
                    let mut l = l.clone();
                    if l.id == id {
                        l.document_boundary = !l.document_boundary;
                    }
                    l
                })
                .collect(),
            disposition: self.disposition,
        }
    }

    fn with_disposition(&self, disposition: PageEndDisposition) -> Self {
        Self {
            lines: self.lines.clone(),
            disposition,
        }
    }

    pub fn line(&self, id: LineId) -> Option<&Line> {
        self.lines.iter().find(|l| l.id == id)
    }

    /// Lines sorted by y ascending. Ties keep creation order.
    pub fn sorted_lines(&self) -> Vec<&Line> {
        let mut lines: Vec<&Line> = self.lines.iter().collect();
        lines.sort_by(|a, b| a.y.total_cmp(&b.y));
        lines
    }

    /// The line closest to `y` within `tolerance`, if any
    pub fn nearest_line(&self, y: f64, tolerance: f64) -> Option<&Line> {
        self.lines
            .iter()
            .map(|l| (l, (l.y - y).abs()))
            .filter(|(_, d)| *d <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(l, _)| l)
    }
}

/// Page number -> annotation record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageStore {
    next_id: LineId,
    pages: BTreeMap<u32, PageAnnotations>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotations for `page`; unseen pages have no lines and the default disposition
    pub fn page(&self, page: u32) -> PageAnnotations {
        self.pages.get(&page).cloned().unwrap_or_default()
    }

    pub fn pages(&self) -> impl Iterator<Item = (u32, &PageAnnotations)> {
        self.pages.iter().map(|(p, a)| (*p, a))
    }

    /// Register a page so it shows up in iteration even without annotations
    pub fn ensure_page(&mut self, page: u32) {
        self.pages.entry(page).or_default();
    }

    fn replace(&mut self, page: u32, record: PageAnnotations) {
        self.pages.insert(page, record);
    }

    fn insert_line(&mut self, page: u32, y: f64) -> LineId {
        let id = self.next_id;
        self.next_id += 1;
        let record = self.page(page).with_line(Line {
            id,
            y,
            document_boundary: false,
        });
        self.replace(page, record);
        id
    }

    fn delete_line(&mut self, page: u32, id: LineId) -> bool {
        match self.pages.get(&page) {
            Some(record) if record.line(id).is_some() => {
                let record = record.without_line(id);
                self.replace(page, record);
                true
            }
            _ => false,
        }
    }

    /// Page holding line `id`
    pub fn page_of(&self, id: LineId) -> Option<u32> {
        self.pages
            .iter()
            .find(|(_, a)| a.line(id).is_some())
            .map(|(p, _)| *p)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub page: u32,
    pub line_id: LineId,
}

/// Append-only log of line creations, consumed last-in first-out by undo
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn appended(&self, entry: HistoryEntry) -> Self {
        let mut entries = self.entries.clone();
        entries.push(entry);
        Self { entries }
    }

    fn without_line(&self, line_id: LineId) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| e.line_id != line_id)
                .copied()
                .collect(),
        }
    }
}

/// Pop the latest history entry and remove its line.
///
/// Pure: the inputs are untouched and the new log and store are returned.
pub fn undo(log: &History, store: &PageStore) -> Result<(History, PageStore), HymnSplitError> {
    let (last, rest) = log
        .entries
        .split_last()
        .ok_or(HymnSplitError::EmptyHistory)?;
    let mut next_store = store.clone();
    next_store.delete_line(last.page, last.line_id);
    // Every live line has a history entry and entries are in id order, so the
    // undone line held the highest live id.
    next_store.next_id = next_store.next_id.min(last.line_id);
    let next_log = History {
        entries: rest.to_vec(),
    };
    Ok((next_log, next_store))
}

/// Page records plus the history that undo consumes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnotationStore {
    store: PageStore,
    history: History,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages(&self) -> &PageStore {
        &self.store
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn page(&self, page: u32) -> PageAnnotations {
        self.store.page(page)
    }

    pub fn ensure_page(&mut self, page: u32) {
        self.store.ensure_page(page);
    }

    /// Add a plain (non-boundary) line and record it in the history.
    pub fn add_line(&mut self, page: u32, rendered_y: f64) -> LineId {
        let id = self.store.insert_line(page, rendered_y);
        self.history = self.history.appended(HistoryEntry { page, line_id: id });
        id
    }

    /// Flip a line between ordinary split and document boundary.
    pub fn toggle_line_boundary(&mut self, id: LineId) -> Result<bool, HymnSplitError> {
        let page = self
            .store
            .page_of(id)
            .ok_or(HymnSplitError::UnknownLine(id))?;
        let record = self.store.page(page).with_toggled(id);
        let flag = record
            .line(id)
            .map(|l| l.document_boundary)
            .ok_or(HymnSplitError::UnknownLine(id))?;
        self.store.replace(page, record);
        Ok(flag)
    }

    /// Delete a line and every history entry that references it.
    pub fn remove_line(&mut self, page: u32, id: LineId) -> Result<(), HymnSplitError> {
        if !self.store.delete_line(page, id) {
            return Err(HymnSplitError::UnknownLine(id));
        }
        self.history = self.history.without_line(id);
        Ok(())
    }

    /// Advance the page's disposition and return the new value.
    pub fn cycle_disposition(&mut self, page: u32) -> PageEndDisposition {
        let current = self.store.page(page);
        let next = current.disposition.next();
        self.store.replace(page, current.with_disposition(next));
        next
    }

    pub fn set_disposition(&mut self, page: u32, disposition: PageEndDisposition) {
        let record = self.store.page(page).with_disposition(disposition);
        self.store.replace(page, record);
    }

    /// Remove the most recently added line still in the history.
    pub fn undo_last_line(&mut self) -> Result<HistoryEntry, HymnSplitError> {
        let last = *self
            .history
            .entries()
            .last()
            .ok_or(HymnSplitError::EmptyHistory)?;
        let (history, store) = undo(&self.history, &self.store)?;
        self.history = history;
        self.store = store;
        Ok(last)
    }
}
