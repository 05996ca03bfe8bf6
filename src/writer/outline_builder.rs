//! Document outline (bookmarks) and explicit destinations.
//!
//! Outline items are collected during authoring with a nesting level and
//! flattened breadth-first at finalize time, when every page number is known.
//! See ISO 32000-1:2008, Section 12.3.3.

use super::output::PdfOutput;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::VecDeque;

/// How the target page is displayed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitMode {
    /// Fit the entire page in the window
    Fit,
    /// Fit the page width, with the given top coordinate
    FitH(Option<f64>),
    /// Fit the page height, with the given left coordinate
    FitV(Option<f64>),
    /// Fit the bounding box of the page contents
    FitB,
    /// Display at a specific position with zoom
    XYZ {
        /// Left coordinate (None = unchanged)
        left: Option<f64>,
        /// Top coordinate (None = unchanged)
        top: Option<f64>,
        /// Zoom factor (None = unchanged)
        zoom: Option<f64>,
    },
}

/// A page index plus view. The page's object number is bound at finalize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Destination {
    /// Zero-based page index
    pub page: usize,
    /// View on that page
    pub fit: FitMode,
}

impl Destination {
    /// Show the whole page.
    pub fn fit(page: usize) -> Self {
        Self {
            page,
            fit: FitMode::Fit,
        }
    }

    /// Put `(x, y)` at the top-left corner of the window, keeping the zoom.
    pub fn xyz(page: usize, x: f64, y: f64) -> Self {
        Self {
            page,
            fit: FitMode::XYZ {
                left: Some(x),
                top: Some(y),
                zoom: None,
            },
        }
    }

    /// Destination array `[page /Mode ...]` against the final page numbers.
    pub fn to_object(&self, page_refs: &[ObjectRef]) -> Result<Object> {
        let page_ref = page_refs.get(self.page).ok_or_else(|| {
            Error::ProgrammingSequence(format!(
                "destination names page {} but the document has {} pages",
                self.page,
                page_refs.len()
            ))
        })?;

        let opt = |v: Option<f64>| v.map(Object::Real).unwrap_or(Object::Null);
        let mut arr = vec![Object::Reference(*page_ref)];
        match self.fit {
            FitMode::Fit => arr.push(Object::name("Fit")),
            FitMode::FitH(top) => arr.extend([Object::name("FitH"), opt(top)]),
            FitMode::FitV(left) => arr.extend([Object::name("FitV"), opt(left)]),
            FitMode::FitB => arr.push(Object::name("FitB")),
            FitMode::XYZ { left, top, zoom } => {
                arr.extend([Object::name("XYZ"), opt(left), opt(top), opt(zoom)])
            },
        }
        Ok(Object::Array(arr))
    }
}

/// Where an outline item leads.
#[derive(Debug, Clone, PartialEq)]
pub enum OutlineDestination {
    /// Explicit page destination
    Page(Destination),
    /// Named destination (see [`super::PdfWriter::add_named_destination`])
    Named(String),
    /// External URI
    Uri(String),
}

impl From<Destination> for OutlineDestination {
    fn from(dest: Destination) -> Self {
        OutlineDestination::Page(dest)
    }
}

/// Text style for outline items.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutlineStyle {
    /// Display in italic
    pub italic: bool,
    /// Display in bold
    pub bold: bool,
    /// Text color (RGB, 0.0-1.0)
    pub color: Option<(f64, f64, f64)>,
}

impl OutlineStyle {
    /// Create a new default style.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bold style.
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Set italic style.
    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    /// Set text color.
    pub fn color(mut self, r: f64, g: f64, b: f64) -> Self {
        self.color = Some((r, g, b));
        self
    }

    /// The `/F` flags value.
    pub fn flags(&self) -> i64 {
        let mut flags = 0i64;
        if self.italic {
            flags |= 1;
        }
        if self.bold {
            flags |= 2;
        }
        flags
    }
}

/// A single outline item (bookmark).
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineItem {
    /// Display title
    pub title: String,
    /// Destination when clicked
    pub destination: OutlineDestination,
    /// Display style
    pub style: OutlineStyle,
    /// Whether the item is initially open (expanded)
    pub open: bool,
    /// Child items
    pub children: Vec<OutlineItem>,
}

impl OutlineItem {
    /// Create an item with a destination.
    pub fn new(title: impl Into<String>, destination: impl Into<OutlineDestination>) -> Self {
        Self {
            title: title.into(),
            destination: destination.into(),
            style: OutlineStyle::default(),
            open: true,
            children: Vec::new(),
        }
    }

    /// Set the display style.
    pub fn with_style(mut self, style: OutlineStyle) -> Self {
        self.style = style;
        self
    }

    /// Set whether the item is initially open.
    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    /// `/Count`: visible descendants, negated when the item is closed.
    fn descendant_count(&self) -> i64 {
        let count = self.children.len() as i64
            + self
                .children
                .iter()
                .map(|c| c.visible_descendant_count())
                .sum::<i64>();
        if self.open {
            count
        } else {
            -count
        }
    }

    fn visible_descendant_count(&self) -> i64 {
        if !self.open {
            return 0;
        }
        self.children.len() as i64
            + self
                .children
                .iter()
                .map(|c| c.visible_descendant_count())
                .sum::<i64>()
    }
}

/// One node of the breadth-first flattening.
struct FlatNode<'a> {
    item: &'a OutlineItem,
    parent: Option<usize>,
    children: Vec<usize>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Collects outline items and writes the outline tree.
#[derive(Debug, Clone, Default)]
pub struct OutlineBuilder {
    items: Vec<OutlineItem>,
}

impl OutlineBuilder {
    /// Create an empty outline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level item.
    pub fn add_item(&mut self, item: OutlineItem) -> &mut Self {
        self.items.push(item);
        self
    }

    /// Add an item at a nesting level.
    ///
    /// Level 0 is top level; level `n` becomes the last child of the most
    /// recent item at level `n - 1`. Levels deeper than the current tree are
    /// clamped to one below its deepest last item.
    pub fn add_at_level(&mut self, level: usize, item: OutlineItem) -> &mut Self {
        let mut siblings = &mut self.items;
        for _ in 0..level {
            if siblings.is_empty() {
                break;
            }
            let last = siblings.len() - 1;
            siblings = &mut siblings[last].children;
        }
        siblings.push(item);
        self
    }

    /// Check if the outline is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the number of top-level items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Get the root items.
    pub fn items(&self) -> &[OutlineItem] {
        &self.items
    }

    fn flatten(&self) -> (Vec<FlatNode<'_>>, Vec<usize>) {
        let mut flat: Vec<FlatNode<'_>> = Vec::new();
        let mut top = Vec::new();
        let mut queue: VecDeque<(&OutlineItem, Option<usize>)> =
            self.items.iter().map(|item| (item, None)).collect();

        while let Some((item, parent)) = queue.pop_front() {
            let index = flat.len();
            match parent {
                Some(p) => flat[p].children.push(index),
                None => top.push(index),
            }
            flat.push(FlatNode {
                item,
                parent,
                children: Vec::new(),
                prev: None,
                next: None,
            });
            queue.extend(item.children.iter().map(|child| (child, Some(index))));
        }

        let groups: Vec<Vec<usize>> = std::iter::once(top.clone())
            .chain(flat.iter().map(|n| n.children.clone()))
            .collect();
        for group in groups {
            for pair in group.windows(2) {
                flat[pair[0]].next = Some(pair[1]);
                flat[pair[1]].prev = Some(pair[0]);
            }
        }
        (flat, top)
    }

    /// Write the outline root and every item; returns the root reference.
    ///
    /// All numbers are reserved breadth-first before anything is written,
    /// so sibling and child links only ever name allocated numbers.
    pub fn write(&self, out: &mut PdfOutput, page_refs: &[ObjectRef]) -> Result<Option<ObjectRef>> {
        let (flat, top) = self.flatten();
        let (Some(&first), Some(&last)) = (top.first(), top.last()) else {
            return Ok(None);
        };

        let root = out.reserve();
        let refs: Vec<ObjectRef> = flat.iter().map(|_| out.reserve()).collect();

        let total: i64 = self
            .items
            .iter()
            .map(|i| 1 + i.visible_descendant_count())
            .sum();
        let root_dict = Dictionary::typed("Outlines")
            .with("First", refs[first])
            .with("Last", refs[last])
            .with("Count", total);
        out.put_reserved(root, &root_dict.into())?;

        for (node, &r) in flat.iter().zip(&refs) {
            let item = node.item;
            let mut dict = Dictionary::new()
                .with("Title", Object::text(&item.title))
                .with("Parent", node.parent.map_or(root, |p| refs[p]));
            if let Some(prev) = node.prev {
                dict.insert("Prev", refs[prev]);
            }
            if let Some(next) = node.next {
                dict.insert("Next", refs[next]);
            }
            if let (Some(&first), Some(&last)) = (node.children.first(), node.children.last()) {
                dict.insert("First", refs[first]);
                dict.insert("Last", refs[last]);
                let count = item.descendant_count();
                if count != 0 {
                    dict.insert("Count", count);
                }
            }

            match &item.destination {
                OutlineDestination::Page(dest) => dict.insert("Dest", dest.to_object(page_refs)?),
                OutlineDestination::Named(name) => dict.insert("Dest", Object::name(name.as_str())),
                OutlineDestination::Uri(uri) => dict.insert(
                    "A",
                    Dictionary::new()
                        .with("S", Object::name("URI"))
                        .with("URI", Object::string(uri)),
                ),
            }

            let flags = item.style.flags();
            if flags != 0 {
                dict.insert("F", flags);
            }
            if let Some((red, green, blue)) = item.style.color {
                dict.insert(
                    "C",
                    Object::Array(vec![Object::Real(red), Object::Real(green), Object::Real(blue)]),
                );
            }
            out.put_reserved(r, &dict.into())?;
        }

        log::debug!("Outline: {} items under root {}", flat.len(), root.id);
        Ok(Some(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(out: &mut PdfOutput, n: usize) -> Vec<ObjectRef> {
        (0..n).map(|_| out.put_object(&Object::Null).unwrap()).collect()
    }

    #[test]
    fn test_style_flags() {
        assert_eq!(OutlineStyle::new().flags(), 0);
        assert_eq!(OutlineStyle::new().italic().flags(), 1);
        assert_eq!(OutlineStyle::new().bold().flags(), 2);
        assert_eq!(OutlineStyle::new().bold().italic().flags(), 3);
    }

    #[test]
    fn test_level_nesting() {
        let mut outline = OutlineBuilder::new();
        outline
            .add_at_level(0, OutlineItem::new("Chapter 1", Destination::fit(0)))
            .add_at_level(1, OutlineItem::new("Section 1.1", Destination::fit(0)))
            .add_at_level(2, OutlineItem::new("Detail", Destination::fit(0)))
            .add_at_level(1, OutlineItem::new("Section 1.2", Destination::fit(1)))
            .add_at_level(0, OutlineItem::new("Chapter 2", Destination::fit(1)));

        assert_eq!(outline.len(), 2);
        let ch1 = &outline.items()[0];
        assert_eq!(ch1.children.len(), 2);
        assert_eq!(ch1.children[0].children[0].title, "Detail");
        assert_eq!(ch1.descendant_count(), 3);
    }

    #[test]
    fn test_level_too_deep_is_clamped() {
        let mut outline = OutlineBuilder::new();
        outline.add_at_level(3, OutlineItem::new("Orphan", Destination::fit(0)));
        assert_eq!(outline.len(), 1);
    }

    #[test]
    fn test_closed_item_count_is_negative() {
        let mut item = OutlineItem::new("Closed", Destination::fit(0)).with_open(false);
        item.children.push(OutlineItem::new("A", Destination::fit(0)));
        item.children.push(OutlineItem::new("B", Destination::fit(0)));
        assert_eq!(item.descendant_count(), -2);
        assert_eq!(item.visible_descendant_count(), 0);
    }

    #[test]
    fn test_destination_array() {
        let refs = [ObjectRef::new(7, 0)];
        let dest = Destination::xyz(0, 72.0, 700.0).to_object(&refs).unwrap();
        assert_eq!(
            dest,
            Object::Array(vec![
                Object::Reference(ObjectRef::new(7, 0)),
                Object::name("XYZ"),
                Object::Real(72.0),
                Object::Real(700.0),
                Object::Null,
            ])
        );
        assert!(Destination::fit(1).to_object(&refs).is_err());
    }

    #[test]
    fn test_write_breadth_first() {
        let mut out = PdfOutput::new("1.7");
        let page_refs = pages(&mut out, 2);
        let mut outline = OutlineBuilder::new();
        outline
            .add_at_level(0, OutlineItem::new("A", Destination::fit(0)))
            .add_at_level(1, OutlineItem::new("A.1", Destination::fit(0)))
            .add_at_level(0, OutlineItem::new("B", OutlineDestination::Named("intro".into())));

        let root = outline.write(&mut out, &page_refs).unwrap().unwrap();
        // Root, then A and B (level 0), then A.1
        assert_eq!(root.id, 3);
        assert_eq!(out.allocated(), 6);
        let text = String::from_utf8_lossy(out.bytes()).into_owned();
        let a1 = text.find("(A.1)").unwrap();
        let b = text.find("(B)").unwrap();
        assert!(b < a1);
        assert!(text.contains("/Dest /intro"));
        assert!(text.contains("/Count 3"));
    }

    #[test]
    fn test_empty_outline_writes_nothing() {
        let mut out = PdfOutput::new("1.7");
        assert_eq!(OutlineBuilder::new().write(&mut out, &[]).unwrap(), None);
        assert_eq!(out.allocated(), 0);
    }
}
