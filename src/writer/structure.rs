//! Logical structure tree for tagged documents.
//!
//! Structure entries are recorded while pages are authored, keyed by page
//! index. Page and annotation object numbers only exist at finalize, so the
//! tree is written in a late linking pass: struct elements, the
//! StructTreeRoot, the parent tree and the Document element.
//! See ISO 32000-1:2008, Section 14.7.

use super::output::PdfOutput;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accessibility attributes of one drawn primitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructEntry {
    /// Structure type (`P`, `H1`, `Figure`, `Link`, ...)
    pub tag: String,
    /// Language of the content (`/Lang`)
    pub lang: Option<String>,
    /// Replacement text (`/ActualText`)
    pub actual_text: Option<String>,
    /// Alternate description (`/Alt`)
    pub alt: Option<String>,
}

impl StructEntry {
    /// Entry with just a structure type.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Set the language.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Set the actual text.
    pub fn with_actual_text(mut self, text: impl Into<String>) -> Self {
        self.actual_text = Some(text.into());
        self
    }

    /// Set the alternate description.
    pub fn with_alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = Some(alt.into());
        self
    }
}

/// What a struct element points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructKid {
    /// Marked-content sequence on the element's page
    MarkedContent(i64),
    /// Annotation, by index in the writer's annotation list
    Annotation(usize),
}

#[derive(Debug, Clone)]
struct RecordedElement {
    entry: StructEntry,
    page: usize,
    kid: StructKid,
}

/// Structure entries collected during authoring.
#[derive(Debug, Clone, Default)]
pub struct StructureTree {
    elements: Vec<RecordedElement>,
    next_mcid: BTreeMap<usize, i64>,
}

impl StructureTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of recorded elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Record marked content on a page; returns its MCID.
    pub fn record_marked_content(&mut self, page: usize, entry: StructEntry) -> i64 {
        let counter = self.next_mcid.entry(page).or_insert(0);
        let mcid = *counter;
        *counter += 1;
        self.elements.push(RecordedElement {
            entry,
            page,
            kid: StructKid::MarkedContent(mcid),
        });
        mcid
    }

    /// Record an annotation as the content of a struct element.
    pub fn record_annotation(&mut self, page: usize, annotation: usize, entry: StructEntry) {
        self.elements.push(RecordedElement {
            entry,
            page,
            kid: StructKid::Annotation(annotation),
        });
    }

    /// Parent-tree keys of tagged annotations, by annotation index.
    ///
    /// Pages use keys `0..page_count`; annotations follow in recording order.
    pub fn annotation_keys(&self, page_count: usize) -> BTreeMap<usize, i64> {
        self.elements
            .iter()
            .filter_map(|e| match e.kid {
                StructKid::Annotation(index) => Some(index),
                StructKid::MarkedContent(_) => None,
            })
            .enumerate()
            .map(|(ordinal, index)| (index, (page_count + ordinal) as i64))
            .collect()
    }

    /// Write the tree; returns the StructTreeRoot reference.
    pub fn write(
        &self,
        out: &mut PdfOutput,
        page_refs: &[ObjectRef],
        annotation_refs: &[ObjectRef],
        lang: Option<&str>,
    ) -> Result<ObjectRef> {
        let root = out.reserve();
        let parent_tree = out.reserve();
        let document = out.reserve();

        let mut element_refs = Vec::with_capacity(self.elements.len());
        let mut page_elements: BTreeMap<usize, Vec<ObjectRef>> = BTreeMap::new();
        let mut annotation_elements = Vec::new();

        for element in &self.elements {
            let page_ref = *page_refs.get(element.page).ok_or_else(|| {
                Error::ProgrammingSequence(format!(
                    "structure entry on page {} but the document has {} pages",
                    element.page,
                    page_refs.len()
                ))
            })?;

            let mut dict = Dictionary::typed("StructElem")
                .with("S", Object::name(element.entry.tag.as_str()))
                .with("P", document)
                .with("Pg", page_ref);
            match element.kid {
                StructKid::MarkedContent(mcid) => dict.insert("K", mcid),
                StructKid::Annotation(index) => {
                    let annot = *annotation_refs.get(index).ok_or_else(|| {
                        Error::ProgrammingSequence(format!("annotation {} was never written", index))
                    })?;
                    dict.insert(
                        "K",
                        Dictionary::typed("OBJR").with("Obj", annot).with("Pg", page_ref),
                    );
                },
            }
            if let Some(lang) = &element.entry.lang {
                dict.insert("Lang", Object::text(lang));
            }
            if let Some(text) = &element.entry.actual_text {
                dict.insert("ActualText", Object::text(text));
            }
            if let Some(alt) = &element.entry.alt {
                dict.insert("Alt", Object::text(alt));
            }

            let r = out.put_object(&dict.into())?;
            element_refs.push(r);
            match element.kid {
                StructKid::MarkedContent(_) => page_elements.entry(element.page).or_default().push(r),
                StructKid::Annotation(_) => annotation_elements.push(r),
            }
        }

        let next_key = page_refs.len() + annotation_elements.len();
        let root_dict = Dictionary::typed("StructTreeRoot")
            .with("K", document)
            .with("ParentTree", parent_tree)
            .with("ParentTreeNextKey", next_key as i64);
        out.put_reserved(root, &root_dict.into())?;

        // Page keys map to MCID-ordered arrays; annotation keys to one element
        let mut nums = Vec::with_capacity(2 * next_key);
        for page in 0..page_refs.len() {
            let refs = page_elements.remove(&page).unwrap_or_default();
            nums.push(Object::Integer(page as i64));
            nums.push(Object::Array(refs.into_iter().map(Object::Reference).collect()));
        }
        for (ordinal, r) in annotation_elements.into_iter().enumerate() {
            nums.push(Object::Integer((page_refs.len() + ordinal) as i64));
            nums.push(Object::Reference(r));
        }
        out.put_reserved(parent_tree, &Dictionary::new().with("Nums", Object::Array(nums)).into())?;

        let mut doc_dict = Dictionary::typed("StructElem")
            .with("S", Object::name("Document"))
            .with("P", root)
            .with(
                "K",
                Object::Array(element_refs.iter().copied().map(Object::Reference).collect()),
            );
        if let Some(lang) = lang {
            doc_dict.insert("Lang", Object::text(lang));
        }
        out.put_reserved(document, &doc_dict.into())?;

        log::debug!(
            "Structure tree: {} elements, root {}",
            element_refs.len(),
            root.id
        );
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcids_are_per_page() {
        let mut tree = StructureTree::new();
        assert_eq!(tree.record_marked_content(0, StructEntry::new("P")), 0);
        assert_eq!(tree.record_marked_content(0, StructEntry::new("P")), 1);
        assert_eq!(tree.record_marked_content(1, StructEntry::new("H1")), 0);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_annotation_keys_follow_pages() {
        let mut tree = StructureTree::new();
        tree.record_marked_content(0, StructEntry::new("P"));
        tree.record_annotation(0, 4, StructEntry::new("Link"));
        tree.record_annotation(1, 7, StructEntry::new("Link"));
        let keys = tree.annotation_keys(2);
        assert_eq!(keys.get(&4), Some(&2));
        assert_eq!(keys.get(&7), Some(&3));
    }

    #[test]
    fn test_write_tree() {
        let mut out = PdfOutput::new("1.7");
        let page = out.put_object(&Object::Null).unwrap();
        let annot = out.put_object(&Object::Null).unwrap();

        let mut tree = StructureTree::new();
        tree.record_marked_content(0, StructEntry::new("P").with_actual_text("Hello"));
        tree.record_annotation(0, 0, StructEntry::new("Link").with_alt("Home page"));

        let root = tree.write(&mut out, &[page], &[annot], Some("en-US")).unwrap();
        assert_eq!(root.id, 3);

        let text = String::from_utf8_lossy(out.bytes()).into_owned();
        assert!(text.contains("/Type /StructTreeRoot"));
        assert!(text.contains("/ParentTreeNextKey 2"));
        assert!(text.contains("/Type /OBJR"));
        assert!(text.contains("/ActualText (Hello)"));
        assert!(text.contains("/S /Document"));
        // Elements 6 and 7 land under keys 0 and 1
        assert!(text.contains("/Nums [0 [6 0 R] 1 7 0 R]"));
    }

    #[test]
    fn test_missing_page_is_an_error() {
        let mut out = PdfOutput::new("1.7");
        let mut tree = StructureTree::new();
        tree.record_marked_content(2, StructEntry::new("P"));
        assert!(matches!(
            tree.write(&mut out, &[], &[], None),
            Err(Error::ProgrammingSequence(_))
        ));
    }
}
