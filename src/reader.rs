//! Read-side façade over the cross-reference reader.
//!
//! `PdfReader` owns the donor bytes and the recovered objects, and offers
//! the lookups the importer needs: trailer, catalog, page-tree walk with
//! inherited attributes, and reference resolution.

use crate::error::{Error, Result};
use crate::object::{Dictionary, LowLevelObject, Object, ObjectRef};
use crate::parser_config::ReaderOptions;
use crate::xref::read_objects;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Maximum reference hops followed by [`PdfReader::resolve`].
const MAX_RESOLVE_DEPTH: usize = 32;

/// One leaf of the page tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    /// Reference to the page object
    pub reference: ObjectRef,
    /// The page dictionary as stored
    pub dict: Dictionary,
    /// Resources, inherited from an ancestor when the page has none
    pub resources: Dictionary,
    /// `[llx lly urx ury]`, inherited like resources
    pub media_box: Option<[f64; 4]>,
}

impl PageInfo {
    /// Page width and height from the media box.
    pub fn size(&self) -> Option<(f64, f64)> {
        self.media_box.map(|[llx, lly, urx, ury]| (urx - llx, ury - lly))
    }
}

/// A parsed donor document.
#[derive(Debug, Clone)]
pub struct PdfReader {
    data: Bytes,
    objects: BTreeMap<u32, LowLevelObject>,
    trailer: Dictionary,
    options: ReaderOptions,
}

impl PdfReader {
    /// Read a file with default (lenient) options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ReaderOptions::default())
    }

    /// Read a file.
    pub fn open_with_options(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        log::debug!("Read {} bytes from {}", data.len(), path.as_ref().display());
        Self::from_bytes_with_options(data, options)
    }

    /// Parse an in-memory document with default (lenient) options.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        Self::from_bytes_with_options(data, ReaderOptions::default())
    }

    /// Parse an in-memory document.
    pub fn from_bytes_with_options(data: impl Into<Bytes>, options: ReaderOptions) -> Result<Self> {
        let data = data.into();
        let recovered = read_objects(&data, &options)?;
        Ok(Self {
            data,
            objects: recovered.objects,
            trailer: recovered.trailer,
            options,
        })
    }

    /// The raw document bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Options this reader was built with.
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// All recovered objects in ascending number order.
    pub fn objects(&self) -> impl Iterator<Item = &LowLevelObject> {
        self.objects.values()
    }

    /// Number of recovered objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no objects were recovered.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Look up an object by number.
    pub fn get(&self, number: u32) -> Result<&LowLevelObject> {
        self.objects.get(&number).ok_or(Error::ObjectNotFound(number))
    }

    /// Whether an object with this number was recovered.
    pub fn contains(&self, number: u32) -> bool {
        self.objects.contains_key(&number)
    }

    /// Structured value of an object.
    pub fn value(&self, number: u32) -> Result<Object> {
        self.get(number)?.value()
    }

    /// Decompressed payload of a stream object.
    pub fn stream_data(&self, number: u32) -> Result<&[u8]> {
        self.get(number)?.decompressed(self.options.max_decompressed_size)
    }

    /// Follow references until a direct value is reached.
    pub fn resolve(&self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        for _ in 0..MAX_RESOLVE_DEPTH {
            match current {
                Object::Reference(r) => current = self.value(r.id)?,
                direct => return Ok(direct),
            }
        }
        Err(Error::malformed(0, "reference chain too long"))
    }

    /// Resolve a value that must be a dictionary.
    pub fn resolve_dict(&self, obj: &Object) -> Result<Dictionary> {
        match self.resolve(obj)? {
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// The merged trailer dictionary.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// The document catalog (`/Root`).
    pub fn catalog(&self) -> Result<Dictionary> {
        let root = self
            .trailer
            .get("Root")
            .ok_or_else(|| Error::malformed(0, "trailer has no /Root"))?;
        self.resolve_dict(root)
    }

    /// Walk the page tree, left to right.
    pub fn pages(&self) -> Result<Vec<PageInfo>> {
        let catalog = self.catalog()?;
        let root_ref = catalog
            .get_reference("Pages")
            .ok_or_else(|| Error::malformed(0, "catalog has no /Pages reference"))?;

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        // (node, inherited resources, inherited media box)
        let mut stack = vec![(root_ref, None::<Dictionary>, None::<[f64; 4]>)];

        while let Some((node_ref, inherited_res, inherited_box)) = stack.pop() {
            if !visited.insert(node_ref.id) {
                log::warn!("Page tree revisits object {}; skipping", node_ref.id);
                continue;
            }
            let node = self.resolve_dict(&Object::Reference(node_ref))?;

            let resources = match node.get("Resources") {
                Some(res) => Some(self.resolve_dict(res)?),
                None => inherited_res,
            };
            let media_box = match node.get("MediaBox") {
                Some(mb) => self.rect(mb)?.or(inherited_box),
                None => inherited_box,
            };

            match node.get_name("Type") {
                Some("Pages") => {
                    let kids = match node.get("Kids") {
                        Some(kids) => self.resolve(kids)?,
                        None => Object::Array(Vec::new()),
                    };
                    let kids = kids.as_array().cloned().unwrap_or_default();
                    // Reverse so the leftmost kid is popped first
                    for kid in kids.iter().rev() {
                        if let Some(kid_ref) = kid.as_reference() {
                            stack.push((kid_ref, resources.clone(), media_box));
                        }
                    }
                },
                _ => pages.push(PageInfo {
                    reference: node_ref,
                    dict: node,
                    resources: resources.unwrap_or_default(),
                    media_box,
                }),
            }
        }

        log::debug!("Page tree has {} pages", pages.len());
        Ok(pages)
    }

    /// One page by zero-based index.
    pub fn page(&self, index: usize) -> Result<PageInfo> {
        let mut pages = self.pages()?;
        if index >= pages.len() {
            return Err(Error::malformed(
                0,
                format!("page index {} out of range ({} pages)", index, pages.len()),
            ));
        }
        Ok(pages.swap_remove(index))
    }

    /// Decompressed content of a page, concatenating a `/Contents` array.
    pub fn page_content(&self, page: &PageInfo) -> Result<Vec<u8>> {
        let refs: Vec<ObjectRef> = match page.dict.get("Contents") {
            Some(Object::Reference(r)) => match self.value(r.id)? {
                Object::Array(items) => items.iter().filter_map(Object::as_reference).collect(),
                _ => vec![*r],
            },
            Some(Object::Array(items)) => items.iter().filter_map(Object::as_reference).collect(),
            _ => Vec::new(),
        };

        let mut content = Vec::new();
        for r in refs {
            if !content.is_empty() {
                content.push(b'\n');
            }
            content.extend_from_slice(self.stream_data(r.id)?);
        }
        Ok(content)
    }

    fn rect(&self, obj: &Object) -> Result<Option<[f64; 4]>> {
        let resolved = self.resolve(obj)?;
        let Some(items) = resolved.as_array() else {
            return Ok(None);
        };
        let mut nums = [0.0; 4];
        if items.len() != 4 {
            return Ok(None);
        }
        for (slot, item) in nums.iter_mut().zip(items) {
            match self.resolve(item)?.as_number() {
                Some(n) => *slot = n,
                None => return Ok(None),
            }
        }
        Ok(Some(nums))
    }
}
