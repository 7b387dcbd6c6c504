//! Tag dumps attached to labeled arrays.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::format::tiff::{Page, TagValue, TiffTag};

/// Metadata attached to a scene's labeled array.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Attributes {
    /// Every tag of the scene's first page, by tag code
    pub unprocessed: BTreeMap<u16, TagValue>,

    /// The ImageDescription value, when the page has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<TagValue>,
}

impl Attributes {
    /// Dump the tags of `page`.
    pub fn from_page(page: &Page) -> Self {
        let processed = page.tags.get(&TiffTag::ImageDescription.as_u16()).cloned();
        Self {
            unprocessed: page.tags.clone(),
            processed,
        }
    }

    /// Text of the processed description.
    pub fn description(&self) -> Option<&str> {
        self.processed.as_ref().and_then(TagValue::as_str)
    }
}
