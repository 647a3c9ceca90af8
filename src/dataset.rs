//! Items and item collections handed to the search engine.
//!
//! A collection (corpus or query set) is a flat list of items, each carrying
//! a unique string id, a modality tag and the matching payload. Collections
//! are uniformly single-modality; the tag of the first item decides which
//! encoder path the search engine takes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Modality tag of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "text+image")]
    TextImage,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::TextImage => "text+image",
        }
    }

    /// Parse a modality tag, rejecting anything outside the supported set.
    pub fn parse(tag: &str) -> Result<Self, EvalError> {
        match tag {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "text+image" => Ok(Self::TextImage),
            other => Err(EvalError::UnsupportedModality(other.to_string())),
        }
    }
}

/// Where an item's image payload lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// Path to an encoded image file on disk.
    Path(PathBuf),
    /// Raw encoded bytes held inline.
    Bytes(Vec<u8>),
}

/// One corpus or query entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub modality: Modality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSource>,
}

impl Item {
    /// Convenience constructor for text items.
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            modality: Modality::Text,
            text: Some(text.into()),
            image: None,
        }
    }
}

/// An ordered, single-modality collection of items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemCollection {
    items: Vec<Item>,
}

impl ItemCollection {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    /// Modality of the collection, inspected from the first item. Mixed
    /// collections are an external-data contract and are not detected here.
    pub fn modality(&self) -> Option<Modality> {
        self.items.first().map(|item| item.modality)
    }

    /// Load a collection from a JSON array of items.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read item collection: {path:?}"))?;
        let items: Vec<Item> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse item collection: {path:?}"))?;
        Ok(Self::new(items))
    }
}

/// Collect the text payload of each item, in order. Items without a text
/// payload contribute an empty string; payload completeness is the data
/// supplier's contract.
pub fn collect_texts(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.text.clone().unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_round_trips_through_tags() {
        for tag in ["text", "image", "text+image"] {
            assert_eq!(Modality::parse(tag).unwrap().as_str(), tag);
        }
    }

    #[test]
    fn unknown_modality_is_rejected() {
        let err = Modality::parse("video").unwrap_err();
        assert!(matches!(err, EvalError::UnsupportedModality(tag) if tag == "video"));
    }

    #[test]
    fn collection_modality_comes_from_first_item() {
        let collection = ItemCollection::new(vec![
            Item::text("q1", "first"),
            Item::text("q2", "second"),
        ]);
        assert_eq!(collection.modality(), Some(Modality::Text));
        assert!(ItemCollection::default().modality().is_none());
    }

    #[test]
    fn item_json_shape() {
        let parsed: Item = serde_json::from_str(
            r#"{"id": "d1", "modality": "text", "text": "a passage"}"#,
        )
        .unwrap();
        assert_eq!(parsed.id, "d1");
        assert_eq!(parsed.modality, Modality::Text);
        assert_eq!(parsed.text.as_deref(), Some("a passage"));
        assert!(parsed.image.is_none());
    }

    #[test]
    fn image_item_json_shape() {
        let parsed: Item = serde_json::from_str(
            r#"{"id": "i1", "modality": "image", "image": {"path": "imgs/i1.png"}}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.image,
            Some(ImageSource::Path(PathBuf::from("imgs/i1.png")))
        );
    }

    #[test]
    fn missing_text_becomes_empty_string() {
        let items = vec![
            Item::text("a", "has text"),
            Item {
                id: "b".into(),
                modality: Modality::Text,
                text: None,
                image: None,
            },
        ];
        assert_eq!(collect_texts(&items), vec!["has text".to_string(), String::new()]);
    }
}
