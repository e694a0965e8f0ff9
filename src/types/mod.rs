//! Comment data and the index-preserving valid subset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single comment as supplied by the upstream content source.
///
/// Author metadata is carried through untouched; only `text` is embedded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_profile_image_url: Option<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl TextItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Comments paired position-by-position with their embeddings.
///
/// An empty embedding marks an item whose vector is unavailable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    items: Vec<TextItem>,
    embeddings: Vec<Vec<f32>>,
}

impl Corpus {
    /// Pairs `items` with `embeddings`; `None` if the lengths differ.
    pub fn new(items: Vec<TextItem>, embeddings: Vec<Vec<f32>>) -> Option<Self> {
        (items.len() == embeddings.len()).then_some(Self { items, embeddings })
    }

    pub fn items(&self) -> &[TextItem] {
        &self.items
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items with a usable embedding, densely packed.
    pub fn valid_subset(&self) -> ValidSubset {
        ValidSubset::from_embeddings(&self.embeddings)
    }

    /// Text of the item at valid-subset position `valid_index`.
    pub fn text_at(&self, subset: &ValidSubset, valid_index: usize) -> Option<&str> {
        subset
            .original_index(valid_index)
            .and_then(|original| self.items.get(original))
            .map(|item| item.text.as_str())
    }
}

/// Dense array of the non-empty embeddings plus the map back to original
/// positions.
///
/// Clustering sees only `embeddings()`; `original_indices()[i]` is the corpus
/// position of valid item `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidSubset {
    original_indices: Vec<usize>,
    embeddings: Vec<Vec<f32>>,
}

impl ValidSubset {
    pub fn from_embeddings(embeddings: &[Vec<f32>]) -> Self {
        let (original_indices, embeddings) = embeddings
            .iter()
            .enumerate()
            .filter(|(_, embedding)| !embedding.is_empty())
            .map(|(index, embedding)| (index, embedding.clone()))
            .unzip();

        Self {
            original_indices,
            embeddings,
        }
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn original_indices(&self) -> &[usize] {
        &self.original_indices
    }

    pub fn original_index(&self, valid_index: usize) -> Option<usize> {
        self.original_indices.get(valid_index).copied()
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Corpus {
        let items = vec![
            TextItem::new("a", "first"),
            TextItem::new("b", ""),
            TextItem::new("c", "third"),
            TextItem::new("d", "fourth"),
        ];
        let embeddings = vec![vec![1.0, 0.0], vec![], vec![0.0, 1.0], vec![]];
        Corpus::new(items, embeddings).unwrap()
    }

    #[test]
    fn test_corpus_requires_equal_lengths() {
        assert!(Corpus::new(vec![TextItem::new("a", "x")], vec![]).is_none());
        assert!(Corpus::new(Vec::new(), Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_valid_subset_keeps_original_positions() {
        let corpus = corpus();
        let subset = corpus.valid_subset();

        assert_eq!(subset.len(), 2);
        assert_eq!(subset.original_indices(), &[0, 2]);
        assert_eq!(subset.embeddings()[1], vec![0.0, 1.0]);
        assert_eq!(subset.original_index(1), Some(2));
        assert_eq!(subset.original_index(2), None);

        assert_eq!(corpus.text_at(&subset, 0), Some("first"));
        assert_eq!(corpus.text_at(&subset, 1), Some("third"));
        assert_eq!(corpus.text_at(&subset, 5), None);
    }

    #[test]
    fn test_all_invalid_gives_empty_subset() {
        let subset = ValidSubset::from_embeddings(&[vec![], vec![]]);
        assert!(subset.is_empty());
    }

    #[test]
    fn test_text_item_json_shape() {
        let json = r#"{
            "id": "c1",
            "text": "this takes me back",
            "authorName": "@listener",
            "authorProfileImageUrl": "https://example.com/a.png",
            "likeCount": 42,
            "publishedAt": "2024-05-01T12:00:00Z"
        }"#;
        let item: TextItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "c1");
        assert_eq!(item.author_name, "@listener");
        assert_eq!(item.like_count, 42);
        assert!(item.published_at.is_some());

        let minimal: TextItem = serde_json::from_str(r#"{"id": "c2", "text": "hi"}"#).unwrap();
        assert_eq!(minimal.like_count, 0);
        assert!(minimal.author_profile_image_url.is_none());
    }
}
