#[cfg(test)]
mod tests;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Largest chunk, in characters, that is sent to the embedding model as one input
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 30_000;

/// Kind of content a chunk was extracted from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    #[default]
    Text,
    Table,
    Image,
}

impl ChunkType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ChunkType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "table" => Ok(Self::Table),
            "image" => Ok(Self::Image),
            other => Err(format!(
                "unknown chunk type '{}' (expected text, table or image)",
                other
            )),
        }
    }
}

/// A unit of extracted document content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Extracted text, table rendering, or image caption
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub chunk_type: ChunkType,
    /// Negative pages, such as `-1`, read as no page
    #[serde(default, alias = "page", deserialize_with = "deserialize_page")]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub id: Option<String>,
    /// Arbitrary key/value metadata, cleaned before it is stored
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    /// Image reference (URI or filename)
    #[serde(default)]
    pub uri: Option<String>,
}

fn deserialize_page<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<i64>::deserialize(deserializer)? {
        Some(page) if page >= 0 => u32::try_from(page).map(Some).map_err(D::Error::custom),
        _ => Ok(None),
    }
}

impl Chunk {
    #[inline]
    pub fn new(chunk_type: ChunkType, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            chunk_type,
            page_number: None,
            id: None,
            metadata: None,
            uri: None,
        }
    }

    #[inline]
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(ChunkType::Text, content)
    }

    #[inline]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[inline]
    pub fn with_page(mut self, page_number: u32) -> Self {
        self.page_number = Some(page_number);
        self
    }

    #[inline]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[inline]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Content length in characters
    #[inline]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Text to embed for an image chunk: its content, then the `caption` or
    /// `filename` metadata, then the file name of its URI
    #[inline]
    pub fn text_surrogate(&self) -> Option<String> {
        if !self.content.trim().is_empty() {
            return Some(self.content.clone());
        }

        let from_metadata = |key: &str| {
            self.metadata
                .as_ref()
                .and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        from_metadata("caption")
            .or_else(|| from_metadata("filename"))
            .or_else(|| {
                self.image_reference()
                    .and_then(|uri| uri.rsplit(['/', '\\']).next())
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            })
    }

    /// The image reference, if one is set and non-blank
    #[inline]
    pub fn image_reference(&self) -> Option<&str> {
        self.uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
    }
}

/// Split chunks whose content is longer than `max_len` characters
///
/// Each oversized chunk is sliced into consecutive `max_len`-character parts.
/// Parts keep the source chunk's type, page, metadata and URI, and get the id
/// `<id>_part_<n>` when the source had one. Chunks within the limit pass
/// through unchanged. A `max_len` of zero disables splitting.
#[inline]
pub fn split_oversized_chunks(chunks: Vec<Chunk>, max_len: usize) -> Vec<Chunk> {
    if max_len == 0 {
        return chunks;
    }

    let mut result = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let length = chunk.char_len();
        if length <= max_len {
            result.push(chunk);
            continue;
        }

        debug!(
            "Splitting oversized {} chunk of {} characters into parts of {}",
            chunk.chunk_type, length, max_len
        );

        let chars: Vec<char> = chunk.content.chars().collect();
        for (n, part) in chars.chunks(max_len).enumerate() {
            result.push(Chunk {
                content: part.iter().collect(),
                chunk_type: chunk.chunk_type,
                page_number: chunk.page_number,
                id: chunk.id.as_ref().map(|id| format!("{}_part_{}", id, n)),
                metadata: chunk.metadata.clone(),
                uri: chunk.uri.clone(),
            });
        }
    }

    result
}
