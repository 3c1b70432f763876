//! Content-category metadata value object.

use serde::{Deserialize, Serialize};

/// Typed metadata attached to a file, tagged by content category, with an
/// opaque escape hatch for attributes no category models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum ContentMetadata {
    /// Raster image attributes.
    Image {
        /// Pixel width.
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        /// Pixel height.
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    /// Video attributes.
    Video {
        /// Pixel width.
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        /// Pixel height.
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
        /// Playback duration in seconds.
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<f64>,
        /// Codec name.
        #[serde(skip_serializing_if = "Option::is_none")]
        codec: Option<String>,
    },
    /// Document attributes.
    Document {
        /// Number of pages.
        #[serde(skip_serializing_if = "Option::is_none")]
        page_count: Option<u32>,
        /// Document author.
        #[serde(skip_serializing_if = "Option::is_none")]
        author: Option<String>,
    },
    /// Unmodeled attributes, kept verbatim.
    Other {
        /// Arbitrary key-value attributes.
        #[serde(default)]
        attributes: serde_json::Value,
    },
}

impl Default for ContentMetadata {
    fn default() -> Self {
        Self::Other {
            attributes: serde_json::Value::Null,
        }
    }
}

impl ContentMetadata {
    /// Convert to a `serde_json::Value` for storage.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Parse from a stored `serde_json::Value`; unparseable input falls
    /// back to [`ContentMetadata::Other`] carrying the raw value.
    pub fn from_json_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|_| Self::Other {
            attributes: value.clone(),
        })
    }

    /// Pick a category from a MIME type with no attributes filled in.
    pub fn for_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.starts_with("image/") => Self::Image {
                width: None,
                height: None,
            },
            Some(ct) if ct.starts_with("video/") => Self::Video {
                width: None,
                height: None,
                duration_seconds: None,
                codec: None,
            },
            Some("application/pdf") | Some("text/plain") => Self::Document {
                page_count: None,
                author: None,
            },
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        let meta = ContentMetadata::Image {
            width: Some(640),
            height: Some(480),
        };
        let value = meta.to_json_value();
        assert_eq!(value["category"], "image");
        assert_eq!(ContentMetadata::from_json_value(&value), meta);
    }

    #[test]
    fn test_unknown_shape_falls_back_to_other() {
        let raw = serde_json::json!({"exposure": "1/250"});
        let meta = ContentMetadata::from_json_value(&raw);
        assert_eq!(
            meta,
            ContentMetadata::Other {
                attributes: raw.clone()
            }
        );
    }

    #[test]
    fn test_category_from_content_type() {
        assert!(matches!(
            ContentMetadata::for_content_type(Some("video/mp4")),
            ContentMetadata::Video { .. }
        ));
        assert!(matches!(
            ContentMetadata::for_content_type(None),
            ContentMetadata::Other { .. }
        ));
    }
}
