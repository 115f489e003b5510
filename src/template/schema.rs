//! Persisted JSON form of templates.
//!
//! These types mirror the template collection file exactly, including its
//! loose spots: a background may be a bare string or a `{type, value}`
//! object, and `fontWeight` may be a name or a number. Nothing here is used
//! for rendering directly; [`super::Template::from_document`] normalizes a
//! document into tagged variants once at load time.

use serde::{Deserialize, Serialize};

/// One entry of the template collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDocument {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<BackgroundDocument>,
    #[serde(default)]
    pub layers: Vec<LayerDocument>,
    /// `"pdf"` marks a templated-PDF template.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Background as stored: `"#f0f0f0"`, `"frame.png"` or `{ "type": "image", "value": "frame.png" }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BackgroundDocument {
    Plain(String),
    Typed {
        #[serde(default, rename = "type")]
        kind: Option<String>,
        #[serde(default)]
        value: Option<String>,
    },
}

/// Layer as stored, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerDocument {
    Text(TextLayerDocument),
    Image(ImageLayerDocument),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextLayerDocument {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<FontWeightValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub uppercase: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<DateFormatValue>,
    /// Anchors the layer to the bottom-right safe zone in paginated output.
    #[serde(default, skip_serializing_if = "is_false")]
    pub pinned_footer: bool,
    /// Text box width for the templated-PDF overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f32>,
    /// Text box height for the templated-PDF overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f32>,
    /// Paint a white box under the text in the templated-PDF overlay.
    #[serde(default, skip_serializing_if = "is_false")]
    pub cover: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageLayerDocument {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// `"bold"`, `"normal"`, `"600"` or `700`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FontWeightValue {
    Number(u16),
    Name(String),
}

impl FontWeightValue {
    pub fn is_bold(&self) -> bool {
        match self {
            FontWeightValue::Number(n) => *n >= 600,
            FontWeightValue::Name(name) => {
                let name = name.trim().to_ascii_lowercase();
                match name.as_str() {
                    "bold" | "bolder" => true,
                    other => other.parse::<u16>().is_ok_and(|n| n >= 600),
                }
            }
        }
    }
}

/// `true` or a format string; any truthy value enables date normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DateFormatValue {
    Flag(bool),
    Pattern(String),
}

impl DateFormatValue {
    pub fn is_enabled(&self) -> bool {
        match self {
            DateFormatValue::Flag(flag) => *flag,
            DateFormatValue::Pattern(pattern) => !pattern.is_empty(),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
