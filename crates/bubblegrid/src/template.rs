//! Runtime sheet template specification.
//!
//! Template JSON follows the `bubblegrid.template.v1` schema: an ordered list
//! of answer fields, each with an ordered list of bubble regions in image
//! pixel coordinates. Schema validation beyond structural checks is an
//! external concern; [`SheetTemplate::validate`] only rejects shapes the
//! engine cannot process.

use std::collections::HashSet;
use std::path::Path;

use crate::error::EngineError;

const TEMPLATE_SCHEMA_V1: &str = "bubblegrid.template.v1";

/// Axis-aligned bubble region in image pixels.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Region area in pixels.
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

/// One selectable answer option on the sheet.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BubbleDef {
    /// Answer label contributed to the response string when marked.
    pub value: String,
    /// Where the bubble sits on the scanned page.
    pub region: Region,
}

/// An ordered group of bubbles interpreted as one answer field.
///
/// Bubble order is the field's natural (position) order and is preserved
/// through interpretation into the response string.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FieldDef {
    pub label: String,
    pub bubbles: Vec<BubbleDef>,
    /// Per-field override for the empty answer string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_value: Option<String>,
}

/// Runtime sheet template used by the engine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SheetTemplate {
    pub schema: String,
    pub name: String,
    /// Answer string emitted for blank fields. Defaults to the empty string.
    #[serde(default)]
    pub empty_value: String,
    pub fields: Vec<FieldDef>,
}

impl SheetTemplate {
    /// Create a template with the current schema tag.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            schema: TEMPLATE_SCHEMA_V1.to_string(),
            name: name.into(),
            empty_value: String::new(),
            fields,
        }
    }

    /// Load a template from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let data = std::fs::read_to_string(path).map_err(|e| EngineError::TemplateLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let template: Self =
            serde_json::from_str(&data).map_err(|e| EngineError::TemplateLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        template.validate()?;
        Ok(template)
    }

    /// Total number of fields.
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Total number of bubble regions across all fields.
    pub fn n_bubbles(&self) -> usize {
        self.fields.iter().map(|f| f.bubbles.len()).sum()
    }

    /// Empty answer string for a field, honoring per-field overrides.
    pub fn empty_value_for<'a>(&'a self, field: &'a FieldDef) -> &'a str {
        field.empty_value.as_deref().unwrap_or(&self.empty_value)
    }

    /// Reject template shapes the engine cannot process.
    ///
    /// A field with zero bubbles is allowed: it degenerates to a blank
    /// interpretation at runtime rather than failing the batch.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.schema != TEMPLATE_SCHEMA_V1 {
            return Err(EngineError::InvalidTemplate(format!(
                "unsupported schema {:?}, expected {:?}",
                self.schema, TEMPLATE_SCHEMA_V1
            )));
        }
        if self.fields.is_empty() {
            return Err(EngineError::InvalidTemplate(
                "template defines no fields".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.label.is_empty() {
                return Err(EngineError::InvalidTemplate(
                    "field with empty label".to_string(),
                ));
            }
            if !seen.insert(field.label.as_str()) {
                return Err(EngineError::InvalidTemplate(format!(
                    "duplicate field label {:?}",
                    field.label
                )));
            }
            for bubble in &field.bubbles {
                if bubble.region.area() == 0 {
                    return Err(EngineError::InvalidTemplate(format!(
                        "zero-area bubble region in field {:?}",
                        field.label
                    )));
                }
            }
        }
        Ok(())
    }
}
