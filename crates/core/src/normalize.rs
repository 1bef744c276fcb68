use crate::models::{StructuralUnit, UnitRef};
use serde::{Deserialize, Serialize};

/// Positional metadata as emitted by a format-specific extractor. Each
/// extractor fills in the one field that matches its document type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_number: Option<u32>,
    pub char_start: usize,
    pub char_end: usize,
}

impl UnitMetadata {
    pub fn page(number: u32, char_start: usize, char_end: usize) -> Self {
        Self {
            page_number: Some(number),
            char_start,
            char_end,
            ..Self::default()
        }
    }

    pub fn paragraph(number: u32, char_start: usize, char_end: usize) -> Self {
        Self {
            paragraph_number: Some(number),
            char_start,
            char_end,
            ..Self::default()
        }
    }

    pub fn sheet(name: impl Into<String>, char_start: usize, char_end: usize) -> Self {
        Self {
            sheet_name: Some(name.into()),
            char_start,
            char_end,
            ..Self::default()
        }
    }

    pub fn slide(number: u32, char_start: usize, char_end: usize) -> Self {
        Self {
            slide_number: Some(number),
            char_start,
            char_end,
            ..Self::default()
        }
    }

    /// Picks page, paragraph, sheet, slide in that order. An empty sheet name
    /// counts as absent.
    pub fn unit_ref(&self) -> UnitRef {
        if let Some(page) = self.page_number {
            return UnitRef::Page(page);
        }
        if let Some(paragraph) = self.paragraph_number {
            return UnitRef::Paragraph(paragraph);
        }
        if let Some(sheet) = self.sheet_name.as_deref().filter(|name| !name.is_empty()) {
            return UnitRef::Sheet(sheet.to_string());
        }
        if let Some(slide) = self.slide_number {
            return UnitRef::Slide(slide);
        }
        UnitRef::Unknown
    }

    pub fn normalize(&self) -> StructuralUnit {
        StructuralUnit {
            unit_ref: self.unit_ref(),
            char_start: self.char_start,
            char_end: self.char_end,
        }
    }
}

pub fn normalize_units(metadata: &[UnitMetadata]) -> Vec<StructuralUnit> {
    metadata.iter().map(UnitMetadata::normalize).collect()
}
