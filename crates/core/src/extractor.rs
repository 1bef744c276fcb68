use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use crate::models::SourceDocument;
use crate::normalize::{normalize_units, UnitMetadata};
use calamine::{open_workbook_auto, Data, Reader};
use lopdf::Document;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Text and raw positional metadata for one file, before normalization.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub filename: String,
    pub text: String,
    pub metadata: Vec<UnitMetadata>,
    char_len: usize,
}

impl ExtractedDocument {
    fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Appends a unit's text followed by a newline. The unit's span covers
    /// its text only.
    fn push_unit(&mut self, text: &str, describe: impl FnOnce(usize, usize) -> UnitMetadata) {
        let char_start = self.char_len;
        let char_end = char_start + text.chars().count();
        self.text.push_str(text);
        self.text.push('\n');
        self.char_len = char_end + 1;
        self.metadata.push(describe(char_start, char_end));
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn normalize(self) -> SourceDocument {
        SourceDocument {
            units: normalize_units(&self.metadata),
            filename: self.filename,
            text: self.text,
        }
    }
}

pub trait DocumentExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError>;
}

#[derive(Default)]
pub struct PdfExtractor;

impl DocumentExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut extracted = ExtractedDocument::new(document_name(path)?);
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;
            let text = normalize_whitespace(&text);

            if !text.is_empty() {
                extracted.push_unit(&text, |start, end| UnitMetadata::page(page_no, start, end));
            }
        }

        if extracted.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(extracted)
    }
}

/// Plain text and markdown; blank lines separate paragraphs.
#[derive(Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn extract_str(&self, filename: &str, raw: &str) -> ExtractedDocument {
        let mut extracted = ExtractedDocument::new(filename);
        let raw = raw.replace("\r\n", "\n");

        for (index, paragraph) in raw.split("\n\n").enumerate() {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            let number = index as u32 + 1;
            extracted.push_unit(paragraph, |start, end| {
                UnitMetadata::paragraph(number, start, end)
            });
        }

        extracted
    }
}

impl DocumentExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let raw = fs::read_to_string(path)?;
        Ok(self.extract_str(&document_name(path)?, &raw))
    }
}

/// Word documents: one unit per `w:p` paragraph, numbered by position
/// including empty paragraphs.
#[derive(Default)]
pub struct DocxExtractor;

impl DocxExtractor {
    pub fn extract_xml(&self, filename: &str, document_xml: &str) -> ExtractedDocument {
        let mut extracted = ExtractedDocument::new(filename);

        for (index, paragraph) in ooxml_paragraphs(document_xml, "w").iter().enumerate() {
            if paragraph.trim().is_empty() {
                continue;
            }
            let number = index as u32 + 1;
            extracted.push_unit(paragraph, |start, end| {
                UnitMetadata::paragraph(number, start, end)
            });
        }

        extracted
    }
}

impl DocumentExtractor for DocxExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let mut archive = open_archive(path)?;
        let xml = read_entry(&mut archive, "word/document.xml")?;
        Ok(self.extract_xml(&document_name(path)?, &xml))
    }
}

/// Workbooks readable by calamine (`.xlsx`, `.xls`): one unit per sheet.
#[derive(Default)]
pub struct SpreadsheetExtractor;

impl SpreadsheetExtractor {
    /// `sheets` holds each sheet's name and its rows of rendered cells.
    pub fn extract_sheets<I>(&self, filename: &str, sheets: I) -> ExtractedDocument
    where
        I: IntoIterator<Item = (String, Vec<Vec<String>>)>,
    {
        let mut extracted = ExtractedDocument::new(filename);

        for (name, rows) in sheets {
            let mut text = format!("=== Sheet: {name} ===");
            for row in &rows {
                let line = row.join("\t");
                if !line.trim().is_empty() {
                    text.push('\n');
                    text.push_str(&line);
                }
            }
            extracted.push_unit(&text, |start, end| UnitMetadata::sheet(name, start, end));
        }

        extracted
    }
}

impl DocumentExtractor for SpreadsheetExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let mut workbook =
            open_workbook_auto(path).map_err(|error| IngestError::OfficeParse(error.to_string()))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|error| IngestError::OfficeParse(format!("sheet {name}: {error}")))?;
            let rows: Vec<Vec<String>> = range
                .rows()
                .map(|row| row.iter().map(cell_text).collect())
                .collect();
            sheets.push((name, rows));
        }

        Ok(self.extract_sheets(&document_name(path)?, sheets))
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) if value.fract() == 0.0 => format!("{value:.0}"),
        Data::Float(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(value) => value.to_string(),
        Data::DateTimeIso(text) | Data::DurationIso(text) => text.clone(),
        Data::Error(error) => format!("#ERR:{error:?}"),
    }
}

/// Presentations: one unit per `ppt/slides/slideN.xml`, in slide order.
#[derive(Default)]
pub struct PptxExtractor;

impl PptxExtractor {
    pub fn extract_slides<I, S>(&self, filename: &str, slides: I) -> ExtractedDocument
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extracted = ExtractedDocument::new(filename);

        for (index, slide_xml) in slides.into_iter().enumerate() {
            let number = index as u32 + 1;
            let mut text = format!("=== Slide {number} ===");
            for paragraph in ooxml_paragraphs(slide_xml.as_ref(), "a") {
                if !paragraph.trim().is_empty() {
                    text.push('\n');
                    text.push_str(&paragraph);
                }
            }
            extracted.push_unit(&text, |start, end| UnitMetadata::slide(number, start, end));
        }

        extracted
    }
}

impl DocumentExtractor for PptxExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let mut archive = open_archive(path)?;

        let mut slide_entries: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|name| {
                let number = name
                    .strip_prefix("ppt/slides/slide")?
                    .strip_suffix(".xml")?
                    .parse()
                    .ok()?;
                Some((number, name.to_string()))
            })
            .collect();
        slide_entries.sort_unstable();

        let mut slides = Vec::with_capacity(slide_entries.len());
        for (_, name) in &slide_entries {
            slides.push(read_entry(&mut archive, name)?);
        }

        Ok(self.extract_slides(&document_name(path)?, slides))
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, IngestError> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|error| {
        IngestError::OfficeParse(format!("invalid archive {}: {error}", path.display()))
    })
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String, IngestError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|error| IngestError::OfficeParse(format!("{name}: {error}")))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Collects the text of every `<prefix:p>` paragraph from WordprocessingML
/// (`w`) or DrawingML (`a`) markup. Only `<prefix:t>` runs contribute text;
/// `tab` and `br` elements become `\t` and `\n`. Tab stops declared in
/// paragraph properties are ignored.
fn ooxml_paragraphs(xml: &str, prefix: &str) -> Vec<String> {
    let paragraph_tag = format!("{prefix}:p");
    let properties_tag = format!("{prefix}:pPr");
    let text_tag = format!("{prefix}:t");
    let tab_tag = format!("{prefix}:tab");
    let break_tag = format!("{prefix}:br");

    let mut paragraphs: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut in_properties = false;
    let mut chars = xml.chars();

    while let Some(c) = chars.next() {
        if c != '<' {
            if in_text {
                if let Some(paragraph) = paragraphs.last_mut() {
                    paragraph.push(c);
                }
            }
            continue;
        }

        let tag: String = chars.by_ref().take_while(|&tc| tc != '>').collect();
        let (closing, body) = match tag.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, tag.as_str()),
        };
        let self_closing = body.ends_with('/');
        let name = body
            .split(|ch: char| ch.is_whitespace() || ch == '/')
            .next()
            .unwrap_or_default();

        if name == text_tag {
            in_text = !closing && !self_closing;
        } else if name == properties_tag && !self_closing {
            in_properties = !closing;
        } else if name == paragraph_tag && !closing {
            paragraphs.push(String::new());
        } else if !closing && !in_properties {
            let inserted = if name == tab_tag {
                Some('\t')
            } else if name == break_tag {
                Some('\n')
            } else {
                None
            };
            if let (Some(ch), Some(paragraph)) = (inserted, paragraphs.last_mut()) {
                paragraph.push(ch);
            }
        }
    }

    paragraphs.iter().map(|paragraph| decode_entities(paragraph)).collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Picks an extractor by file extension.
pub fn extract_document(path: &Path) -> Result<ExtractedDocument, IngestError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => PdfExtractor.extract(path),
        "txt" | "md" => PlainTextExtractor.extract(path),
        "docx" => DocxExtractor.extract(path),
        "xlsx" | "xls" => SpreadsheetExtractor.extract(path),
        "pptx" => PptxExtractor.extract(path),
        _ => Err(IngestError::UnsupportedFormat(format!(
            "no extractor for .{extension} files: {}",
            path.display()
        ))),
    }
}

/// Documents are identified by file stem, as in the source listing.
fn document_name(path: &Path) -> Result<String, IngestError> {
    path.file_stem()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}
