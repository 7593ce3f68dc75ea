//! DOCX document parser using docx-rs
//!
//! Heading-styled paragraphs open new sections; tables are rendered as
//! markdown into the running text.

use docx_rs::{read_docx, DocumentChild, Paragraph, ParagraphChild, RunChild};

use crate::{DocumentParser, DocumentSection, FileType, ParsedDocument, ParserError, Result, Table};

/// DOCX document parser
#[derive(Debug, Clone, Default)]
pub struct DocxParser;

impl DocxParser {
    pub fn new() -> Self {
        Self
    }
}

/// Concatenated text of a paragraph's runs
fn paragraph_text(para: &Paragraph) -> String {
    let mut text = String::new();
    for child in &para.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

/// Heading level for a paragraph style id such as `Heading2`
fn heading_level(style_id: &str) -> Option<u8> {
    let lower = style_id.to_ascii_lowercase();
    let rest = lower.strip_prefix("heading")?;
    Some(rest.trim().parse::<u8>().unwrap_or(1).clamp(1, 9))
}

fn table_from(tbl: &docx_rs::Table) -> Table {
    let mut table = Table::new();

    for (i, row) in tbl.rows.iter().enumerate() {
        let docx_rs::TableChild::TableRow(tr) = row;
        let cells: Vec<String> = tr
            .cells
            .iter()
            .map(|cell| {
                let docx_rs::TableRowChild::TableCell(tc) = cell;
                tc.children
                    .iter()
                    .filter_map(|content| match content {
                        docx_rs::TableCellContent::Paragraph(para) => Some(paragraph_text(para)),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
                    .trim()
                    .to_string()
            })
            .collect();

        if i == 0 {
            table.headers = cells;
        } else {
            table.add_row(cells);
        }
    }

    table
}

/// Accumulates body text into the section opened by the last heading
#[derive(Default)]
struct SectionBuilder {
    sections: Vec<DocumentSection>,
    title: Option<String>,
    level: u8,
    content: String,
}

impl SectionBuilder {
    fn heading(&mut self, title: &str, level: u8) {
        self.flush();
        self.title = Some(title.to_string());
        self.level = level;
    }

    fn push(&mut self, text: &str) {
        self.content.push_str(text);
        self.content.push('\n');
    }

    fn flush(&mut self) {
        if !self.content.trim().is_empty() || self.title.is_some() {
            self.sections.push(DocumentSection {
                title: self.title.take(),
                level: self.level.max(1),
                content: self.content.trim().to_string(),
                start_page: None,
            });
        }
        self.content.clear();
    }

    fn finish(mut self) -> Vec<DocumentSection> {
        self.flush();
        self.sections
    }
}

impl DocumentParser for DocxParser {
    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let docx =
            read_docx(bytes).map_err(|e| ParserError::DocxError(format!("{name}: {e}")))?;

        let mut content = String::new();
        let mut tables = Vec::new();
        let mut sections = SectionBuilder::default();

        for child in &docx.document.children {
            match child {
                DocumentChild::Paragraph(para) => {
                    let text = paragraph_text(para);
                    let level = para
                        .property
                        .style
                        .as_ref()
                        .and_then(|style| heading_level(&style.val));

                    match level {
                        Some(level) if !text.trim().is_empty() => {
                            sections.heading(text.trim(), level)
                        }
                        _ => sections.push(&text),
                    }

                    content.push_str(&text);
                    content.push('\n');
                }
                DocumentChild::Table(tbl) => {
                    let table = table_from(tbl);
                    let markdown = table.to_markdown();
                    sections.push(&markdown);
                    content.push_str(&markdown);
                    content.push('\n');
                    tables.push(table);
                }
                _ => {}
            }
        }

        let mut doc = ParsedDocument::new(name, FileType::Docx).with_content(content);
        doc.sections = sections.finish();
        doc.tables = tables;
        tracing::debug!(
            "Parsed {name}: {} sections, {} tables",
            doc.sections.len(),
            doc.tables.len()
        );
        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Docx]
    }
}
