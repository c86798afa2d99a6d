//! `.docx` template adapter.
//!
//! A DOCX file is a ZIP archive wrapping WordprocessingML. The adapter reads
//! the archive, parses the first `<w:tbl>` of `word/document.xml` into a
//! [`TableGrid`], and on save splices the rewritten table back between the
//! untouched XML surrounding it, copying every other archive entry verbatim.
//! Table properties (`w:tblPr`) and the column grid (`w:tblGrid`) are kept
//! as raw XML so borders and widths survive untouched.

use std::io::{Cursor, Read, Write};
use std::ops::Range;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::grid::{
    CellRef, GridCell, GridRow, Paragraph, RenderError, ReportGrid, TableGrid, TextStyle, VMerge,
};

const DOCUMENT_PATH: &str = "word/document.xml";

fn zip_err(e: zip::result::ZipError) -> RenderError {
    RenderError::Zip(e.to_string())
}

fn xml_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Xml(e.to_string())
}

/// A loaded template: archive entries plus the parsed table.
#[derive(Debug)]
pub struct DocxTemplate {
    /// Every archive entry in original order, `word/document.xml` included.
    entries: Vec<(String, Vec<u8>)>,
    /// `document.xml` before the first `<w:tbl>`.
    prefix: String,
    /// `document.xml` after the matching `</w:tbl>`.
    suffix: String,
    /// Raw `<w:tblPr>` of the template table, if present.
    tbl_pr: String,
    /// Raw `<w:tblGrid>` of the template table, if present.
    tbl_grid: String,
    grid: TableGrid,
}

impl DocxTemplate {
    /// Load a template from disk.
    pub fn open(path: &Path) -> Result<Self, RenderError> {
        if !path.exists() {
            return Err(RenderError::Template(format!(
                "template not found at {}",
                path.display()
            )));
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Load a template from an in-memory archive.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RenderError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_err)?;
        let mut entries = Vec::with_capacity(archive.len());
        let mut document: Option<Vec<u8>> = None;
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(zip_err)?;
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            if name == DOCUMENT_PATH {
                document = Some(data.clone());
            }
            entries.push((name, data));
        }
        let document = document
            .ok_or_else(|| RenderError::Template("archive has no word/document.xml".to_string()))?;
        let xml = String::from_utf8(document).map_err(xml_err)?;

        let span = element_span(&xml, b"tbl")?
            .ok_or_else(|| RenderError::Template("template has no table".to_string()))?;
        let prefix = xml[..span.start].to_string();
        let suffix = xml[span.end..].to_string();
        let tbl_xml = &xml[span];

        let tbl_pr = element_span(tbl_xml, b"tblPr")?
            .map(|r| tbl_xml[r].to_string())
            .unwrap_or_default();
        let tbl_grid = element_span(tbl_xml, b"tblGrid")?
            .map(|r| tbl_xml[r].to_string())
            .unwrap_or_default();
        let grid = parse_table(tbl_xml)?;

        Ok(Self {
            entries,
            prefix,
            suffix,
            tbl_pr,
            tbl_grid,
            grid,
        })
    }

    pub fn grid(&self) -> &TableGrid {
        &self.grid
    }

    /// The full `document.xml` with the current table state serialized in.
    pub fn document_xml(&self) -> String {
        let mut out = String::with_capacity(self.prefix.len() + self.suffix.len() + 4096);
        out.push_str(&self.prefix);
        out.push_str(&write_table(&self.grid, &self.tbl_pr, &self.tbl_grid));
        out.push_str(&self.suffix);
        out
    }

    /// Write the document to `path`, replacing `word/document.xml` and
    /// copying every other archive entry verbatim.
    pub fn save(&self, path: &Path) -> Result<(), RenderError> {
        let file = std::fs::File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in &self.entries {
            if name.ends_with('/') {
                zip.add_directory(name.as_str(), options).map_err(zip_err)?;
                continue;
            }
            zip.start_file(name.as_str(), options).map_err(zip_err)?;
            if name == DOCUMENT_PATH {
                zip.write_all(self.document_xml().as_bytes())?;
            } else {
                zip.write_all(data)?;
            }
        }
        zip.finish().map_err(zip_err)?;
        Ok(())
    }
}

impl ReportGrid for DocxTemplate {
    fn set_cell_text(
        &mut self,
        cell: CellRef,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), RenderError> {
        self.grid.set_cell_text(cell, text, style)
    }

    fn append_cell_text(
        &mut self,
        cell: CellRef,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), RenderError> {
        self.grid.append_cell_text(cell, text, style)
    }

    fn merge_rows(&mut self, col: usize, start_row: usize, end_row: usize)
        -> Result<(), RenderError> {
        self.grid.merge_rows(col, start_row, end_row)
    }

    fn read_font(&self, cell: CellRef) -> Result<TextStyle, RenderError> {
        self.grid.read_font(cell)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Byte range of the first element with the given local name, tags included.
fn element_span(xml: &str, local: &[u8]) -> Result<Option<Range<usize>>, RenderError> {
    let mut reader = Reader::from_str(xml);
    let mut prev = 0usize;
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    loop {
        let event = reader.read_event().map_err(xml_err)?;
        match event {
            Event::Start(ref e) if e.local_name().as_ref() == local => {
                if depth == 0 {
                    start = Some(prev);
                }
                depth += 1;
            }
            Event::End(ref e) if e.local_name().as_ref() == local => {
                if depth == 0 {
                    return Err(RenderError::Xml(format!(
                        "unbalanced </{}>",
                        String::from_utf8_lossy(local)
                    )));
                }
                depth -= 1;
                if depth == 0 {
                    let end = reader.buffer_position() as usize;
                    return Ok(Some(start.expect("span start recorded")..end));
                }
            }
            Event::Empty(ref e) if e.local_name().as_ref() == local && depth == 0 => {
                return Ok(Some(prev..reader.buffer_position() as usize));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        prev = reader.buffer_position() as usize;
    }
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8])
    -> Result<Option<String>, RenderError> {
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value().map_err(xml_err)?.into_owned()));
        }
    }
    Ok(None)
}

/// Boolean run property: present means on, unless `w:val` says otherwise.
fn flag_value(e: &quick_xml::events::BytesStart<'_>) -> Result<bool, RenderError> {
    Ok(match attr_value(e, b"w:val")?.as_deref() {
        Some("0") | Some("false") | Some("none") => false,
        _ => true,
    })
}

#[derive(Default)]
struct TableParser {
    grid: TableGrid,
    row: Option<GridRow>,
    cell: Option<GridCell>,
    para_text: Option<String>,
    para_style: TextStyle,
    /// The first run's properties win for the whole paragraph.
    para_style_locked: bool,
    in_ppr: bool,
    in_rpr: bool,
    in_tcpr: bool,
    in_text: bool,
    skip_depth: usize,
    tbl_depth: usize,
}

impl TableParser {
    fn open_element(
        &mut self,
        e: &quick_xml::events::BytesStart<'_>,
        is_empty: bool,
    ) -> Result<(), RenderError> {
        if self.skip_depth > 0 {
            if !is_empty {
                self.skip_depth += 1;
            }
            return Ok(());
        }
        match e.local_name().as_ref() {
            b"tbl" => {
                if self.tbl_depth > 0 {
                    return Err(RenderError::Template(
                        "nested tables are not supported".to_string(),
                    ));
                }
                self.tbl_depth += 1;
            }
            b"tblPr" | b"tblGrid" if !is_empty => self.skip_depth = 1,
            b"tr" => self.row = Some(GridRow::default()),
            b"trHeight" => {
                if let (Some(row), Some(val)) = (self.row.as_mut(), attr_value(e, b"w:val")?) {
                    row.height_twips = val.parse().ok();
                }
            }
            b"tc" => self.cell = Some(GridCell::default()),
            b"tcPr" if !is_empty => self.in_tcpr = true,
            b"tcW" if self.in_tcpr => {
                if let (Some(cell), Some(val)) = (self.cell.as_mut(), attr_value(e, b"w:w")?) {
                    cell.width_twips = val.parse().ok();
                }
            }
            b"vMerge" if self.in_tcpr => {
                if let Some(cell) = self.cell.as_mut() {
                    cell.v_merge = match attr_value(e, b"w:val")?.as_deref() {
                        Some("restart") => VMerge::Restart,
                        _ => VMerge::Continue,
                    };
                }
            }
            b"vAlign" if self.in_tcpr => {
                if let Some(cell) = self.cell.as_mut() {
                    cell.v_center = attr_value(e, b"w:val")?.as_deref() == Some("center");
                }
            }
            b"p" if !is_empty => {
                self.para_text = Some(String::new());
                self.para_style = TextStyle::default();
                self.para_style_locked = false;
            }
            b"pPr" if !is_empty => self.in_ppr = true,
            b"jc" if self.in_ppr && !self.in_rpr => {
                if attr_value(e, b"w:val")?.as_deref() == Some("center") {
                    self.para_style.centered = true;
                }
            }
            b"spacing" if self.in_ppr => {
                if attr_value(e, b"w:before")?.as_deref() == Some("0")
                    && attr_value(e, b"w:after")?.as_deref() == Some("0")
                {
                    self.para_style.tight = true;
                }
            }
            // `w:rPr` inside `w:pPr` holds paragraph-mark run properties,
            // which must not bleed into the paragraph's text style.
            b"rPr" if !is_empty && !self.in_ppr => self.in_rpr = true,
            b"rFonts" if self.in_rpr && !self.in_ppr && !self.para_style_locked => {
                self.para_style.family = attr_value(e, b"w:ascii")?;
            }
            b"b" if self.in_rpr && !self.in_ppr && !self.para_style_locked => {
                self.para_style.bold = flag_value(e)?;
            }
            b"i" if self.in_rpr && !self.in_ppr && !self.para_style_locked => {
                self.para_style.italic = flag_value(e)?;
            }
            b"sz" if self.in_rpr && !self.in_ppr && !self.para_style_locked => {
                if let Some(val) = attr_value(e, b"w:val")? {
                    self.para_style.size = val.parse::<f32>().ok().map(|half| half / 2.0);
                }
            }
            b"t" if !is_empty => self.in_text = true,
            _ => {}
        }
        Ok(())
    }

    fn close_element(&mut self, name: &[u8]) {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return;
        }
        match name {
            b"t" => self.in_text = false,
            b"rPr" => {
                if self.in_rpr {
                    self.in_rpr = false;
                    self.para_style_locked = true;
                }
            }
            b"pPr" => self.in_ppr = false,
            b"tcPr" => self.in_tcpr = false,
            b"p" => {
                if let Some(text) = self.para_text.take() {
                    if !text.is_empty() {
                        if let Some(cell) = self.cell.as_mut() {
                            cell.paragraphs.push(Paragraph {
                                text,
                                style: self.para_style.clone(),
                            });
                        }
                    }
                }
                self.para_style = TextStyle::default();
                self.para_style_locked = false;
            }
            b"tc" => {
                if let (Some(row), Some(cell)) = (self.row.as_mut(), self.cell.take()) {
                    row.cells.push(cell);
                }
            }
            b"tr" => {
                if let Some(row) = self.row.take() {
                    self.grid.rows.push(row);
                }
            }
            b"tbl" => self.tbl_depth = self.tbl_depth.saturating_sub(1),
            _ => {}
        }
    }
}

/// Parse a `<w:tbl>...</w:tbl>` fragment into a [`TableGrid`].
fn parse_table(tbl_xml: &str) -> Result<TableGrid, RenderError> {
    let mut reader = Reader::from_str(tbl_xml);
    let mut parser = TableParser::default();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(ref e) => parser.open_element(e, false)?,
            Event::Empty(ref e) => parser.open_element(e, true)?,
            Event::End(ref e) => parser.close_element(e.local_name().as_ref()),
            Event::Text(ref e) => {
                if parser.in_text && parser.skip_depth == 0 {
                    if let Some(text) = parser.para_text.as_mut() {
                        text.push_str(&e.unescape().map_err(xml_err)?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(parser.grid)
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

fn write_run_properties(style: &TextStyle, out: &mut String) {
    if style.family.is_none() && style.size.is_none() && !style.bold && !style.italic {
        return;
    }
    out.push_str("<w:rPr>");
    if let Some(family) = &style.family {
        let family = quick_xml::escape::escape(family.as_str());
        out.push_str(&format!(
            "<w:rFonts w:ascii=\"{family}\" w:hAnsi=\"{family}\" w:cs=\"{family}\"/>"
        ));
    }
    if style.bold {
        out.push_str("<w:b/>");
    }
    if style.italic {
        out.push_str("<w:i/>");
    }
    if let Some(size) = style.size {
        let half_points = (size * 2.0).round() as u32;
        out.push_str(&format!(
            "<w:sz w:val=\"{half_points}\"/><w:szCs w:val=\"{half_points}\"/>"
        ));
    }
    out.push_str("</w:rPr>");
}

fn write_paragraph(paragraph: &Paragraph, out: &mut String) {
    out.push_str("<w:p>");
    let style = &paragraph.style;
    if style.centered || style.tight {
        out.push_str("<w:pPr>");
        if style.tight {
            out.push_str("<w:spacing w:before=\"0\" w:after=\"0\"/>");
        }
        if style.centered {
            out.push_str("<w:jc w:val=\"center\"/>");
        }
        out.push_str("</w:pPr>");
    }
    out.push_str("<w:r>");
    write_run_properties(style, out);
    out.push_str("<w:t xml:space=\"preserve\">");
    out.push_str(&quick_xml::escape::escape(paragraph.text.as_str()));
    out.push_str("</w:t></w:r></w:p>");
}

fn write_cell(cell: &GridCell, out: &mut String) {
    out.push_str("<w:tc><w:tcPr>");
    if let Some(width) = cell.width_twips {
        out.push_str(&format!("<w:tcW w:w=\"{width}\" w:type=\"dxa\"/>"));
    }
    match cell.v_merge {
        VMerge::Restart => out.push_str("<w:vMerge w:val=\"restart\"/>"),
        VMerge::Continue => out.push_str("<w:vMerge w:val=\"continue\"/>"),
        VMerge::None => {}
    }
    if cell.v_center {
        out.push_str("<w:vAlign w:val=\"center\"/>");
    }
    out.push_str("</w:tcPr>");
    if cell.paragraphs.is_empty() {
        // A table cell must contain at least one paragraph.
        out.push_str("<w:p/>");
    } else {
        for paragraph in &cell.paragraphs {
            write_paragraph(paragraph, out);
        }
    }
    out.push_str("</w:tc>");
}

fn write_row(row: &GridRow, out: &mut String) {
    out.push_str("<w:tr>");
    if let Some(height) = row.height_twips {
        out.push_str(&format!("<w:trPr><w:trHeight w:val=\"{height}\"/></w:trPr>"));
    }
    for cell in &row.cells {
        write_cell(cell, out);
    }
    out.push_str("</w:tr>");
}

fn write_table(grid: &TableGrid, tbl_pr: &str, tbl_grid: &str) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<w:tbl>");
    out.push_str(tbl_pr);
    out.push_str(tbl_grid);
    for row in &grid.rows {
        write_row(row, &mut out);
    }
    out.push_str("</w:tbl>");
    out
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Build a minimal template archive for tests: a `rows` × `cols` table with
/// a Calibri 12pt run in cell (1, 3) as the font reference.
#[cfg(test)]
pub(crate) fn write_minimal_template(
    path: &Path,
    rows: usize,
    cols: usize,
) -> Result<(), RenderError> {
    let mut body = String::new();
    body.push_str(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body><w:p><w:r><w:t>Disposition Form</w:t></w:r></w:p><w:tbl>\
         <w:tblPr><w:tblW w:w=\"0\" w:type=\"auto\"/></w:tblPr><w:tblGrid>",
    );
    for _ in 0..cols {
        body.push_str("<w:gridCol w:w=\"2400\"/>");
    }
    body.push_str("</w:tblGrid>");
    for row in 0..rows {
        body.push_str("<w:tr>");
        for col in 0..cols {
            body.push_str("<w:tc><w:tcPr><w:tcW w:w=\"2400\" w:type=\"dxa\"/></w:tcPr>");
            if row == 1 && col == 3 {
                body.push_str(
                    "<w:p><w:r><w:rPr><w:rFonts w:ascii=\"Calibri\" w:hAnsi=\"Calibri\"/>\
                     <w:sz w:val=\"24\"/></w:rPr><w:t>ref</w:t></w:r></w:p>",
                );
            } else {
                body.push_str("<w:p/>");
            }
            body.push_str("</w:tc>");
        }
        body.push_str("</w:tr>");
    }
    body.push_str("</w:tbl><w:sectPr/></w:body></w:document>");

    let content_types = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
        <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
        <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
        <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
        <Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
        </Types>";
    let rels = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
        <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
        <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"word/document.xml\"/>\
        </Relationships>";

    let file = std::fs::File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in [
        ("[Content_Types].xml", content_types),
        ("_rels/.rels", rels),
        (DOCUMENT_PATH, body.as_str()),
    ] {
        zip.start_file(name, options).map_err(zip_err)?;
        zip.write_all(data.as_bytes())?;
    }
    zip.finish().map_err(zip_err)?;
    Ok(())
}
