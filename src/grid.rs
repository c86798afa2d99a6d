//! Rendering contract and the in-memory grid model.
//!
//! [`ReportGrid`] is the surface the composer writes through: addressable
//! cells, vertical merges, and a readable reference font. [`TableGrid`] is
//! the concrete model — the `.docx` adapter parses a template table into one
//! and serializes it back out; unit tests drive it directly.

use thiserror::Error;

/// Errors from grid mutation or template handling.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cell ({row}, {col}) is outside the table")]
    CellOutOfBounds { row: usize, col: usize },

    #[error("invalid merge range: rows {start}..={end} in column {col}")]
    BadMergeRange { col: usize, start: usize, end: usize },

    #[error("template error: {0}")]
    Template(String),

    #[error("document XML error: {0}")]
    Xml(String),

    #[error("archive error: {0}")]
    Zip(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A (row, column) table address. Merged regions are addressed at their
/// top cell; continuation cells still exist in the row matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// How a paragraph of cell text is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextStyle {
    pub family: Option<String>,
    /// Point size, e.g. 13.0.
    pub size: Option<f32>,
    pub bold: bool,
    pub italic: bool,
    pub centered: bool,
    /// Zero spacing before/after the paragraph.
    pub tight: bool,
}

impl TextStyle {
    pub fn sized(family: &str, size: f32) -> Self {
        Self {
            family: Some(family.to_string()),
            size: Some(size),
            ..Self::default()
        }
    }
}

/// One paragraph inside a cell. A single style covers the whole paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub text: String,
    pub style: TextStyle,
}

/// Vertical-merge state of a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VMerge {
    #[default]
    None,
    /// Top cell of a merged region.
    Restart,
    /// Continuation cell of the region above it.
    Continue,
}

#[derive(Debug, Clone, Default)]
pub struct GridCell {
    pub width_twips: Option<u64>,
    pub v_merge: VMerge,
    /// Vertically center cell content. Set whenever the composer writes text.
    pub v_center: bool,
    pub paragraphs: Vec<Paragraph>,
}

impl GridCell {
    /// Concatenated text of all paragraphs, newline-separated.
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default)]
pub struct GridRow {
    pub height_twips: Option<u64>,
    pub cells: Vec<GridCell>,
}

/// Grid surface the composer writes through.
pub trait ReportGrid {
    /// Replace the cell's content with a single styled paragraph.
    fn set_cell_text(&mut self, cell: CellRef, text: &str, style: &TextStyle)
        -> Result<(), RenderError>;

    /// Append a styled paragraph to the cell's existing content.
    fn append_cell_text(
        &mut self,
        cell: CellRef,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), RenderError>;

    /// Vertically merge `start_row..=end_row` in `col` into one region.
    /// Content of the continuation cells is cleared; the region is
    /// subsequently addressed at its top cell.
    fn merge_rows(&mut self, col: usize, start_row: usize, end_row: usize)
        -> Result<(), RenderError>;

    /// Font family and size of the cell's first paragraph. Layout flags on
    /// the returned style are always unset.
    fn read_font(&self, cell: CellRef) -> Result<TextStyle, RenderError>;
}

/// In-memory table: the unmerged row/cell matrix plus merge markers.
#[derive(Debug, Clone, Default)]
pub struct TableGrid {
    pub(crate) rows: Vec<GridRow>,
}

impl TableGrid {
    /// An empty `rows` × `cols` grid.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows: (0..rows)
                .map(|_| GridRow {
                    height_twips: None,
                    cells: (0..cols).map(|_| GridCell::default()).collect(),
                })
                .collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, cell: CellRef) -> Option<&GridCell> {
        self.rows.get(cell.row)?.cells.get(cell.col)
    }

    fn cell_mut(&mut self, cell: CellRef) -> Result<&mut GridCell, RenderError> {
        self.rows
            .get_mut(cell.row)
            .and_then(|r| r.cells.get_mut(cell.col))
            .ok_or(RenderError::CellOutOfBounds {
                row: cell.row,
                col: cell.col,
            })
    }
}

impl ReportGrid for TableGrid {
    fn set_cell_text(
        &mut self,
        cell: CellRef,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), RenderError> {
        let slot = self.cell_mut(cell)?;
        slot.paragraphs.clear();
        slot.paragraphs.push(Paragraph {
            text: text.to_string(),
            style: style.clone(),
        });
        slot.v_center = true;
        Ok(())
    }

    fn append_cell_text(
        &mut self,
        cell: CellRef,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), RenderError> {
        let slot = self.cell_mut(cell)?;
        slot.paragraphs.push(Paragraph {
            text: text.to_string(),
            style: style.clone(),
        });
        slot.v_center = true;
        Ok(())
    }

    fn merge_rows(
        &mut self,
        col: usize,
        start_row: usize,
        end_row: usize,
    ) -> Result<(), RenderError> {
        if start_row > end_row {
            return Err(RenderError::BadMergeRange {
                col,
                start: start_row,
                end: end_row,
            });
        }
        // Validate the whole range before mutating anything.
        for row in start_row..=end_row {
            if self.cell(CellRef { row, col }).is_none() {
                return Err(RenderError::CellOutOfBounds { row, col });
            }
        }
        for row in start_row..=end_row {
            let slot = self.cell_mut(CellRef { row, col })?;
            if row == start_row {
                slot.v_merge = VMerge::Restart;
            } else {
                slot.v_merge = VMerge::Continue;
                slot.paragraphs.clear();
            }
        }
        Ok(())
    }

    fn read_font(&self, cell: CellRef) -> Result<TextStyle, RenderError> {
        let slot = self.cell(cell).ok_or(RenderError::CellOutOfBounds {
            row: cell.row,
            col: cell.col,
        })?;
        let font = slot.paragraphs.first().map(|p| &p.style);
        Ok(TextStyle {
            family: font.and_then(|s| s.family.clone()),
            size: font.and_then(|s| s.size),
            ..TextStyle::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_cell_text_replaces_content() {
        let mut grid = TableGrid::new(3, 2);
        let cell = CellRef::new(1, 1);
        grid.set_cell_text(cell, "first", &TextStyle::default()).unwrap();
        grid.set_cell_text(cell, "second", &TextStyle::default()).unwrap();
        assert_eq!(grid.cell(cell).unwrap().text(), "second");
        assert!(grid.cell(cell).unwrap().v_center);
    }

    #[test]
    fn test_append_cell_text_adds_paragraph() {
        let mut grid = TableGrid::new(3, 2);
        let cell = CellRef::new(0, 0);
        grid.set_cell_text(cell, "title", &TextStyle::default()).unwrap();
        grid.append_cell_text(cell, "caption", &TextStyle::default()).unwrap();
        assert_eq!(grid.cell(cell).unwrap().text(), "title\ncaption");
    }

    #[test]
    fn test_merge_rows_marks_region() {
        let mut grid = TableGrid::new(5, 3);
        grid.set_cell_text(CellRef::new(3, 2), "stale", &TextStyle::default())
            .unwrap();
        grid.merge_rows(2, 2, 4).unwrap();
        assert_eq!(grid.cell(CellRef::new(2, 2)).unwrap().v_merge, VMerge::Restart);
        assert_eq!(grid.cell(CellRef::new(3, 2)).unwrap().v_merge, VMerge::Continue);
        assert_eq!(grid.cell(CellRef::new(4, 2)).unwrap().v_merge, VMerge::Continue);
        // Continuation cells lose their content.
        assert_eq!(grid.cell(CellRef::new(3, 2)).unwrap().text(), "");
    }

    #[test]
    fn test_merge_rows_out_of_bounds() {
        let mut grid = TableGrid::new(3, 2);
        let err = grid.merge_rows(1, 1, 5).unwrap_err();
        assert!(matches!(err, RenderError::CellOutOfBounds { row: 3, col: 1 }));
        // Nothing was mutated.
        assert_eq!(grid.cell(CellRef::new(1, 1)).unwrap().v_merge, VMerge::None);
    }

    #[test]
    fn test_read_font_strips_layout_flags() {
        let mut grid = TableGrid::new(2, 2);
        let style = TextStyle {
            family: Some("Arial".to_string()),
            size: Some(12.0),
            bold: true,
            centered: true,
            ..TextStyle::default()
        };
        grid.set_cell_text(CellRef::new(0, 1), "ref", &style).unwrap();
        let font = grid.read_font(CellRef::new(0, 1)).unwrap();
        assert_eq!(font.family.as_deref(), Some("Arial"));
        assert_eq!(font.size, Some(12.0));
        assert!(!font.bold && !font.centered);
    }

    #[test]
    fn test_read_font_empty_cell() {
        let grid = TableGrid::new(2, 2);
        let font = grid.read_font(CellRef::new(0, 0)).unwrap();
        assert_eq!(font, TextStyle::default());
    }
}
