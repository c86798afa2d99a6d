//! Report Composer: selects a bounded random subset of a person's entries
//! and computes a non-overlapping row-span placement for each inside the
//! template's entry band, then drives a [`ReportGrid`] to realize it.
//!
//! Randomness is injected through [`Sampler`] so tests can script every
//! draw; production uses [`ThreadSampler`] over the thread-local RNG.

use std::collections::HashSet;

use rand::RngExt;

use crate::grid::{CellRef, RenderError, ReportGrid, TextStyle};
use crate::layout::{ReportLayout, RowBand};
use crate::util::{covering_caption, PeriodDate};

/// At most this many entries appear on one disposition.
pub const MAX_ENTRIES_PER_REPORT: usize = 3;

/// Row spans an entry region may occupy.
pub const SPAN_CHOICES: [usize; 3] = [2, 3, 4];

/// Uniform random draws, injectable for deterministic tests.
pub trait Sampler: Send {
    /// `k` distinct indices drawn uniformly from `0..len`, in random order.
    fn sample(&mut self, len: usize, k: usize) -> Vec<usize>;

    /// One index drawn uniformly from `0..len`. `len` must be non-zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// Production sampler over the thread-local RNG.
#[derive(Debug, Default)]
pub struct ThreadSampler;

impl Sampler for ThreadSampler {
    fn sample(&mut self, len: usize, k: usize) -> Vec<usize> {
        rand::seq::index::sample(&mut rand::rng(), len, k).into_vec()
    }

    fn pick(&mut self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// One placed entry: rows `start_row..=start_row + span - 1` at the layout's
/// entry column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub text: String,
    pub start_row: usize,
    pub span: usize,
}

impl Placement {
    pub fn end_row(&self) -> usize {
        self.start_row + self.span - 1
    }
}

/// Result of a placement run. `skipped` counts selected entries that were
/// dropped because no candidate start row remained — the document is still
/// valid, but the loss is observable here.
#[derive(Debug, Clone, Default)]
pub struct PlacementPlan {
    pub placements: Vec<Placement>,
    pub skipped: usize,
}

/// Draw `min(3, len)` entries uniformly without replacement, in random order.
pub fn select_entries(entries: &[String], sampler: &mut dyn Sampler) -> Vec<String> {
    let k = entries.len().min(MAX_ENTRIES_PER_REPORT);
    sampler
        .sample(entries.len(), k)
        .into_iter()
        .map(|i| entries[i].clone())
        .collect()
}

/// Place the selected entries into `band`, in selection order.
///
/// Each entry draws a span from [`SPAN_CHOICES`], then a start row uniformly
/// from the positions whose range stays inside the band and off already-used
/// rows. The first entry with no candidate stops placement; it and everything
/// after it count as skipped.
pub fn plan_placements(
    selected: Vec<String>,
    band: RowBand,
    sampler: &mut dyn Sampler,
) -> PlacementPlan {
    let total = selected.len();
    let mut used: HashSet<usize> = HashSet::new();
    let mut placements = Vec::with_capacity(total);

    for (placed, text) in selected.into_iter().enumerate() {
        let span = SPAN_CHOICES[sampler.pick(SPAN_CHOICES.len())];
        let candidates: Vec<usize> = band
            .rows()
            .filter(|&r| {
                r + span - 1 <= band.hi && (r..r + span).all(|row| !used.contains(&row))
            })
            .collect();
        if candidates.is_empty() {
            return PlacementPlan {
                placements,
                skipped: total - placed,
            };
        }
        let start_row = candidates[sampler.pick(candidates.len())];
        used.extend(start_row..start_row + span);
        placements.push(Placement {
            text,
            start_row,
            span,
        });
    }

    PlacementPlan {
        placements,
        skipped: 0,
    }
}

fn name_style() -> TextStyle {
    TextStyle::sized("Arial", 13.0)
}

fn title_style() -> TextStyle {
    TextStyle {
        bold: true,
        centered: true,
        ..TextStyle::sized("Arial", 16.0)
    }
}

fn caption_style() -> TextStyle {
    TextStyle {
        bold: true,
        italic: true,
        centered: true,
        ..TextStyle::sized("Arial", 13.0)
    }
}

/// Compose a disposition into `grid`: header name, title + covering-period
/// caption, then the randomized entry placements. With zero entries the
/// header cells are still written and the entry band is left untouched.
pub fn compose_report(
    grid: &mut dyn ReportGrid,
    layout: &ReportLayout,
    person_name: &str,
    entries: &[String],
    period: &PeriodDate,
    sampler: &mut dyn Sampler,
) -> Result<PlacementPlan, RenderError> {
    grid.set_cell_text(
        layout.name_cell,
        &format!("Name: {person_name}"),
        &name_style(),
    )?;
    grid.set_cell_text(layout.caption_cell, "DISPOSITION", &title_style())?;
    grid.append_cell_text(layout.caption_cell, &covering_caption(period), &caption_style())?;

    let entry_font = grid.read_font(layout.font_reference_cell)?;
    let selected = select_entries(entries, sampler);
    let plan = plan_placements(selected, layout.entry_band, sampler);

    for placement in &plan.placements {
        grid.merge_rows(layout.entry_column, placement.start_row, placement.end_row())?;
        let style = TextStyle {
            centered: true,
            tight: true,
            ..entry_font.clone()
        };
        grid.set_cell_text(
            CellRef::new(placement.start_row, layout.entry_column),
            &placement.text,
            &style,
        )?;
    }

    Ok(plan)
}
