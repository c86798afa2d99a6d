//! Disposition document generation: compose into the template, write the
//! artifact at its deterministic path, hand the caller a handle.
//!
//! The caller owns the artifact's remaining lifecycle — transmit it, then
//! delete it.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::compose::{compose_report, PlacementPlan, Sampler};
use crate::docx::DocxTemplate;
use crate::grid::RenderError;
use crate::layout::ReportLayout;
use crate::util::{artifact_filename, covering_period};

/// A materialized disposition document.
#[derive(Debug)]
pub struct ReportArtifact {
    /// Where the document was written.
    pub path: PathBuf,
    /// Display filename, also the basename of `path`.
    pub filename: String,
    pub plan: PlacementPlan,
}

/// Generate a disposition for one person into `output_dir`.
///
/// The covering period is yesterday at UTC+8, computed from the current
/// instant; the filename follows
/// `DISPOSITION_<day>_<month>_<year>_<firstToken>.docx`.
pub fn generate_disposition(
    template_path: &Path,
    output_dir: &Path,
    person_name: &str,
    entries: &[String],
    sampler: &mut dyn Sampler,
) -> Result<ReportArtifact, RenderError> {
    let layout = ReportLayout::default();
    let period = covering_period(Utc::now());

    let mut template = DocxTemplate::open(template_path)?;
    let plan = compose_report(
        &mut template,
        &layout,
        person_name,
        entries,
        &period,
        sampler,
    )?;
    if plan.skipped > 0 {
        log::warn!(
            "placement band exhausted for {}: {} selected entr{} not placed",
            person_name,
            plan.skipped,
            if plan.skipped == 1 { "y" } else { "ies" }
        );
    }

    std::fs::create_dir_all(output_dir)?;
    let filename = artifact_filename(person_name, &period);
    let path = output_dir.join(&filename);
    template.save(&path)?;

    Ok(ReportArtifact {
        path,
        filename,
        plan,
    })
}
