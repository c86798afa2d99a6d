//! Flow-level error taxonomy.
//!
//! Catalog and rendering failures abort the current flow: the operator gets
//! a generic notice, the conversation returns to the main menu, and the
//! details go to the log. Delivery failures are handled separately (logged
//! and swallowed) and never reach this type. Nothing here is fatal to the
//! dispatch loop.

use thiserror::Error;

use crate::db::DbError;
use crate::grid::RenderError;

#[derive(Debug, Error)]
pub enum FlowError {
    /// The selected person vanished between listing and acting — most
    /// likely deleted concurrently.
    #[error("person {0} not found")]
    PersonNotFound(i64),

    #[error(transparent)]
    Catalog(#[from] DbError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl FlowError {
    /// User-visible notice for an aborted flow. Details stay in the log.
    pub fn user_notice(&self) -> &'static str {
        match self {
            FlowError::PersonNotFound(_) => "That person no longer exists.",
            FlowError::Catalog(_) => {
                "Something went wrong while accessing the catalog. Please try again."
            }
            FlowError::Render(_) => "Report generation failed. Please try again.",
        }
    }
}
