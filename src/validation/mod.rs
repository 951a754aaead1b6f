//! Pre-run validation
//!
//! The validation pass dry-runs the whole load + resolve pipeline and
//! returns every structural problem it finds as one ordered list. The
//! processor refuses to touch the database while that list is non-empty.

mod issue;
mod pass;

pub use issue::{IssueKind, ValidationIssue};
pub use pass::ValidationPass;
