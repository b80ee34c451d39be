use serde::Serialize;

/// Uniform result of every validation and reconciliation pass
///
/// `details` carries the structured per-check findings, `fixed` the repairs
/// applied when the pass ran in fix mode.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport<D, F = ()> {
    /// True when no problem was found
    pub valid: bool,
    /// Human-readable problems, in detection order
    pub problems: Vec<String>,
    /// Structured findings
    pub details: D,
    /// Applied repairs, present only in fix mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed: Option<F>,
}

impl<D, F> ValidationReport<D, F> {
    /// Build a report; validity follows from the problem list
    pub fn new(problems: Vec<String>, details: D, fixed: Option<F>) -> Self {
        Self {
            valid: problems.is_empty(),
            problems,
            details,
            fixed,
        }
    }

    /// Check if any problem was reported
    pub fn has_problems(&self) -> bool {
        !self.problems.is_empty()
    }
}
