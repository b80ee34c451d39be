pub mod consistency;
pub mod coverage;
pub mod outputs;
pub mod report;
pub mod schema;

pub use consistency::{ConsistencyReport, ConsistencyValidator};
pub use coverage::{CoverageReport, CoverageValidator};
pub use outputs::{OutputsReconciler, OutputsValidation};
pub use report::{outputs_report, OutputsReport};
pub use schema::{SchemaReport, SchemaValidator};
