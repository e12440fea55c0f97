//! # Models
//!
//! Data carried through the pipeline. Targets live for one probe cycle;
//! results travel from the prober through the durable queue to the sink.

pub mod probe_result;
pub mod probe_target;

pub use probe_result::ProbeResult;
pub use probe_target::ProbeTarget;
