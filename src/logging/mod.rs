mod format;

pub use format::{StructuredLogger, VerdictLine};
