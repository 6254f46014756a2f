//! Task values handed to an external worker pool.

use serde::{Deserialize, Serialize};

use crate::Tracer;

/// One unit of tracing work: which image (and, for stacks, which frame)
/// a tracer instance is responsible for.
///
/// Parallelism lives entirely outside this crate: a pool owns a queue
/// of these values, each task carries its own tracer, and instances
/// never share picks or indices, so no synchronization is needed. The
/// task is a plain serializable value rather than module-level state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceTask {
    /// Index of the image this task covers.
    pub image_index: usize,
    /// Frame within a stack, when the source has one.
    pub frame_index: Option<usize>,
    /// The tracer instance dedicated to this image.
    pub tracer: Tracer,
}
