//! The pipeline: provider seams, the region driver, the open-file pool
//! and the output sinks.

pub mod driver;
pub mod mem;
pub mod providers;
pub mod read_pool;
pub mod sink;

pub use driver::{resolve_regions, run_pipeline, CallerConfig, PipelineSummary};
pub use providers::{
    AlignmentProvider, CallKind, CallRecord, CallSink, CandidateSource, ReferenceProvider,
    SampleCall,
};
pub use read_pool::OpenFilePool;
pub use sink::TextCallSink;
