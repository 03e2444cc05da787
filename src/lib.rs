//! stepchain: composable token pipelines
//!
//! See [`pipeline`] for the model. Everything commonly needed is re-exported
//! at the crate root.

pub mod error;
pub mod logger;
pub mod pipeline;

pub use error::{StepchainError, StepchainResult};
pub use logger::{init_tracing, LogEntry, LogLevel, LogSink, MemorySink, TracingSink};
pub use pipeline::{
    compile, run, AssignKey, Assigns, BuilderConfig, Context, Guard, InitMode, Options, Pipeline,
    PipelineBuilder, PipelineRegistry, RecordToken, RunConfig, RunStep, Stateful, StatefulStep,
    StepDescriptor, StepInfo, StepKind, StepTarget, Token, TokenShape,
};
pub use serde_json::Value;
