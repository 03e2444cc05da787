//! Token pipelines: ordered steps threading one token, with halting
//!
//! A *token* carries a `halted` flag and an `assigns` map (see [`Token`]).
//! A *step* is either a plain function `token -> token` or a stateful
//! `init`/`call` pair (see [`StatefulStep`]). Steps run one after another
//! until one of them halts the token.
//!
//! Two ways to run steps:
//! - [`run`] executes a list of steps ad hoc, initializing each stateful
//!   step right before calling it.
//! - [`Pipeline`] (via [`PipelineBuilder`] or [`compile`]) folds the steps
//!   into one reusable chain, with guards, halt logging, and `init` run
//!   either once at assembly or on every invocation.
//!
//! [`PipelineRegistry`] groups several named pipelines under one unit.
//!
//! # Example
//! ```
//! use serde_json::json;
//! use stepchain::{Context, Pipeline, Token};
//!
//! let pipeline = Pipeline::builder("auth")
//!     .add_function("load_user", |c: Context| c.assign("user", json!("ada")).unwrap())
//!     .add_function_if(
//!         "deny",
//!         |c: Context| c.halt(),
//!         |c: &Context| c.get_str("user").is_none(),
//!     )
//!     .add_function("render", |c: Context| c.assign("rendered", json!(true)).unwrap())
//!     .build()
//!     .unwrap();
//!
//! let context = pipeline.call(Context::new(), &json!(null)).unwrap();
//! assert!(!context.is_halted());
//! assert_eq!(context.get_bool("rendered"), Some(true));
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod executor;
pub mod record;
pub mod registry;
pub mod runner;
pub mod token;

// Re-export main types
pub use config::{BuilderConfig, InitMode, RunConfig};
pub use context::Context;
pub use self::core::{Guard, Options, Stateful, StatefulStep, StepDescriptor, StepKind, StepTarget};
pub use executor::{compile, Pipeline, PipelineBuilder, StepInfo};
pub use record::{RecordToken, TokenShape};
pub use registry::PipelineRegistry;
pub use runner::{run, RunStep};
pub use token::{AssignKey, Assigns, Token};
