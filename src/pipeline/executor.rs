use super::config::{BuilderConfig, InitMode};
use super::core::{ensure_token, Guard, Options, Stateful, StatefulStep, StepDescriptor, StepKind, StepTarget};
use super::token::{AssignKey, Token};
use crate::error::StepchainResult;
use crate::logger::{LogLevel, LogSink};
use std::fmt;
use std::sync::Arc;

type Chain<T> = Arc<dyn Fn(T) -> StepchainResult<T> + Send + Sync>;
type Invoke<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Summary of one compiled step, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInfo {
    pub name: String,
    pub kind: StepKind,
}

/// A compiled, immutable chain of steps
///
/// Built once and invoked many times; clones share the same chain and may
/// be used from several threads at once.
///
/// # Example
/// ```
/// use serde_json::json;
/// use stepchain::{Context, Pipeline, Token};
///
/// let pipeline = Pipeline::builder("greet")
///     .add_function("hello", |c: Context| c.assign("hello", json!("world")).unwrap())
///     .build()
///     .unwrap();
///
/// let context = pipeline.call(Context::new(), &json!(null)).unwrap();
/// assert_eq!(context.get_str("hello"), Some("world"));
/// ```
pub struct Pipeline<T> {
    name: String,
    config: BuilderConfig,
    steps: Vec<StepInfo>,
    chain: Chain<T>,
}

impl<T: Token + 'static> Pipeline<T> {
    /// Create a new pipeline builder
    pub fn builder(name: impl Into<String>) -> PipelineBuilder<T> {
        PipelineBuilder::new(name)
    }

    /// Run the whole chain against `token`
    ///
    /// `options` are the pipeline's own invocation options; steps only see
    /// them through `copy_options_to_assign`.
    pub fn call(&self, token: T, options: &Options) -> StepchainResult<T> {
        if token.is_halted() {
            return Ok(token);
        }

        let token = match &self.config.copy_options_to_assign {
            Some(key) => token.assign(key.as_str(), options.clone())?,
            None => token,
        };

        (self.chain)(token)
    }
}

impl<T> Pipeline<T> {
    /// Get the pipeline name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of steps
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[StepInfo] {
        &self.steps
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config.clone(),
            steps: self.steps.clone(),
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// Fold step descriptors into one pipeline.
///
/// `descriptors` come in reverse execution order, last step first: each
/// one wraps the chain built so far, so the final node is the first step.
/// Stateful steps without `call` are rejected here, before the pipeline can
/// ever run.
pub fn compile<T, I>(name: &str, descriptors: I, config: BuilderConfig) -> StepchainResult<Pipeline<T>>
where
    T: Token + 'static,
    I: IntoIterator<Item = StepDescriptor<T>>,
{
    let mut chain: Chain<T> = Arc::new(|token: T| Ok(token));
    let mut steps = Vec::new();

    for descriptor in descriptors {
        steps.push(StepInfo {
            name: descriptor.target.name().to_string(),
            kind: descriptor.target.kind(),
        });
        chain = compose_one_step(name, descriptor, chain, &config)?;
    }
    steps.reverse();

    tracing::debug!(
        pipeline = name,
        steps = steps.len(),
        init_mode = %config.init_mode,
        "compiled pipeline"
    );

    Ok(Pipeline {
        name: name.to_string(),
        config,
        steps,
        chain,
    })
}

struct HaltLog {
    level: LogLevel,
    sink: Arc<dyn LogSink>,
    message: String,
}

fn compose_one_step<T>(
    pipeline: &str,
    descriptor: StepDescriptor<T>,
    rest: Chain<T>,
    config: &BuilderConfig,
) -> StepchainResult<Chain<T>>
where
    T: Token + 'static,
{
    let StepDescriptor {
        target,
        options,
        guard,
    } = descriptor;

    let step_name = target.name().to_string();
    let halt_log = config.log_on_halt.map(|level| HaltLog {
        level,
        sink: Arc::clone(&config.sink),
        message: format!(
            "pipeline '{}' halted in {} step '{}'",
            pipeline,
            target.kind(),
            step_name
        ),
    });

    let invoke: Invoke<T> = match target {
        StepTarget::Function { func, .. } => func,
        StepTarget::Stateful(stateful) => {
            let call = stateful.call_fn()?;
            match config.init_mode {
                InitMode::AheadOfTime => {
                    let initialized = stateful.init(options);
                    Arc::new(move |token: T| call(token, &initialized))
                }
                InitMode::PerInvocation => {
                    let init = stateful.init_fn();
                    Arc::new(move |token: T| {
                        let initialized = init(options.clone());
                        call(token, &initialized)
                    })
                }
            }
        }
    };

    Ok(Arc::new(move |token: T| {
        if !guard.evaluate(&token) {
            return rest(token);
        }

        let next = ensure_token(&step_name, invoke(token))?;
        if next.is_halted() {
            if let Some(log) = &halt_log {
                log.sink.log(log.level, &log.message, "pipeline");
            }
            return Ok(next);
        }

        rest(next)
    }))
}

/// Builder for constructing pipelines
///
/// Steps are added in execution order.
pub struct PipelineBuilder<T> {
    name: String,
    config: BuilderConfig,
    copy_options_key: Option<String>,
    descriptors: Vec<StepDescriptor<T>>,
}

impl<T: Token + 'static> PipelineBuilder<T> {
    /// Create a new pipeline builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: BuilderConfig::default(),
            copy_options_key: None,
            descriptors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the whole assembly configuration
    pub fn with_config(mut self, config: BuilderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn init_mode(mut self, mode: InitMode) -> Self {
        self.config.init_mode = mode;
        self
    }

    pub fn log_on_halt(mut self, level: LogLevel) -> Self {
        self.config.log_on_halt = Some(level);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.config.sink = sink;
        self
    }

    /// Store invocation options under `key`; the key is checked by [`build`](Self::build)
    pub fn copy_options_to_assign(mut self, key: impl Into<String>) -> Self {
        self.copy_options_key = Some(key.into());
        self
    }

    /// Add a stateful step
    pub fn add_step<S: StatefulStep<T> + 'static>(self, step: S, options: Options) -> Self {
        self.add_descriptor(StepDescriptor::new(StepTarget::stateful(step), options))
    }

    /// Add a stateful step that only runs when `guard` holds
    pub fn add_step_if<S, G>(self, step: S, options: Options, guard: G) -> Self
    where
        S: StatefulStep<T> + 'static,
        G: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.add_descriptor(
            StepDescriptor::new(StepTarget::stateful(step), options).guarded(Guard::new(guard)),
        )
    }

    /// Add a closure-built stateful step
    pub fn add_stateful(self, stateful: Stateful<T>, options: Options) -> Self {
        self.add_descriptor(StepDescriptor::new(StepTarget::Stateful(stateful), options))
    }

    /// Add a function step
    pub fn add_function<F>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.add_descriptor(StepDescriptor::new(
            StepTarget::function(name, func),
            Options::Null,
        ))
    }

    /// Add a function step that only runs when `guard` holds
    pub fn add_function_if<F, G>(self, name: impl Into<String>, func: F, guard: G) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
        G: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.add_descriptor(
            StepDescriptor::new(StepTarget::function(name, func), Options::Null)
                .guarded(Guard::new(guard)),
        )
    }

    pub fn add_descriptor(mut self, descriptor: StepDescriptor<T>) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Build the pipeline
    pub fn build(self) -> StepchainResult<Pipeline<T>> {
        let mut config = self.config;
        if let Some(key) = self.copy_options_key {
            config.copy_options_to_assign = Some(AssignKey::parse(&key)?);
        }

        compile(&self.name, self.descriptors.into_iter().rev(), config)
    }
}
