use super::token::Token;
use crate::error::{StepchainError, StepchainResult};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied step configuration, opaque to the core
pub type Options = Value;

pub(crate) type InitFn = Arc<dyn Fn(Options) -> Options + Send + Sync>;
pub(crate) type CallFn<T> = Arc<dyn Fn(T, &Options) -> T + Send + Sync>;
pub(crate) type FunctionFn<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// A reusable, configurable processing unit
///
/// `init` turns the options a step was declared with into the options `call`
/// receives. It may run once when a pipeline is assembled, so it must not
/// capture per-run resources.
///
/// # Example
/// ```
/// use serde_json::json;
/// use stepchain::{Context, Options, StatefulStep, Token};
///
/// struct Tag;
///
/// impl StatefulStep<Context> for Tag {
///     fn name(&self) -> &str {
///         "Tag"
///     }
///
///     fn init(&self, options: Options) -> Options {
///         options.get("label").cloned().unwrap_or(json!("untagged"))
///     }
///
///     fn call(&self, context: Context, label: &Options) -> Context {
///         context.assign("tag", label.clone()).unwrap()
///     }
/// }
///
/// let context = Tag.call(Context::new(), &Tag.init(json!({"label": "blue"})));
/// assert_eq!(context.get_str("tag"), Some("blue"));
/// ```
pub trait StatefulStep<T>: Send + Sync {
    /// Identity used in log records and error messages
    fn name(&self) -> &str;

    /// Prepare options; the default passes them through unchanged
    fn init(&self, options: Options) -> Options {
        options
    }

    /// Process a token with prepared options
    fn call(&self, token: T, options: &Options) -> T;
}

/// Whether a step target is a plain function or a stateful step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Function,
    Stateful,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Function => "function",
            StepKind::Stateful => "stateful",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-erased stateful step: an `init`/`call` pair under a name
///
/// Built either from a [`StatefulStep`] implementation, which always has
/// both halves, or piecewise from closures, in which case `call` may be
/// missing and the step is rejected when a pipeline is assembled.
pub struct Stateful<T> {
    name: String,
    init: InitFn,
    call: Option<CallFn<T>>,
}

impl<T: 'static> Stateful<T> {
    /// Start a closure-built step with a pass-through `init` and no `call`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            init: Arc::new(|options: Options| options),
            call: None,
        }
    }

    /// Wrap a [`StatefulStep`] implementation
    pub fn from_step<S: StatefulStep<T> + 'static>(step: S) -> Self {
        let step = Arc::new(step);
        let init_step = Arc::clone(&step);
        let call_step = Arc::clone(&step);
        Self {
            name: step.name().to_string(),
            init: Arc::new(move |options: Options| init_step.init(options)),
            call: Some(Arc::new(move |token: T, options: &Options| {
                call_step.call(token, options)
            })),
        }
    }

    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: Fn(Options) -> Options + Send + Sync + 'static,
    {
        self.init = Arc::new(init);
        self
    }

    pub fn with_call<F>(mut self, call: F) -> Self
    where
        F: Fn(T, &Options) -> T + Send + Sync + 'static,
    {
        self.call = Some(Arc::new(call));
        self
    }
}

impl<T> Stateful<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_callable(&self) -> bool {
        self.call.is_some()
    }

    pub fn init(&self, options: Options) -> Options {
        (self.init)(options)
    }

    pub(crate) fn init_fn(&self) -> InitFn {
        Arc::clone(&self.init)
    }

    /// The `call` half, or [`StepchainError::MalformedStep`] when absent
    pub(crate) fn call_fn(&self) -> StepchainResult<CallFn<T>> {
        self.call.clone().ok_or_else(|| StepchainError::MalformedStep {
            step: self.name.clone(),
            reason: "but it only provides init".to_string(),
        })
    }
}

impl<T> Clone for Stateful<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            init: Arc::clone(&self.init),
            call: self.call.clone(),
        }
    }
}

impl<T> fmt::Debug for Stateful<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stateful")
            .field("name", &self.name)
            .field("callable", &self.is_callable())
            .finish()
    }
}

/// What a step descriptor invokes, decided when the descriptor is built
pub enum StepTarget<T> {
    /// Unary `token -> token` callable with no options
    Function { name: String, func: FunctionFn<T> },
    /// `init`/`call` pair
    Stateful(Stateful<T>),
}

impl<T: 'static> StepTarget<T> {
    pub fn function<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        StepTarget::Function {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn stateful<S: StatefulStep<T> + 'static>(step: S) -> Self {
        StepTarget::Stateful(Stateful::from_step(step))
    }
}

impl<T> StepTarget<T> {
    pub fn name(&self) -> &str {
        match self {
            StepTarget::Function { name, .. } => name,
            StepTarget::Stateful(stateful) => stateful.name(),
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            StepTarget::Function { .. } => StepKind::Function,
            StepTarget::Stateful(_) => StepKind::Stateful,
        }
    }
}

impl<T: Token> StepTarget<T> {
    /// Resolve options and invoke in one go, as the runtime runner does
    pub(crate) fn invoke(&self, token: T, options: Options) -> StepchainResult<T> {
        let next = match self {
            StepTarget::Function { func, .. } => func(token),
            StepTarget::Stateful(stateful) => {
                let call = stateful.call_fn()?;
                let initialized = stateful.init(options);
                call(token, &initialized)
            }
        };
        ensure_token(self.name(), next)
    }
}

impl<T> Clone for StepTarget<T> {
    fn clone(&self) -> Self {
        match self {
            StepTarget::Function { name, func } => StepTarget::Function {
                name: name.clone(),
                func: Arc::clone(func),
            },
            StepTarget::Stateful(stateful) => StepTarget::Stateful(stateful.clone()),
        }
    }
}

impl<T> fmt::Debug for StepTarget<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepTarget::Function { name, .. } => f.debug_tuple("Function").field(name).finish(),
            StepTarget::Stateful(stateful) => f.debug_tuple("Stateful").field(stateful).finish(),
        }
    }
}

impl<T: 'static> From<Stateful<T>> for StepTarget<T> {
    fn from(stateful: Stateful<T>) -> Self {
        StepTarget::Stateful(stateful)
    }
}

/// Per-invocation condition deciding whether a step runs
pub struct Guard<T>(Arc<dyn Fn(&T) -> bool + Send + Sync>);

impl<T: 'static> Guard<T> {
    pub fn new<F>(condition: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(condition))
    }

    pub fn always() -> Self {
        Self(Arc::new(|_: &T| true))
    }
}

impl<T> Guard<T> {
    pub fn evaluate(&self, token: &T) -> bool {
        (self.0)(token)
    }
}

impl<T: 'static> Default for Guard<T> {
    fn default() -> Self {
        Self::always()
    }
}

impl<T> Clone for Guard<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Guard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard(..)")
    }
}

/// One entry of a pipeline: `(target, options, guard)`
pub struct StepDescriptor<T> {
    pub target: StepTarget<T>,
    pub options: Options,
    pub guard: Guard<T>,
}

impl<T: 'static> StepDescriptor<T> {
    pub fn new(target: StepTarget<T>, options: Options) -> Self {
        Self {
            target,
            options,
            guard: Guard::always(),
        }
    }

    pub fn guarded(mut self, guard: Guard<T>) -> Self {
        self.guard = guard;
        self
    }
}

impl<T> Clone for StepDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            options: self.options.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl<T> fmt::Debug for StepDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("target", &self.target)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Fail with [`StepchainError::ContractViolation`] unless `next` is a proper token
pub(crate) fn ensure_token<T: Token>(step: &str, next: T) -> StepchainResult<T> {
    match next.check_contract() {
        Ok(()) => Ok(next),
        Err(detail) => Err(StepchainError::contract_violation(step, detail)),
    }
}
