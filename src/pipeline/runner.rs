use super::config::RunConfig;
use super::core::{Options, StepTarget};
use super::token::Token;
use crate::error::StepchainResult;
use serde_json::Value;

/// A step handed to [`run`]: a target plus the options it is initialized with
///
/// Bare function steps carry `Value::Null` options, which they never see.
pub struct RunStep<T> {
    pub target: StepTarget<T>,
    pub options: Options,
}

impl<T> From<StepTarget<T>> for RunStep<T> {
    fn from(target: StepTarget<T>) -> Self {
        Self {
            target,
            options: Value::Null,
        }
    }
}

impl<T> From<(StepTarget<T>, Options)> for RunStep<T> {
    fn from((target, options): (StepTarget<T>, Options)) -> Self {
        Self { target, options }
    }
}

/// Run `steps` against `token` without assembling a pipeline first.
///
/// Each stateful step is initialized right before it is called. The run
/// stops at the first step that returns a halted token; a token that is
/// already halted is returned without invoking anything.
///
/// # Example
/// ```
/// use serde_json::json;
/// use stepchain::{run, Context, RunConfig, RunStep, StepTarget, Token};
///
/// let steps: Vec<RunStep<Context>> = vec![StepTarget::function("mark", |c: Context| {
///     c.assign("marked", json!(true)).unwrap()
/// })
/// .into()];
///
/// let context = run(Context::new(), steps, &RunConfig::default()).unwrap();
/// assert_eq!(context.get_bool("marked"), Some(true));
/// ```
pub fn run<T, I>(token: T, steps: I, config: &RunConfig) -> StepchainResult<T>
where
    T: Token,
    I: IntoIterator<Item = RunStep<T>>,
{
    if token.is_halted() {
        return Ok(token);
    }

    let mut token = token;
    for step in steps {
        let next = step.target.invoke(token, step.options)?;

        if next.is_halted() {
            if let Some(level) = config.log_on_halt {
                config.sink.log(
                    level,
                    &format!(
                        "{} halted in {} step '{}'",
                        config.context,
                        step.target.kind(),
                        step.target.name()
                    ),
                    "runner",
                );
            }
            return Ok(next);
        }

        token = next;
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepchainError;
    use crate::logger::{LogLevel, MemorySink};
    use crate::pipeline::core::{Stateful, StatefulStep};
    use crate::pipeline::Context;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Assign;

    impl StatefulStep<Context> for Assign {
        fn name(&self) -> &str {
            "Assign"
        }

        fn call(&self, context: Context, options: &Options) -> Context {
            let key = options["key"].as_str().unwrap();
            context.assign(key, options["value"].clone()).unwrap()
        }
    }

    fn halter() -> StepTarget<Context> {
        StepTarget::function("halter", |c: Context| c.halt())
    }

    fn counting(counter: Arc<AtomicUsize>) -> StepTarget<Context> {
        StepTarget::function("counting", move |c: Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            c
        })
    }

    #[test]
    fn test_runs_steps_in_order() {
        let steps: Vec<RunStep<Context>> = vec![
            (StepTarget::stateful(Assign), json!({"key": "trace", "value": "first"})).into(),
            StepTarget::function("second", |c: Context| {
                let previous = c.get_str("trace").unwrap().to_string();
                c.assign("trace", json!(format!("{}>second", previous))).unwrap()
            })
            .into(),
        ];

        let context = run(Context::new(), steps, &RunConfig::default()).unwrap();
        assert_eq!(context.get_str("trace"), Some("first>second"));
        assert!(!context.is_halted());
    }

    #[test]
    fn test_halted_input_invokes_nothing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let steps: Vec<RunStep<Context>> = vec![counting(counter.clone()).into()];

        let context = run(Context::with_id("h").halt(), steps, &RunConfig::default()).unwrap();
        assert!(context.is_halted());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_halt_stops_remaining_steps() {
        let counter = Arc::new(AtomicUsize::new(0));
        let steps: Vec<RunStep<Context>> = vec![
            counting(counter.clone()).into(),
            halter().into(),
            counting(counter.clone()).into(),
        ];

        let context = run(Context::new(), steps, &RunConfig::default()).unwrap();
        assert!(context.is_halted());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_halt_is_logged_when_requested() {
        let sink = Arc::new(MemorySink::new());
        let config = RunConfig::new()
            .log_on_halt(LogLevel::Warn)
            .context("AuthPipeline")
            .sink(sink.clone());

        run(Context::new(), vec![halter().into()], &config).unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert_eq!(entries[0].message, "AuthPipeline halted in function step 'halter'");
    }

    #[test]
    fn test_halt_is_silent_by_default() {
        let sink = Arc::new(MemorySink::new());
        let config = RunConfig::new().sink(sink.clone());

        run(Context::new(), vec![halter().into()], &config).unwrap();
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_init_runs_on_every_run() {
        let inits = Arc::new(AtomicUsize::new(0));
        let seen = inits.clone();
        let step = Stateful::<Context>::new("Tracked")
            .with_init(move |options| {
                seen.fetch_add(1, Ordering::SeqCst);
                options
            })
            .with_call(|context, _| context);

        for _ in 0..3 {
            let steps: Vec<RunStep<Context>> = vec![(StepTarget::from(step.clone()), json!(null)).into()];
            run(Context::new(), steps, &RunConfig::default()).unwrap();
        }
        assert_eq!(inits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_malformed_step_fails_when_reached() {
        let steps: Vec<RunStep<Context>> = vec![StepTarget::from(Stateful::new("NoCall")).into()];
        let result = run(Context::new(), steps, &RunConfig::default());
        assert!(matches!(result, Err(StepchainError::MalformedStep { step, .. }) if step == "NoCall"));
    }
}
