use super::config::BuilderConfig;
use super::core::Options;
use super::executor::{Pipeline, PipelineBuilder};
use super::token::Token;
use crate::error::{StepchainError, StepchainResult};
use std::collections::{BTreeMap, HashMap};

/// A unit declaring several independently named pipelines
///
/// Names brought into scope with [`import`](Self::import) cannot be reused
/// for pipelines, and each pipeline is assembled from its own builder.
///
/// # Example
/// ```
/// use serde_json::json;
/// use stepchain::{BuilderConfig, Context, PipelineRegistry, Token};
///
/// let mut router = PipelineRegistry::<Context>::new("Router");
/// router
///     .declare("api", BuilderConfig::default(), |p| {
///         p.add_function("json", |c: Context| c.assign("format", json!("json")).unwrap())
///     })
///     .unwrap();
///
/// let context = router.call("api", Context::new(), &json!(null)).unwrap();
/// assert_eq!(context.get_str("format"), Some("json"));
/// ```
pub struct PipelineRegistry<T> {
    unit: String,
    imports: HashMap<String, String>,
    pipelines: BTreeMap<String, Pipeline<T>>,
}

impl<T: Token + 'static> PipelineRegistry<T> {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            imports: HashMap::new(),
            pipelines: BTreeMap::new(),
        }
    }

    /// The unit's own name, used as the origin of its declarations
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Bring `name` into scope from `origin`
    pub fn import(mut self, name: impl Into<String>, origin: impl Into<String>) -> Self {
        self.imports.insert(name.into(), origin.into());
        self
    }

    /// Declare a pipeline under `name`, adding its steps through `body`
    ///
    /// Fails with [`StepchainError::NameCollision`] when `name` was imported
    /// or already declared in this unit, and with any assembly error of the
    /// pipeline itself.
    pub fn declare<F>(&mut self, name: &str, config: BuilderConfig, body: F) -> StepchainResult<&Pipeline<T>>
    where
        F: FnOnce(PipelineBuilder<T>) -> PipelineBuilder<T>,
    {
        if let Some(origin) = self.imports.get(name) {
            return Err(StepchainError::NameCollision {
                name: name.to_string(),
                origin: origin.clone(),
            });
        }
        if self.pipelines.contains_key(name) {
            return Err(StepchainError::NameCollision {
                name: name.to_string(),
                origin: self.unit.clone(),
            });
        }

        let builder = PipelineBuilder::new(format!("{}.{}", self.unit, name)).with_config(config);
        let pipeline = body(builder).build()?;

        tracing::debug!(unit = %self.unit, pipeline = name, "declared pipeline");

        Ok(self.pipelines.entry(name.to_string()).or_insert(pipeline))
    }

    /// Invoke the pipeline declared as `name`
    pub fn call(&self, name: &str, token: T, options: &Options) -> StepchainResult<T> {
        self.get(name)
            .ok_or_else(|| StepchainError::UnknownPipeline(format!("{}.{}", self.unit, name)))?
            .call(token, options)
    }
}

impl<T> PipelineRegistry<T> {
    pub fn get(&self, name: &str) -> Option<&Pipeline<T>> {
        self.pipelines.get(name)
    }

    /// Declared pipeline names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.pipelines.keys().map(|name| name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{LogLevel, MemorySink};
    use crate::pipeline::Context;
    use serde_json::json;
    use std::sync::Arc;

    fn tag(key: &'static str) -> impl Fn(Context) -> Context + Send + Sync + 'static {
        move |c: Context| c.assign(key, json!(true)).unwrap()
    }

    #[test]
    fn test_pipelines_are_independent() {
        let mut unit = PipelineRegistry::<Context>::new("Unit");
        unit.declare("browser", BuilderConfig::default(), |p| {
            p.add_function("html", tag("html")).add_function("session", tag("session"))
        })
        .unwrap();
        unit.declare("api", BuilderConfig::default(), |p| p.add_function("json", tag("json")))
            .unwrap();

        let browser = unit.call("browser", Context::new(), &json!(null)).unwrap();
        assert!(browser.has("html") && browser.has("session"));
        assert!(!browser.has("json"));

        let api = unit.call("api", Context::new(), &json!(null)).unwrap();
        assert!(api.has("json"));
        assert!(!api.has("html"));

        assert_eq!(unit.names(), vec!["api", "browser"]);
        assert_eq!(unit.get("browser").unwrap().step_count(), 2);
    }

    #[test]
    fn test_import_collision() {
        let mut unit = PipelineRegistry::<Context>::new("Unit").import("fetch", "Http.Client");
        let result = unit.declare("fetch", BuilderConfig::default(), |p| p);

        match result {
            Err(StepchainError::NameCollision { name, origin }) => {
                assert_eq!(name, "fetch");
                assert_eq!(origin, "Http.Client");
            }
            other => panic!("expected name collision, got {:?}", other),
        }
        assert!(unit.names().is_empty());
    }

    #[test]
    fn test_redeclaration_collides_with_unit() {
        let mut unit = PipelineRegistry::<Context>::new("Unit");
        unit.declare("api", BuilderConfig::default(), |p| p).unwrap();

        let result = unit.declare("api", BuilderConfig::default(), |p| p);
        assert!(matches!(result, Err(StepchainError::NameCollision { origin, .. }) if origin == "Unit"));
    }

    #[test]
    fn test_unknown_pipeline() {
        let unit = PipelineRegistry::<Context>::new("Unit");
        let result = unit.call("missing", Context::new(), &json!(null));
        assert!(matches!(result, Err(StepchainError::UnknownPipeline(name)) if name == "Unit.missing"));
    }

    #[test]
    fn test_halt_log_names_qualified_pipeline() {
        let sink = Arc::new(MemorySink::new());
        let mut unit = PipelineRegistry::<Context>::new("Router");
        unit.declare(
            "auth",
            BuilderConfig::new().log_on_halt(LogLevel::Warn).sink(sink.clone()),
            |p| p.add_function("deny", |c: Context| c.halt()),
        )
        .unwrap();

        let context = unit.call("auth", Context::new(), &json!(null)).unwrap();
        assert!(context.is_halted());
        assert_eq!(
            sink.entries()[0].message,
            "pipeline 'Router.auth' halted in function step 'deny'"
        );
    }
}
