//! Plugin interface and registry.
//!
//! A step that names a `plugin` instead of a `command` is dispatched to the
//! implementation registered under that name. Registration is last-wins.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::pipeline::{Params, StepDefinition};

/// Trait for custom step implementations
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Human-readable plugin name
    fn name(&self) -> &str {
        "plugin"
    }

    /// Run the step. `Ok(true)` is success, `Ok(false)` or `Err` is failure.
    async fn execute(&self, step: &StepDefinition, params: &Params) -> Result<bool>;
}

/// Adapts an async closure into a [`Plugin`]
pub struct FnPlugin<F> {
    name: String,
    func: F,
}

impl<F, Fut> FnPlugin<F>
where
    F: Fn(StepDefinition, Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Plugin for FnPlugin<F>
where
    F: Fn(StepDefinition, Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, step: &StepDefinition, params: &Params) -> Result<bool> {
        (self.func)(step.clone(), params.clone()).await
    }
}

/// Name → plugin map
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin` under `name`, returning any plugin it replaced
    pub fn register(
        &mut self,
        name: impl Into<String>,
        plugin: Arc<dyn Plugin>,
    ) -> Option<Arc<dyn Plugin>> {
        self.plugins.insert(name.into(), plugin)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
