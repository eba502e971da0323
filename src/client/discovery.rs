//! Tool discovery across several MCP servers
//!
//! Each discovered tool name is bound to the source that advertised it. A required
//! source must answer `tools/list`; optional sources that cannot be reached are
//! logged and skipped.

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use tracing::{info, warn};

use crate::client::{ClientError, ToolDescriptor, ToolSource};

#[derive(Default)]
pub struct ToolBindings {
    descriptors: Vec<ToolDescriptor>,
    routes: HashMap<String, Arc<dyn ToolSource>>,
}

impl ToolBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovers tools from a source whose failure is fatal. Returns the number of tools bound.
    pub async fn bind_required(
        &mut self,
        source: Arc<dyn ToolSource>,
    ) -> Result<usize, ClientError> {
        let tools = source.list_tools().await?;
        Ok(self.bind(source, tools))
    }

    /// Discovers tools from a source that may be unavailable. `opened` is the outcome of
    /// connecting to it.
    pub async fn bind_optional(
        &mut self,
        endpoint: &str,
        opened: Result<Arc<dyn ToolSource>, ClientError>,
    ) -> usize {
        let source = match opened {
            Ok(source) => source,
            Err(err) => {
                warn!(endpoint = %endpoint, error = %err, "skipping unreachable mcp server");
                return 0;
            }
        };

        match source.list_tools().await {
            Ok(tools) => self.bind(source, tools),
            Err(err) => {
                warn!(endpoint = %endpoint, error = %err, "skipping mcp server without tool listing");
                0
            }
        }
    }

    fn bind(&mut self, source: Arc<dyn ToolSource>, tools: Vec<ToolDescriptor>) -> usize {
        let mut bound = 0;
        for tool in tools {
            if let Some(existing) = self.routes.get(&tool.name) {
                warn!(
                    tool = %tool.name,
                    kept = %existing.endpoint(),
                    ignored = %source.endpoint(),
                    "duplicate tool name across mcp servers"
                );
                continue;
            }

            self.routes.insert(tool.name.clone(), Arc::clone(&source));
            self.descriptors.push(tool);
            bound += 1;
        }

        info!(endpoint = %source.endpoint(), tools = bound, "bound mcp tools");
        bound
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// Descriptors in the function-calling shape, in discovery order.
    pub fn function_specs(&self) -> Vec<Value> {
        self.descriptors
            .iter()
            .map(ToolDescriptor::to_function_spec)
            .collect()
    }

    pub fn source_for(&self, name: &str) -> Option<&Arc<dyn ToolSource>> {
        self.routes.get(name)
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Result<String, ClientError> {
        let source = self
            .source_for(name)
            .ok_or_else(|| ClientError::UnknownTool(name.to_string()))?;
        source.call_tool(name, arguments).await
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
