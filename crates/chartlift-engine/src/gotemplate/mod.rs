//! Go template support for Helm charts
//!
//! Helm charts are written in Go's `text/template` dialect with sprig
//! functions. Templates are parsed with pest into [`ast`] nodes and
//! executed directly against JSON values.

pub mod ast;
pub mod exec;
pub mod functions;
pub mod parser;
pub mod value;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{EngineError, Result};
use ast::Node;
use exec::Executor;

/// Templates of a chart tree sharing one set of `define` blocks
#[derive(Debug, Default)]
pub struct TemplateSet {
    templates: HashMap<String, Vec<Node>>,
    defines: HashMap<String, Vec<Node>>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a template; a later `define` replaces an earlier one
    pub fn add(&mut self, name: &str, source: &str) -> Result<()> {
        let template = parser::parse(source).map_err(|e| EngineError::Parse {
            template: name.to_string(),
            message: e.to_string(),
        })?;
        self.defines.extend(template.defines);
        self.templates.insert(name.to_string(), template.nodes);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Execute a registered template against `data`
    pub fn render(&self, name: &str, data: &Value, strict: bool) -> Result<String> {
        let nodes = self
            .templates
            .get(name)
            .ok_or_else(|| EngineError::Template {
                template: name.to_string(),
                message: "template not found".to_string(),
            })?;
        Executor::new(&self.defines, strict)
            .execute(nodes, data)
            .map_err(|message| EngineError::Template {
                template: name.to_string(),
                message,
            })
    }
}
