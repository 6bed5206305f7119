//! Go template execution over JSON data
//!
//! Missing map keys evaluate to nil and print as nothing, the way Helm
//! renders with `missingkey=zero`. In strict mode they are errors.

use std::collections::HashMap;

use base64::Engine as _;
use regex::Regex;
use serde_json::{Map, Value};

use super::ast::{Command, Literal, Node, Operand, Pipeline};
use super::functions::{self, MUTATING};
use super::parser;
use super::value::{print, to_str, truth, type_of};

/// Nested `include`/`template`/`tpl` calls allowed before giving up
pub const MAX_DEPTH: usize = 100;

pub type ExecResult<T> = Result<T, String>;

enum Flow {
    Normal,
    Break,
    Continue,
}

pub struct Executor<'a> {
    defines: &'a HashMap<String, Vec<Node>>,
    strict: bool,
    vars: Vec<(String, Value)>,
    depth: usize,
}

impl<'a> Executor<'a> {
    pub fn new(defines: &'a HashMap<String, Vec<Node>>, strict: bool) -> Self {
        Self {
            defines,
            strict,
            vars: Vec::new(),
            depth: 0,
        }
    }

    /// Execute `nodes` with `data` as both `.` and `$`
    pub fn execute(&mut self, nodes: &[Node], data: &Value) -> ExecResult<String> {
        self.vars = vec![("$".to_string(), data.clone())];
        let mut out = String::new();
        self.walk(data, nodes, &mut out)?;
        Ok(out)
    }

    fn walk(&mut self, dot: &Value, nodes: &[Node], out: &mut String) -> ExecResult<Flow> {
        for node in nodes {
            let flow = match node {
                Node::Text(text) => {
                    out.push_str(text);
                    Flow::Normal
                }
                Node::Output(pipeline) => {
                    let value = self.pipeline(dot, pipeline)?;
                    if pipeline.decl.is_none() {
                        out.push_str(&print(&value));
                    }
                    Flow::Normal
                }
                Node::If {
                    branches,
                    otherwise,
                } => self.conditional(dot, branches, otherwise, false, out)?,
                Node::With {
                    branches,
                    otherwise,
                } => self.conditional(dot, branches, otherwise, true, out)?,
                Node::Range {
                    vars,
                    pipeline,
                    body,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let value = self.pipeline(dot, pipeline)?;
                    self.vars.truncate(mark);

                    let entries = range_entries(value)?;
                    if entries.is_empty() {
                        self.scoped(dot, otherwise, out)?;
                    }
                    for (key, item) in entries {
                        let mark = self.vars.len();
                        if let Some(vars) = vars {
                            if let Some(index_var) = &vars.index_var {
                                self.vars.push((index_var.clone(), key));
                            }
                            self.vars.push((vars.value_var.clone(), item.clone()));
                        }
                        let flow = self.walk(&item, body, out);
                        self.vars.truncate(mark);
                        if matches!(flow?, Flow::Break) {
                            break;
                        }
                    }
                    Flow::Normal
                }
                Node::Template { name, pipeline } => {
                    let data = match pipeline {
                        Some(pipeline) => self.pipeline(dot, pipeline)?,
                        None => Value::Null,
                    };
                    out.push_str(&self.call_template(name, data)?);
                    Flow::Normal
                }
                Node::Break => Flow::Break,
                Node::Continue => Flow::Continue,
            };
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    /// Walk a block whose variables go out of scope at its end
    fn scoped(&mut self, dot: &Value, nodes: &[Node], out: &mut String) -> ExecResult<Flow> {
        let mark = self.vars.len();
        let flow = self.walk(dot, nodes, out);
        self.vars.truncate(mark);
        flow
    }

    fn conditional(
        &mut self,
        dot: &Value,
        branches: &[(Pipeline, Vec<Node>)],
        otherwise: &[Node],
        with: bool,
        out: &mut String,
    ) -> ExecResult<Flow> {
        for (pipeline, body) in branches {
            let mark = self.vars.len();
            let value = self.pipeline(dot, pipeline)?;
            if truth(&value) {
                let inner_dot = if with { &value } else { dot };
                let flow = self.walk(inner_dot, body, out);
                self.vars.truncate(mark);
                return flow;
            }
            self.vars.truncate(mark);
        }
        self.scoped(dot, otherwise, out)
    }

    fn pipeline(&mut self, dot: &Value, pipeline: &Pipeline) -> ExecResult<Value> {
        let mut value = None;
        for command in &pipeline.commands {
            value = Some(self.command(dot, command, value.take())?);
        }
        let value = value.unwrap_or(Value::Null);

        if let Some(decl) = &pipeline.decl {
            if decl.assign {
                let slot = self
                    .vars
                    .iter_mut()
                    .rev()
                    .find(|(name, _)| *name == decl.name)
                    .ok_or_else(|| format!("undefined variable: {}", decl.name))?;
                slot.1 = value.clone();
            } else {
                self.vars.push((decl.name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    fn command(
        &mut self,
        dot: &Value,
        command: &Command,
        piped: Option<Value>,
    ) -> ExecResult<Value> {
        let (first, rest) = command
            .args
            .split_first()
            .ok_or_else(|| "empty command".to_string())?;

        match first {
            Operand::Identifier(name) => self.call_function(dot, name, rest, piped),
            _ if rest.is_empty() && piped.is_none() => self.operand(dot, first),
            Operand::Field(fields) => {
                let args = self.arguments(dot, rest, piped)?;
                self.method(dot, fields, &args)
            }
            Operand::Variable { name, fields } => {
                let args = self.arguments(dot, rest, piped)?;
                self.method(self.variable(name)?, fields, &args)
            }
            other => Err(format!("can't give argument to non-function {:?}", other)),
        }
    }

    fn arguments(
        &mut self,
        dot: &Value,
        operands: &[Operand],
        piped: Option<Value>,
    ) -> ExecResult<Vec<Value>> {
        let mut args = Vec::with_capacity(operands.len() + 1);
        for operand in operands {
            args.push(self.operand(dot, operand)?);
        }
        args.extend(piped);
        Ok(args)
    }

    /// `.Files.Get "x"`: the last field names a method on what the others reach
    fn method(&self, base: &Value, fields: &[String], args: &[Value]) -> ExecResult<Value> {
        let Some((method, path)) = fields.split_last() else {
            return Err("can't give argument to non-function".to_string());
        };
        let receiver = self.resolve(base, path)?;
        call_method(&receiver, method, args)
    }

    fn operand(&mut self, dot: &Value, operand: &Operand) -> ExecResult<Value> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(fields) => self.resolve(dot, fields),
            Operand::Variable { name, fields } => self.resolve(self.variable(name)?, fields),
            Operand::Identifier(name) => self.call_function(dot, name, &[], None),
            Operand::Literal(literal) => Ok(match literal {
                Literal::String(s) => Value::String(s.clone()),
                Literal::Int(i) => Value::from(*i),
                Literal::Float(f) => super::value::from_f64(*f),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Nil => Value::Null,
            }),
            Operand::Pipeline { pipeline, fields } => {
                let mark = self.vars.len();
                let value = self.pipeline(dot, pipeline);
                self.vars.truncate(mark);
                self.resolve(&value?, fields)
            }
        }
    }

    fn variable(&self, name: &str) -> ExecResult<&Value> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| format!("undefined variable: {}", name))
    }

    /// Follow `.A.B.C` from `base`
    fn resolve(&self, base: &Value, fields: &[String]) -> ExecResult<Value> {
        let mut current = base;
        for (i, field) in fields.iter().enumerate() {
            match current {
                Value::Object(map) => match map.get(field) {
                    Some(next) => current = next,
                    None if field == "AsConfig" || field == "AsSecrets" => {
                        let computed = files_as(map, field == "AsSecrets")?;
                        return self.resolve(&computed, &fields[i + 1..]);
                    }
                    None if self.strict => {
                        return Err(format!("map has no entry for key \"{}\"", field));
                    }
                    None => return Ok(Value::Null),
                },
                Value::Null if self.strict => {
                    return Err(format!("nil pointer evaluating interface {{}}.{}", field));
                }
                Value::Null => return Ok(Value::Null),
                other => {
                    return Err(format!(
                        "can't evaluate field {} in type {}",
                        field,
                        type_of(other)
                    ));
                }
            }
        }
        Ok(current.clone())
    }

    fn call_function(
        &mut self,
        dot: &Value,
        name: &str,
        operands: &[Operand],
        piped: Option<Value>,
    ) -> ExecResult<Value> {
        match name {
            "and" | "or" => return self.short_circuit(dot, name == "and", operands, piped),
            _ => {}
        }

        let args = self.arguments(dot, operands, piped)?;
        match name {
            "include" => {
                let template = args.first().map(to_str).unwrap_or_default();
                let data = args.get(1).cloned().unwrap_or(Value::Null);
                return self.call_template(&template, data).map(Value::String);
            }
            "tpl" => {
                let source = args.first().map(to_str).unwrap_or_default();
                let data = args.get(1).cloned().unwrap_or(Value::Null);
                return self.tpl(&source, data).map(Value::String);
            }
            _ => {}
        }

        let function = functions::lookup_function(name)
            .ok_or_else(|| format!("function \"{}\" not defined", name))?;
        let result = function(&args).map_err(|e| format!("error calling {}: {}", name, e))?;

        if MUTATING.contains(&name) {
            if let Some(Operand::Variable { name: var, fields }) = operands.first() {
                self.write_back(var, fields, result.clone());
            }
        }
        Ok(result)
    }

    /// `and` stops at the first false operand, `or` at the first true one
    fn short_circuit(
        &mut self,
        dot: &Value,
        and: bool,
        operands: &[Operand],
        piped: Option<Value>,
    ) -> ExecResult<Value> {
        let mut last = Value::Null;
        for operand in operands {
            last = self.operand(dot, operand)?;
            if truth(&last) != and {
                return Ok(last);
            }
        }
        if let Some(value) = piped {
            last = value;
        }
        Ok(last)
    }

    fn write_back(&mut self, name: &str, fields: &[String], value: Value) {
        let Some((_, slot)) = self.vars.iter_mut().rev().find(|(n, _)| n == name) else {
            return;
        };
        let mut target = slot;
        for field in fields {
            target = match target.as_object_mut().and_then(|m| m.get_mut(field)) {
                Some(next) => next,
                None => return,
            };
        }
        *target = value;
    }

    fn enter(&mut self) -> ExecResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(format!("exceeded max template depth ({})", MAX_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run a named template with `data` as its dot and `$`
    fn call_template(&mut self, name: &str, data: Value) -> ExecResult<String> {
        let defines = self.defines;
        let body = defines
            .get(name)
            .ok_or_else(|| format!("no template \"{}\" associated with template", name))?;

        self.enter()?;
        let saved = std::mem::replace(&mut self.vars, vec![("$".to_string(), data.clone())]);
        let mut out = String::new();
        let result = self.walk(&data, body, &mut out);
        self.vars = saved;
        self.depth -= 1;

        result.map_err(|e| format!("template \"{}\": {}", name, e))?;
        Ok(out)
    }

    /// Helm's `tpl`: render a string as a template that sees every define
    fn tpl(&mut self, source: &str, data: Value) -> ExecResult<String> {
        let parsed = parser::parse(source).map_err(|e| format!("error calling tpl: {}", e))?;

        self.enter()?;
        let saved = std::mem::replace(&mut self.vars, vec![("$".to_string(), data.clone())]);
        let mut out = String::new();
        let result = if parsed.defines.is_empty() {
            self.walk(&data, &parsed.nodes, &mut out).map(|_| ())
        } else {
            let mut defines = self.defines.clone();
            defines.extend(parsed.defines);
            let mut nested = Executor {
                defines: &defines,
                strict: self.strict,
                vars: vec![("$".to_string(), data.clone())],
                depth: self.depth,
            };
            nested.walk(&data, &parsed.nodes, &mut out).map(|_| ())
        };
        self.vars = saved;
        self.depth -= 1;

        result.map_err(|e| format!("error calling tpl: {}", e))?;
        Ok(out)
    }
}

/// Index and item pairs a range iterates over
fn range_entries(value: Value) -> ExecResult<Vec<(Value, Value)>> {
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (Value::from(i), item))
            .collect(),
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
                .into_iter()
                .map(|(k, v)| (Value::String(k), v))
                .collect()
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            let count = n.as_i64().unwrap_or_default().max(0);
            (0..count).map(|i| (Value::from(i), Value::from(i))).collect()
        }
        Value::Null => Vec::new(),
        other => return Err(format!("range can't iterate over {}", print(&other))),
    })
}

/// Methods reachable from the render context: `.Files.*` and `.Capabilities.APIVersions.Has`
fn call_method(receiver: &Value, method: &str, args: &[Value]) -> ExecResult<Value> {
    let first = args.first().map(to_str).unwrap_or_default();
    match (receiver, method) {
        (Value::Object(files), "Get" | "GetBytes") => Ok(files
            .get(&first)
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()))),
        (Value::Object(files), "Lines") => {
            let content = files.get(&first).map(to_str).unwrap_or_default();
            Ok(Value::Array(
                content
                    .lines()
                    .map(|line| Value::String(line.to_string()))
                    .collect(),
            ))
        }
        (Value::Object(files), "Glob") => {
            let matcher = glob_regex(&first)?;
            Ok(Value::Object(
                files
                    .iter()
                    .filter(|(path, _)| matcher.is_match(path))
                    .map(|(path, content)| (path.clone(), content.clone()))
                    .collect(),
            ))
        }
        (Value::Object(files), "AsConfig" | "AsSecrets") => files_as(files, method == "AsSecrets"),
        (Value::Array(versions), "Has") => Ok(Value::Bool(
            versions.iter().any(|v| v.as_str() == Some(first.as_str())),
        )),
        (other, _) => Err(format!(
            "can't call method {} on type {}",
            method,
            type_of(other)
        )),
    }
}

/// `AsConfig` and `AsSecrets`: file contents keyed by base name, as YAML
fn files_as(files: &Map<String, Value>, secrets: bool) -> ExecResult<Value> {
    let mut entries = Map::new();
    for (path, content) in files {
        let key = path.rsplit('/').next().unwrap_or(path).to_string();
        let content = to_str(content);
        let value = if secrets {
            base64::engine::general_purpose::STANDARD.encode(content.as_bytes())
        } else {
            content
        };
        entries.insert(key, Value::String(value));
    }
    if entries.is_empty() {
        return Ok(Value::String(String::new()));
    }
    functions::yaml_string(&Value::Object(entries)).map(Value::String)
}

/// Translate a `.Files.Glob` pattern: `*` stays within a directory, `**` does not
fn glob_regex(pattern: &str) -> ExecResult<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    let mut in_group = false;
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                re.push_str(".*");
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '{' => {
                in_group = true;
                re.push('(');
            }
            '}' if in_group => {
                in_group = false;
                re.push(')');
            }
            ',' if in_group => re.push('|'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| format!("bad glob pattern {}: {}", pattern, e))
}
