//! Go template parser
//!
//! Parses Go/Helm template syntax into a [`Template`] using pest.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use thiserror::Error;

use super::ast::*;

#[derive(Parser)]
#[grammar = "gotemplate/go_template.pest"]
struct GoTemplateParser;

/// Parser error
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Parse error: {0}")]
    Pest(Box<pest::error::Error<Rule>>),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Invalid string: {0}")]
    InvalidString(String),

    #[error("Unexpected {found} in {context}")]
    Unexpected { found: String, context: String },

    #[error("Unexpected rule: {0:?}")]
    UnexpectedRule(Rule),
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        ParseError::Pest(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Parse a Go template string
pub fn parse(input: &str) -> Result<Template> {
    let mut items = parse_items(input)?;
    trim_whitespace(&mut items);

    let mut folder = Folder {
        items: items.into_iter(),
        defines: Vec::new(),
    };
    let (nodes, stop) = folder.list()?;
    if !matches!(stop, Stop::Eof) {
        return Err(stop.unexpected("template"));
    }

    Ok(Template {
        nodes,
        defines: folder.defines,
    })
}

/// Parse into source-order text and actions, without nesting
pub fn parse_items(input: &str) -> Result<Vec<Item>> {
    let pairs = GoTemplateParser::parse(Rule::template, input)?;

    let mut items = Vec::new();
    for pair in pairs.flatten() {
        match pair.as_rule() {
            Rule::raw_text => items.push(Item::Text(pair.as_str().to_string())),
            Rule::action => items.push(parse_action(pair)?),
            _ => {}
        }
    }
    Ok(items)
}

fn parse_action(pair: Pair<Rule>) -> Result<Item> {
    let mut trim_left = false;
    let mut trim_right = false;
    let mut body = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::action_start => trim_left = inner.as_str().ends_with('-'),
            Rule::action_end => trim_right = inner.as_str().starts_with('-'),
            _ => body = Some(parse_action_body(inner)?),
        }
    }

    Ok(Item::Action {
        trim_left,
        trim_right,
        // `{{ }}` prints nothing
        body: body.unwrap_or(ActionBody::Comment),
    })
}

fn parse_action_body(pair: Pair<Rule>) -> Result<ActionBody> {
    let rule = pair.as_rule();
    match rule {
        Rule::comment => Ok(ActionBody::Comment),
        Rule::if_action => Ok(ActionBody::If(inner_pipeline(pair)?)),
        Rule::else_if_action => Ok(ActionBody::ElseIf(inner_pipeline(pair)?)),
        Rule::else_with_action => Ok(ActionBody::ElseWith(inner_pipeline(pair)?)),
        Rule::else_action => Ok(ActionBody::Else),
        Rule::end_action => Ok(ActionBody::End),
        Rule::with_action => Ok(ActionBody::With(inner_pipeline(pair)?)),
        Rule::break_action => Ok(ActionBody::Break),
        Rule::continue_action => Ok(ActionBody::Continue),
        Rule::range_action => {
            let mut vars = None;
            let mut pipeline = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::range_vars => vars = Some(parse_range_vars(inner)),
                    Rule::pipeline => pipeline = Some(parse_pipeline(inner)?),
                    _ => {}
                }
            }
            let pipeline = pipeline.ok_or(ParseError::UnexpectedRule(rule))?;
            Ok(ActionBody::Range { vars, pipeline })
        }
        Rule::define_action => {
            let (name, _) = name_and_pipeline(pair)?;
            Ok(ActionBody::Define(name))
        }
        Rule::template_action => {
            let (name, pipeline) = name_and_pipeline(pair)?;
            Ok(ActionBody::Template { name, pipeline })
        }
        Rule::block_action => {
            let (name, pipeline) = name_and_pipeline(pair)?;
            let pipeline = pipeline.ok_or(ParseError::UnexpectedRule(rule))?;
            Ok(ActionBody::Block { name, pipeline })
        }
        Rule::pipeline => Ok(ActionBody::Pipeline(parse_pipeline(pair)?)),
        other => Err(ParseError::UnexpectedRule(other)),
    }
}

fn inner_pipeline(pair: Pair<Rule>) -> Result<Pipeline> {
    let rule = pair.as_rule();
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::pipeline)
        .map(parse_pipeline)
        .unwrap_or(Err(ParseError::UnexpectedRule(rule)))
}

fn name_and_pipeline(pair: Pair<Rule>) -> Result<(String, Option<Pipeline>)> {
    let rule = pair.as_rule();
    let mut name = None;
    let mut pipeline = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::string_literal => name = Some(unquote(inner.as_str())?),
            Rule::pipeline => pipeline = Some(parse_pipeline(inner)?),
            _ => {}
        }
    }
    let name = name.ok_or(ParseError::UnexpectedRule(rule))?;
    Ok((name, pipeline))
}

fn parse_range_vars(pair: Pair<Rule>) -> RangeVars {
    let names: Vec<String> = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::variable_name)
        .map(|p| p.as_str().to_string())
        .collect();

    match names.as_slice() {
        [index, value] => RangeVars {
            index_var: Some(index.clone()),
            value_var: value.clone(),
        },
        _ => RangeVars {
            index_var: None,
            value_var: names.into_iter().next().unwrap_or_else(|| "$".to_string()),
        },
    }
}

fn parse_pipeline(pair: Pair<Rule>) -> Result<Pipeline> {
    let mut decl = None;
    let mut commands = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::declaration => {
                let mut name = String::new();
                let mut assign = false;
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::variable_name => name = part.as_str().to_string(),
                        Rule::assign_op => assign = part.as_str() == "=",
                        _ => {}
                    }
                }
                decl = Some(Declaration { name, assign });
            }
            Rule::command => commands.push(parse_command(inner)?),
            other => return Err(ParseError::UnexpectedRule(other)),
        }
    }

    Ok(Pipeline { decl, commands })
}

fn parse_command(pair: Pair<Rule>) -> Result<Command> {
    let args = pair
        .into_inner()
        .map(parse_operand)
        .collect::<Result<Vec<_>>>()?;
    Ok(Command { args })
}

fn parse_operand(pair: Pair<Rule>) -> Result<Operand> {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::dot => Ok(Operand::Dot),
        Rule::field_chain => Ok(Operand::Field(split_fields(text))),
        Rule::variable => {
            let (name, rest) = match text.find('.') {
                Some(idx) => text.split_at(idx),
                None => (text, ""),
            };
            Ok(Operand::Variable {
                name: name.to_string(),
                fields: split_fields(rest),
            })
        }
        Rule::identifier => Ok(Operand::Identifier(text.to_string())),
        Rule::string_literal => Ok(Operand::Literal(Literal::String(unquote(text)?))),
        Rule::raw_string => Ok(Operand::Literal(Literal::String(
            text.trim_matches('`').to_string(),
        ))),
        Rule::char_literal => {
            let inner = unquote(&format!("\"{}\"", &text[1..text.len() - 1]))?;
            let ch = inner
                .chars()
                .next()
                .ok_or_else(|| ParseError::InvalidString(text.to_string()))?;
            Ok(Operand::Literal(Literal::Int(ch as i64)))
        }
        Rule::number => parse_number(text).map(Operand::Literal),
        Rule::boolean => Ok(Operand::Literal(Literal::Bool(text == "true"))),
        Rule::nil => Ok(Operand::Literal(Literal::Nil)),
        Rule::parenthesized => {
            let mut pipeline = None;
            let mut fields = Vec::new();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::inner_pipeline => {
                        if let Some(p) = inner.into_inner().next() {
                            pipeline = Some(parse_pipeline(p)?);
                        }
                    }
                    Rule::field_tail => fields = split_fields(inner.as_str()),
                    _ => {}
                }
            }
            let pipeline = pipeline.ok_or(ParseError::UnexpectedRule(Rule::parenthesized))?;
            Ok(Operand::Pipeline {
                pipeline: Box::new(pipeline),
                fields,
            })
        }
        other => Err(ParseError::UnexpectedRule(other)),
    }
}

fn split_fields(chain: &str) -> Vec<String> {
    chain
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number(text: &str) -> Result<Literal> {
    let invalid = || ParseError::InvalidNumber(text.to_string());
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    if let Some(hex) = digits.strip_prefix("0x") {
        let value = i64::from_str_radix(hex, 16).map_err(|_| invalid())?;
        return Ok(Literal::Int(if negative { -value } else { value }));
    }
    if digits.contains(['.', 'e', 'E']) {
        return text.parse::<f64>().map(Literal::Float).map_err(|_| invalid());
    }
    text.parse::<i64>().map(Literal::Int).map_err(|_| invalid())
}

/// Decode a double-quoted Go string literal
fn unquote(text: &str) -> Result<String> {
    let invalid = || ParseError::InvalidString(text.to_string());
    let body = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(invalid)?;

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next().ok_or_else(invalid)? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'x' => out.push(hex_char(&mut chars, 2).ok_or_else(invalid)?),
            'u' => out.push(hex_char(&mut chars, 4).ok_or_else(invalid)?),
            'U' => out.push(hex_char(&mut chars, 8).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        }
    }
    Ok(out)
}

fn hex_char(chars: &mut std::str::Chars<'_>, len: usize) -> Option<char> {
    let digits: String = chars.by_ref().take(len).collect();
    if digits.len() != len {
        return None;
    }
    u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
}

/// Apply `{{-` and `-}}` to the neighbouring text
fn trim_whitespace(items: &mut [Item]) {
    const SPACES: &[char] = &[' ', '\t', '\r', '\n'];

    for i in 0..items.len() {
        let (trim_left, trim_right) = match &items[i] {
            Item::Action {
                trim_left,
                trim_right,
                ..
            } => (*trim_left, *trim_right),
            Item::Text(_) => continue,
        };
        if trim_left && i > 0 {
            if let Item::Text(text) = &mut items[i - 1] {
                let trimmed = text.trim_end_matches(SPACES).len();
                text.truncate(trimmed);
            }
        }
        if trim_right {
            if let Some(Item::Text(text)) = items.get_mut(i + 1) {
                *text = text.trim_start_matches(SPACES).to_string();
            }
        }
    }
}

/// Why a node list ended
enum Stop {
    Eof,
    End,
    Else,
    ElseIf(Pipeline),
    ElseWith(Pipeline),
}

impl Stop {
    fn unexpected(&self, context: &str) -> ParseError {
        let found = match self {
            Stop::Eof => "end of template",
            Stop::End => "{{end}}",
            Stop::Else => "{{else}}",
            Stop::ElseIf(_) => "{{else if}}",
            Stop::ElseWith(_) => "{{else with}}",
        };
        ParseError::Unexpected {
            found: found.to_string(),
            context: context.to_string(),
        }
    }
}

/// Nests control actions into nodes
struct Folder {
    items: std::vec::IntoIter<Item>,
    defines: Vec<(String, Vec<Node>)>,
}

impl Folder {
    fn list(&mut self) -> Result<(Vec<Node>, Stop)> {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            let body = match item {
                Item::Text(text) => {
                    if !text.is_empty() {
                        nodes.push(Node::Text(text));
                    }
                    continue;
                }
                Item::Action { body, .. } => body,
            };

            match body {
                ActionBody::Comment => {}
                ActionBody::Pipeline(pipeline) => nodes.push(Node::Output(pipeline)),
                ActionBody::If(pipeline) => nodes.push(self.conditional(pipeline, false)?),
                ActionBody::With(pipeline) => nodes.push(self.conditional(pipeline, true)?),
                ActionBody::Range { vars, pipeline } => {
                    let (body, stop) = self.list()?;
                    let otherwise = match stop {
                        Stop::End => Vec::new(),
                        Stop::Else => self.until_end("range")?,
                        other => return Err(other.unexpected("range")),
                    };
                    nodes.push(Node::Range {
                        vars,
                        pipeline,
                        body,
                        otherwise,
                    });
                }
                ActionBody::Define(name) => {
                    let body = self.until_end("define")?;
                    self.defines.push((name, body));
                }
                ActionBody::Block { name, pipeline } => {
                    let body = self.until_end("block")?;
                    self.defines.push((name.clone(), body));
                    nodes.push(Node::Template {
                        name,
                        pipeline: Some(pipeline),
                    });
                }
                ActionBody::Template { name, pipeline } => {
                    nodes.push(Node::Template { name, pipeline })
                }
                ActionBody::Break => nodes.push(Node::Break),
                ActionBody::Continue => nodes.push(Node::Continue),
                ActionBody::End => return Ok((nodes, Stop::End)),
                ActionBody::Else => return Ok((nodes, Stop::Else)),
                ActionBody::ElseIf(pipeline) => return Ok((nodes, Stop::ElseIf(pipeline))),
                ActionBody::ElseWith(pipeline) => return Ok((nodes, Stop::ElseWith(pipeline))),
            }
        }

        Ok((nodes, Stop::Eof))
    }

    fn until_end(&mut self, context: &str) -> Result<Vec<Node>> {
        match self.list()? {
            (body, Stop::End) => Ok(body),
            (_, other) => Err(other.unexpected(context)),
        }
    }

    /// `if` and `with` share their chaining rules
    fn conditional(&mut self, first: Pipeline, with: bool) -> Result<Node> {
        let context = if with { "with" } else { "if" };
        let mut branches = Vec::new();
        let mut condition = first;

        let otherwise = loop {
            let (body, stop) = self.list()?;
            branches.push((condition, body));
            match stop {
                Stop::End => break Vec::new(),
                Stop::Else => break self.until_end(context)?,
                Stop::ElseIf(next) if !with => condition = next,
                Stop::ElseWith(next) if with => condition = next,
                other => return Err(other.unexpected(context)),
            }
        };

        Ok(if with {
            Node::With {
                branches,
                otherwise,
            }
        } else {
            Node::If {
                branches,
                otherwise,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(template: &Template) -> &Pipeline {
        match &template.nodes[0] {
            Node::Output(pipeline) => pipeline,
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_field_access() {
        let template = parse("image: {{ .Values.image.repository }}").unwrap();
        assert_eq!(template.nodes[0], Node::Text("image: ".to_string()));
        match &template.nodes[1] {
            Node::Output(pipeline) => assert_eq!(
                pipeline.commands[0].args,
                vec![Operand::Field(vec![
                    "Values".to_string(),
                    "image".to_string(),
                    "repository".to_string()
                ])]
            ),
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_with_function() {
        let template = parse(r#"{{ .Values.tag | default "latest" | quote }}"#).unwrap();
        let pipeline = output(&template);
        assert_eq!(pipeline.commands.len(), 3);
        assert_eq!(
            pipeline.commands[1].args,
            vec![
                Operand::Identifier("default".to_string()),
                Operand::Literal(Literal::String("latest".to_string()))
            ]
        );
    }

    #[test]
    fn test_parse_trim_markers() {
        let template = parse("a:\n  {{- if .Values.on }}\n  b: 1\n  {{- end }}\n").unwrap();
        assert_eq!(template.nodes[0], Node::Text("a:".to_string()));
        match &template.nodes[1] {
            Node::If { branches, .. } => {
                assert_eq!(branches[0].1, vec![Node::Text("\n  b: 1".to_string())]);
            }
            other => panic!("expected if, got {:?}", other),
        }
        assert_eq!(template.nodes[2], Node::Text("\n".to_string()));
    }

    #[test]
    fn test_parse_else_if_chain() {
        let template =
            parse("{{ if .a }}A{{ else if .b }}B{{ else }}C{{ end }}").unwrap();
        match &template.nodes[0] {
            Node::If {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(otherwise, &vec![Node::Text("C".to_string())]);
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_range_with_vars() {
        let template = parse("{{ range $i, $c := .Values.containers }}{{ $c.image }}{{ end }}").unwrap();
        match &template.nodes[0] {
            Node::Range { vars, body, .. } => {
                let vars = vars.as_ref().unwrap();
                assert_eq!(vars.index_var.as_deref(), Some("$i"));
                assert_eq!(vars.value_var, "$c");
                match &body[0] {
                    Node::Output(p) => assert_eq!(
                        p.commands[0].args,
                        vec![Operand::Variable {
                            name: "$c".to_string(),
                            fields: vec!["image".to_string()]
                        }]
                    ),
                    other => panic!("expected output, got {:?}", other),
                }
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_define_is_collected() {
        let template = parse(
            "{{/* helper */}}{{- define \"web.name\" -}}{{ .Chart.Name }}{{- end -}}\nkind: Pod",
        )
        .unwrap();
        assert_eq!(template.defines.len(), 1);
        assert_eq!(template.defines[0].0, "web.name");
        assert_eq!(template.nodes, vec![Node::Text("kind: Pod".to_string())]);
    }

    #[test]
    fn test_parse_declaration_and_parenthesized() {
        let template = parse(r#"{{ $reg := (.Values.global).imageRegistry }}"#).unwrap();
        let pipeline = output(&template);
        assert_eq!(
            pipeline.decl,
            Some(Declaration {
                name: "$reg".to_string(),
                assign: false
            })
        );
        match &pipeline.commands[0].args[0] {
            Operand::Pipeline { fields, .. } => assert_eq!(fields, &vec!["imageRegistry".to_string()]),
            other => panic!("expected parenthesized pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_literals() {
        let template = parse(r#"{{ list 1 -2 1.5 0x1F true nil "a\"b" `raw` 'x' }}"#).unwrap();
        assert_eq!(
            output(&template).commands[0].args[1..],
            [
                Operand::Literal(Literal::Int(1)),
                Operand::Literal(Literal::Int(-2)),
                Operand::Literal(Literal::Float(1.5)),
                Operand::Literal(Literal::Int(31)),
                Operand::Literal(Literal::Bool(true)),
                Operand::Literal(Literal::Nil),
                Operand::Literal(Literal::String("a\"b".to_string())),
                Operand::Literal(Literal::String("raw".to_string())),
                Operand::Literal(Literal::Int('x' as i64)),
            ]
        );
    }

    #[test]
    fn test_unbalanced_end_is_an_error() {
        assert!(matches!(
            parse("{{ if .a }}x"),
            Err(ParseError::Unexpected { .. })
        ));
        assert!(matches!(parse("x{{ end }}"), Err(ParseError::Unexpected { .. })));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            parse("{{ .Values.image | }}"),
            Err(ParseError::Pest(_))
        ));
    }
}
