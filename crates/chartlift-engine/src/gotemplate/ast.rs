//! Syntax tree for Go templates
//!
//! The parser first produces a flat list of [`Item`]s (text and actions in
//! source order), then folds the control actions into nested [`Node`]s.

/// A parsed template file: its output nodes plus the `define` blocks it declares
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub nodes: Vec<Node>,
    pub defines: Vec<(String, Vec<Node>)>,
}

/// One element of a template body
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text between actions
    Text(String),
    /// `{{ pipeline }}`; declarations print nothing
    Output(Pipeline),
    /// `{{ if }}` with its `else if` chain
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    /// `{{ with }}` with its `else with` chain
    With {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    Range {
        vars: Option<RangeVars>,
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    /// `{{ template "name" pipeline }}`
    Template {
        name: String,
        pipeline: Option<Pipeline>,
    },
    Break,
    Continue,
}

/// `$i, $v :=` of a range action
#[derive(Debug, Clone, PartialEq)]
pub struct RangeVars {
    /// Set only when two variables are declared
    pub index_var: Option<String>,
    pub value_var: String,
}

/// Commands joined by `|`, optionally assigned to a variable
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub decl: Option<Declaration>,
    pub commands: Vec<Command>,
}

/// `$x := ...` declares, `$x = ...` assigns to an existing variable
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub assign: bool,
}

/// A command: a function name or value, followed by its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.`
    Dot,
    /// `.A.B`
    Field(Vec<String>),
    /// `$` or `$x`, with trailing fields
    Variable { name: String, fields: Vec<String> },
    /// Function name
    Identifier(String),
    Literal(Literal),
    /// `(pipeline).A.B`
    Pipeline {
        pipeline: Box<Pipeline>,
        fields: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
}

/// One source-order element before control actions are nested
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Text(String),
    Action {
        trim_left: bool,
        trim_right: bool,
        body: ActionBody,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionBody {
    Comment,
    If(Pipeline),
    ElseIf(Pipeline),
    ElseWith(Pipeline),
    Else,
    End,
    Range {
        vars: Option<RangeVars>,
        pipeline: Pipeline,
    },
    With(Pipeline),
    Define(String),
    Template {
        name: String,
        pipeline: Option<Pipeline>,
    },
    Block {
        name: String,
        pipeline: Pipeline,
    },
    Break,
    Continue,
    Pipeline(Pipeline),
}
