use crate::error::CompileError;
use crate::lexer::TokenType;
use crate::parser::parser::{ParseChild, ParseNode, ParseTag};

/// Declared/inferred type of a variable (spec §3). `Pointer` only ever shows
/// up on the synthetic `this` argument a method's symbol table carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarType {
    Int,
    Char,
    Boolean,
    Pointer,
    Class(String),
}

impl VarType {
    fn from_text(text: &str) -> VarType {
        match text {
            "int" => VarType::Int,
            "char" => VarType::Char,
            "boolean" => VarType::Boolean,
            other => VarType::Class(other.to_string()),
        }
    }
}

impl std::fmt::Display for VarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarType::Int => write!(f, "int"),
            VarType::Char => write!(f, "char"),
            VarType::Boolean => write!(f, "boolean"),
            VarType::Pointer => write!(f, "pointer"),
            VarType::Class(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Field,
    Static,
    Argument,
    Local,
}

/// A declared variable. `offset` is filled in when the variable is inserted
/// into a symbol table (spec §3 invariant); it is `0` on a freshly lifted AST.
/// `line` is the declaring token's source line, used for redeclaration
/// diagnostics (spec §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub var_type: VarType,
    pub kind: VarKind,
    pub offset: usize,
    pub line: usize,
}

impl Variable {
    fn new(name: impl Into<String>, var_type: VarType, kind: VarKind, line: usize) -> Self {
        Variable {
            name: name.into(),
            var_type,
            kind,
            offset: 0,
            line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubroutineCategory {
    Constructor,
    Function,
    Method,
}

#[derive(Debug, Clone)]
pub struct Subroutine {
    pub name: String,
    pub category: SubroutineCategory,
    pub return_type: String,
    pub declarations: Vec<Variable>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: String,
    pub declarations: Vec<Variable>,
    pub subroutines: Vec<Subroutine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Lt,
    Gt,
    Eq,
}

impl Operator {
    fn from_symbol(s: &str) -> Option<Operator> {
        Some(match s {
            "+" => Operator::Add,
            "-" => Operator::Sub,
            "*" => Operator::Mul,
            "/" => Operator::Div,
            "&" => Operator::And,
            "|" => Operator::Or,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "=" => Operator::Eq,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordConst {
    True,
    False,
    Null,
    This,
}

/// `len(operations) == len(terms) - 1`, evaluated strictly left-to-right
/// (spec §3 — no operator precedence in this language).
#[derive(Debug, Clone)]
pub struct Expression {
    pub terms: Vec<Term>,
    pub operations: Vec<Operator>,
}

/// `target.name(args)`, or a bare `name(args)` when `target` is `None`
/// (implicit call on the current instance — spec §4.3).
#[derive(Debug, Clone)]
pub struct SubCall {
    pub target: Option<String>,
    pub name: String,
    pub args: Vec<Expression>,
    /// Source line of the call, for codegen's undeclared-identifier
    /// diagnostics (spec §7: downstream errors inherit the parse node's line).
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub name: String,
    pub index: Option<Box<Expression>>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum Term {
    IntConst(i32),
    StringConst(String),
    KeywordConst(KeywordConst),
    Reference(Reference),
    Unary(UnaryOp, Box<Term>),
    Parenthesized(Box<Expression>),
    SubCall(SubCall),
}

#[derive(Debug, Clone)]
pub enum Statement {
    Let {
        target: Reference,
        value: Expression,
    },
    If {
        condition: Expression,
        then_branch: Vec<Statement>,
        else_branch: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    Do(SubCall),
    Return(Option<Expression>),
}

type LResult<T> = Result<T, CompileError>;

fn malformed(node: &ParseNode, what: &str) -> CompileError {
    CompileError::semantic(format!("malformed parse tree: {}", what), node.line)
}

/// Lifts a parsed `class` node into the typed AST the code generator walks
/// (spec §4.3).
pub fn lift_class(root: &ParseNode) -> LResult<Class> {
    if root.tag != ParseTag::Class {
        return Err(malformed(root, "expected class at top level"));
    }
    let name = root
        .leaves()
        .find(|t| t.token_type == TokenType::Identifier)
        .ok_or_else(|| malformed(root, "class is missing a name"))?
        .text
        .clone();

    let mut declarations = Vec::new();
    for var_dec in root.children.iter().filter_map(|c| match c {
        ParseChild::Node(n) if n.tag == ParseTag::ClassVarDec => Some(n),
        _ => None,
    }) {
        declarations.extend(lift_class_var_dec(var_dec)?);
    }

    let mut subroutines = Vec::new();
    for sub_dec in root.children.iter().filter_map(|c| match c {
        ParseChild::Node(n) if n.tag == ParseTag::SubroutineDec => Some(n),
        _ => None,
    }) {
        subroutines.push(lift_subroutine(sub_dec)?);
    }

    Ok(Class {
        name,
        declarations,
        subroutines,
    })
}

fn lift_class_var_dec(node: &ParseNode) -> LResult<Vec<Variable>> {
    let leaves: Vec<_> = node.leaves().collect();
    let kind = match leaves.first().map(|t| t.text.as_str()) {
        Some("field") => VarKind::Field,
        Some("static") => VarKind::Static,
        _ => return Err(malformed(node, "classVarDec missing field/static")),
    };
    let var_type = VarType::from_text(
        leaves
            .get(1)
            .ok_or_else(|| malformed(node, "classVarDec missing type"))?
            .text
            .as_str(),
    );
    Ok(leaves[2..]
        .iter()
        .filter(|t| t.token_type == TokenType::Identifier)
        .map(|t| Variable::new(t.text.clone(), var_type.clone(), kind, t.line))
        .collect())
}

fn lift_subroutine(node: &ParseNode) -> LResult<Subroutine> {
    let leaves: Vec<_> = node.leaves().collect();
    let category = match leaves.first().map(|t| t.text.as_str()) {
        Some("constructor") => SubroutineCategory::Constructor,
        Some("function") => SubroutineCategory::Function,
        Some("method") => SubroutineCategory::Method,
        _ => return Err(malformed(node, "subroutineDec missing category")),
    };
    let return_type = leaves
        .get(1)
        .ok_or_else(|| malformed(node, "subroutineDec missing return type"))?
        .text
        .clone();
    let name = leaves
        .get(2)
        .ok_or_else(|| malformed(node, "subroutineDec missing name"))?
        .text
        .clone();

    let mut declarations = Vec::new();
    if let Some(params) = node.node(ParseTag::ParameterList) {
        declarations.extend(lift_parameter_list(params)?);
    }

    let body = node
        .node(ParseTag::SubroutineBody)
        .ok_or_else(|| malformed(node, "subroutineDec missing body"))?;
    for var_dec in body.children.iter().filter_map(|c| match c {
        ParseChild::Node(n) if n.tag == ParseTag::VarDec => Some(n),
        _ => None,
    }) {
        declarations.extend(lift_var_dec(var_dec)?);
    }

    let statements_node = body
        .node(ParseTag::Statements)
        .ok_or_else(|| malformed(body, "subroutineBody missing statements"))?;
    let statements = lift_statements(statements_node)?;

    Ok(Subroutine {
        name,
        category,
        return_type,
        declarations,
        statements,
    })
}

fn lift_parameter_list(node: &ParseNode) -> LResult<Vec<Variable>> {
    let leaves: Vec<_> = node.leaves().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < leaves.len() {
        let var_type = VarType::from_text(&leaves[i].text);
        let name = leaves
            .get(i + 1)
            .ok_or_else(|| malformed(node, "parameterList missing identifier"))?
            .text
            .clone();
        let line = leaves[i + 1].line;
        out.push(Variable::new(name, var_type, VarKind::Argument, line));
        i += 2;
        if leaves.get(i).is_some_and(|t| t.text == ",") {
            i += 1;
        }
    }
    Ok(out)
}

fn lift_var_dec(node: &ParseNode) -> LResult<Vec<Variable>> {
    let leaves: Vec<_> = node.leaves().collect();
    let var_type = VarType::from_text(
        leaves
            .get(1)
            .ok_or_else(|| malformed(node, "varDec missing type"))?
            .text
            .as_str(),
    );
    Ok(leaves[2..]
        .iter()
        .filter(|t| t.token_type == TokenType::Identifier)
        .map(|t| Variable::new(t.text.clone(), var_type.clone(), VarKind::Local, t.line))
        .collect())
}

fn lift_statements(node: &ParseNode) -> LResult<Vec<Statement>> {
    node.nodes().map(lift_statement).collect()
}

fn lift_statement(node: &ParseNode) -> LResult<Statement> {
    match node.tag {
        ParseTag::LetStatement => lift_let(node),
        ParseTag::IfStatement => lift_if(node),
        ParseTag::WhileStatement => lift_while(node),
        ParseTag::DoStatement => lift_do(node),
        ParseTag::ReturnStatement => lift_return(node),
        _ => Err(malformed(node, "expected a statement")),
    }
}

fn lift_let(node: &ParseNode) -> LResult<Statement> {
    let name = node
        .leaves()
        .nth(1)
        .ok_or_else(|| malformed(node, "let missing identifier"))?
        .text
        .clone();
    let expressions: Vec<&ParseNode> = node.nodes().filter(|n| n.tag == ParseTag::Expression).collect();
    let (index, value) = match expressions.as_slice() {
        [value] => (None, *value),
        [index, value] => (Some(Box::new(lift_expression(index)?)), *value),
        _ => return Err(malformed(node, "let has an unexpected number of expressions")),
    };
    Ok(Statement::Let {
        target: Reference {
            name,
            index,
            line: node.line,
        },
        value: lift_expression(value)?,
    })
}

fn lift_if(node: &ParseNode) -> LResult<Statement> {
    let condition_node = node
        .node(ParseTag::Expression)
        .ok_or_else(|| malformed(node, "if missing condition"))?;
    let condition = lift_expression(condition_node)?;
    let blocks: Vec<&ParseNode> = node.nodes().filter(|n| n.tag == ParseTag::Statements).collect();
    let then_branch = match blocks.first() {
        Some(then_node) => lift_statements(then_node)?,
        None => return Err(malformed(node, "if missing then-branch")),
    };
    let else_branch = match blocks.get(1) {
        Some(else_node) => lift_statements(else_node)?,
        None => Vec::new(),
    };
    Ok(Statement::If {
        condition,
        then_branch,
        else_branch,
    })
}

fn lift_while(node: &ParseNode) -> LResult<Statement> {
    let condition_node = node
        .node(ParseTag::Expression)
        .ok_or_else(|| malformed(node, "while missing condition"))?;
    let condition = lift_expression(condition_node)?;
    let body_node = node
        .node(ParseTag::Statements)
        .ok_or_else(|| malformed(node, "while missing body"))?;
    let body = lift_statements(body_node)?;
    Ok(Statement::While { condition, body })
}

fn lift_do(node: &ParseNode) -> LResult<Statement> {
    Ok(Statement::Do(lift_sub_call(node)?))
}

fn lift_return(node: &ParseNode) -> LResult<Statement> {
    let expr = match node.node(ParseTag::Expression) {
        Some(e) => Some(lift_expression(e)?),
        None => None,
    };
    Ok(Statement::Return(expr))
}

/// Shared by `do` statements and `name(args)`/`target.name(args)` terms: the
/// identifier leaves are `[target?, name]` with an optional `.` in between.
fn lift_sub_call(node: &ParseNode) -> LResult<SubCall> {
    let identifiers: Vec<_> = node
        .leaves()
        .filter(|t| t.token_type == TokenType::Identifier)
        .collect();
    let (target, name) = match identifiers.as_slice() {
        [name] => (None, name.text.clone()),
        [target, name] => (Some(target.text.clone()), name.text.clone()),
        _ => return Err(malformed(node, "subroutine call has an unexpected shape")),
    };
    let args_node = node
        .node(ParseTag::ExpressionList)
        .ok_or_else(|| malformed(node, "subroutine call missing argument list"))?;
    let args = args_node
        .nodes()
        .filter(|n| n.tag == ParseTag::Expression)
        .map(lift_expression)
        .collect::<LResult<Vec<_>>>()?;
    Ok(SubCall {
        target,
        name,
        args,
        line: node.line,
    })
}

fn lift_expression(node: &ParseNode) -> LResult<Expression> {
    let mut terms = Vec::new();
    let mut operations = Vec::new();
    for child in &node.children {
        match child {
            ParseChild::Node(term_node) if term_node.tag == ParseTag::Term => {
                terms.push(lift_term(term_node)?);
            }
            ParseChild::Leaf(token) => {
                let op = Operator::from_symbol(&token.text)
                    .ok_or_else(|| malformed(node, "unsupported operator"))?;
                operations.push(op);
            }
            _ => return Err(malformed(node, "expression has an unexpected child")),
        }
    }
    Ok(Expression { terms, operations })
}

fn lift_term(node: &ParseNode) -> LResult<Term> {
    let first_leaf = node.leaves().next();
    let first_node = node.nodes().next();

    if let Some(token) = first_leaf {
        match token.token_type {
            TokenType::IntegerConstant => {
                let value: i32 = token
                    .text
                    .parse()
                    .map_err(|_| malformed(node, "invalid integer constant"))?;
                return Ok(Term::IntConst(value));
            }
            TokenType::StringConstant => return Ok(Term::StringConst(token.text.clone())),
            TokenType::Keyword => {
                let kw = match token.text.as_str() {
                    "true" => KeywordConst::True,
                    "false" => KeywordConst::False,
                    "null" => KeywordConst::Null,
                    "this" => KeywordConst::This,
                    _ => return Err(malformed(node, "unexpected keyword in term")),
                };
                return Ok(Term::KeywordConst(kw));
            }
            TokenType::Symbol if token.text == "-" || token.text == "~" => {
                let op = if token.text == "-" { UnaryOp::Neg } else { UnaryOp::Not };
                let inner = node
                    .nodes()
                    .next()
                    .ok_or_else(|| malformed(node, "unary operator missing operand"))?;
                return Ok(Term::Unary(op, Box::new(lift_term(inner)?)));
            }
            TokenType::Symbol if token.text == "(" => {
                let inner = first_node.ok_or_else(|| malformed(node, "parenthesized term missing expression"))?;
                return Ok(Term::Parenthesized(Box::new(lift_expression(inner)?)));
            }
            TokenType::Identifier => {
                let has_dot = node.leaves().any(|t| t.text == ".");
                let has_bracket = node.leaves().any(|t| t.text == "[");
                let has_call_paren = node
                    .leaves()
                    .nth(1)
                    .is_some_and(|t| t.text == "(");
                if has_dot || has_call_paren {
                    return Ok(Term::SubCall(lift_sub_call(node)?));
                }
                if has_bracket {
                    let index_expr = node
                        .node(ParseTag::Expression)
                        .ok_or_else(|| malformed(node, "array reference missing index"))?;
                    return Ok(Term::Reference(Reference {
                        name: token.text.clone(),
                        index: Some(Box::new(lift_expression(index_expr)?)),
                        line: node.line,
                    }));
                }
                return Ok(Term::Reference(Reference {
                    name: token.text.clone(),
                    index: None,
                    line: node.line,
                }));
            }
            _ => {}
        }
    }
    Err(malformed(node, "unrecognized term shape"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::parser::Parser;
    use std::io::Cursor;

    fn lift(src: &str) -> Class {
        let tokens = Lexer::lex(Cursor::new(src)).unwrap();
        let tree = Parser::parse_class(tokens).unwrap();
        lift_class(&tree).unwrap()
    }

    #[test]
    fn lifts_class_var_decs_expanding_comma_lists() {
        let class = lift("class Foo { field int x, y, z; }");
        assert_eq!(class.declarations.len(), 3);
        assert!(class.declarations.iter().all(|v| v.kind == VarKind::Field));
    }

    #[test]
    fn lifts_subroutine_with_params_and_locals() {
        let class = lift(
            "class Foo { function int add(int a, int b) { var int c; let c = a + b; return c; } }",
        );
        let sub = &class.subroutines[0];
        assert_eq!(sub.category, SubroutineCategory::Function);
        assert_eq!(sub.declarations.len(), 3); // a, b, c
    }

    #[test]
    fn lifts_implicit_method_call_as_none_target() {
        let class = lift("class Foo { function void m() { do helper(1); } }");
        match &class.subroutines[0].statements[0] {
            Statement::Do(call) => {
                assert!(call.target.is_none());
                assert_eq!(call.name, "helper");
            }
            _ => panic!("expected Do statement"),
        }
    }

    #[test]
    fn lifts_if_without_else_to_empty_branch() {
        let class = lift("class Foo { function void m() { if (true) { return; } } }");
        match &class.subroutines[0].statements[0] {
            Statement::If { else_branch, .. } => assert!(else_branch.is_empty()),
            _ => panic!("expected If statement"),
        }
    }

    #[test]
    fn lifts_array_reference_with_index() {
        let class = lift(
            "class Foo { function void m() { var Array a; var int i; let a[i] = 1; } }",
        );
        match &class.subroutines[0].statements[0] {
            Statement::Let { target, .. } => assert!(target.index.is_some()),
            _ => panic!("expected Let statement"),
        }
    }
}
