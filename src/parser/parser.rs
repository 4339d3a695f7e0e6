use crate::error::CompileError;
use crate::lexer::{Token, TokenType};

/// Tags for every non-terminal production in spec §3/§4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTag {
    Class,
    ClassVarDec,
    SubroutineDec,
    ParameterList,
    SubroutineBody,
    VarDec,
    Statements,
    LetStatement,
    IfStatement,
    WhileStatement,
    DoStatement,
    ReturnStatement,
    Expression,
    Term,
    ExpressionList,
}

/// A parse-tree child: either a leaf token or a nested non-terminal. Order
/// is significant and mirrors the grammar's concatenation (spec §3).
#[derive(Debug, Clone)]
pub enum ParseChild {
    Leaf(Token),
    Node(ParseNode),
}

impl ParseChild {
    pub fn line(&self) -> usize {
        match self {
            ParseChild::Leaf(t) => t.line,
            ParseChild::Node(n) => n.line,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseNode {
    pub tag: ParseTag,
    pub children: Vec<ParseChild>,
    /// Line of this node's first child (spec §3 invariant: line numbers
    /// propagate from leaves to enclosing non-terminals).
    pub line: usize,
}

impl ParseNode {
    fn new(tag: ParseTag) -> Self {
        ParseNode {
            tag,
            children: Vec::new(),
            line: 0,
        }
    }

    fn push_leaf(&mut self, token: Token) {
        if self.children.is_empty() {
            self.line = token.line;
        }
        self.children.push(ParseChild::Leaf(token));
    }

    fn push_node(&mut self, node: ParseNode) {
        if self.children.is_empty() {
            self.line = node.line;
        }
        self.children.push(ParseChild::Node(node));
    }

    /// Leaves only, in order (helper for the lifter).
    pub fn leaves(&self) -> impl Iterator<Item = &Token> {
        self.children.iter().filter_map(|c| match c {
            ParseChild::Leaf(t) => Some(t),
            ParseChild::Node(_) => None,
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ParseNode> {
        self.children.iter().filter_map(|c| match c {
            ParseChild::Node(n) => Some(n),
            ParseChild::Leaf(_) => None,
        })
    }

    /// The single child node of the given tag, if present.
    pub fn node(&self, tag: ParseTag) -> Option<&ParseNode> {
        self.nodes().find(|n| n.tag == tag)
    }
}

/// Sentinel returned by `peek`/`peek_text` past the end of the token stream,
/// so the parser never has to special-case `None` at every call site.
const EOF_TEXT: &str = "";

/// One-token-lookahead cursor over the token sequence (spec §4.2, §9).
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, CompileError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_class(tokens: Vec<Token>) -> PResult<ParseNode> {
        let mut parser = Parser::new(tokens);
        parser.class()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_text(&self) -> &str {
        self.peek().map(|t| t.text.as_str()).unwrap_or(EOF_TEXT)
    }

    fn peek_line(&self) -> usize {
        self.peek()
            .map(|t| t.line)
            .or_else(|| self.tokens.last().map(|t| t.line))
            .unwrap_or(0)
    }

    fn advance(&mut self) -> PResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| CompileError::syntax("end of input", "more tokens", self.peek_line()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, token_type: TokenType, text: Option<&str>) -> PResult<Token> {
        let expected: String = text.map(|t| t.to_string()).unwrap_or_else(|| token_type.to_string());
        let line = self.peek_line();
        let encountered = self.peek_text().to_string();
        let token = self
            .advance()
            .map_err(|_| CompileError::syntax("end of input", expected.clone(), line))?;
        if token.token_type != token_type || text.is_some_and(|v| v != token.text) {
            return Err(CompileError::syntax(encountered, expected, token.line));
        }
        Ok(token)
    }

    fn expect_symbol(&mut self, symbol: &str) -> PResult<Token> {
        self.expect(TokenType::Symbol, Some(symbol))
    }

    fn expect_keyword(&mut self, keyword: &str) -> PResult<Token> {
        self.expect(TokenType::Keyword, Some(keyword))
    }

    fn at_symbol(&self, symbol: &str) -> bool {
        self.peek()
            .is_some_and(|t| t.token_type == TokenType::Symbol && t.text == symbol)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek()
            .is_some_and(|t| t.token_type == TokenType::Keyword && t.text == keyword)
    }

    /// `class := 'class' identifier '{' classVarDec* subroutineDec* '}'`
    fn class(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::Class);
        node.push_leaf(self.expect_keyword("class")?);
        node.push_leaf(self.expect(TokenType::Identifier, None)?);
        node.push_leaf(self.expect_symbol("{")?);
        while self.at_keyword("field") || self.at_keyword("static") {
            node.push_node(self.class_var_dec()?);
        }
        while self.at_keyword("constructor") || self.at_keyword("function") || self.at_keyword("method") {
            node.push_node(self.subroutine_dec()?);
        }
        node.push_leaf(self.expect_symbol("}")?);
        Ok(node)
    }

    /// `classVarDec := ('field'|'static') type identifier (',' identifier)* ';'`
    fn class_var_dec(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::ClassVarDec);
        let kind = self.advance()?; // field | static
        node.push_leaf(kind);
        node.push_leaf(self.parse_type()?);
        node.push_leaf(self.expect(TokenType::Identifier, None)?);
        while self.at_symbol(",") {
            node.push_leaf(self.expect_symbol(",")?);
            node.push_leaf(self.expect(TokenType::Identifier, None)?);
        }
        node.push_leaf(self.expect_symbol(";")?);
        Ok(node)
    }

    /// `type := 'int' | 'char' | 'boolean' | identifier`
    fn parse_type(&mut self) -> PResult<Token> {
        let line = self.peek_line();
        let text = self.peek_text().to_string();
        match self.peek().map(|t| &t.token_type) {
            Some(TokenType::Keyword) if ["int", "char", "boolean"].contains(&text.as_str()) => {
                self.advance()
            }
            Some(TokenType::Identifier) => self.advance(),
            _ => Err(CompileError::syntax(text, "type", line)),
        }
    }

    /// `subroutineDec := ('constructor'|'function'|'method') type identifier
    ///                   '(' parameterList ')' subroutineBody`
    fn subroutine_dec(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::SubroutineDec);
        node.push_leaf(self.advance()?); // constructor | function | method
        // return type is 'void', a builtin type, or a class name
        if self.at_keyword("void") {
            node.push_leaf(self.expect_keyword("void")?);
        } else {
            node.push_leaf(self.parse_type()?);
        }
        node.push_leaf(self.expect(TokenType::Identifier, None)?);
        node.push_leaf(self.expect_symbol("(")?);
        node.push_node(self.parameter_list()?);
        node.push_leaf(self.expect_symbol(")")?);
        node.push_node(self.subroutine_body()?);
        Ok(node)
    }

    /// `parameterList := (type identifier (',' type identifier)*)?`
    fn parameter_list(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::ParameterList);
        if self.at_symbol(")") {
            return Ok(node);
        }
        node.push_leaf(self.parse_type()?);
        node.push_leaf(self.expect(TokenType::Identifier, None)?);
        while self.at_symbol(",") {
            node.push_leaf(self.expect_symbol(",")?);
            node.push_leaf(self.parse_type()?);
            node.push_leaf(self.expect(TokenType::Identifier, None)?);
        }
        Ok(node)
    }

    /// `subroutineBody := '{' varDec* statement* '}'`
    fn subroutine_body(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::SubroutineBody);
        node.push_leaf(self.expect_symbol("{")?);
        while self.at_keyword("var") {
            node.push_node(self.var_dec()?);
        }
        node.push_node(self.statements()?);
        node.push_leaf(self.expect_symbol("}")?);
        Ok(node)
    }

    /// `varDec := 'var' type identifier (',' identifier)* ';'`
    fn var_dec(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::VarDec);
        node.push_leaf(self.expect_keyword("var")?);
        node.push_leaf(self.parse_type()?);
        node.push_leaf(self.expect(TokenType::Identifier, None)?);
        while self.at_symbol(",") {
            node.push_leaf(self.expect_symbol(",")?);
            node.push_leaf(self.expect(TokenType::Identifier, None)?);
        }
        node.push_leaf(self.expect_symbol(";")?);
        Ok(node)
    }

    /// `statements := statement*`, dispatched on the leading keyword.
    fn statements(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::Statements);
        loop {
            if self.at_keyword("let") {
                node.push_node(self.let_statement()?);
            } else if self.at_keyword("if") {
                node.push_node(self.if_statement()?);
            } else if self.at_keyword("while") {
                node.push_node(self.while_statement()?);
            } else if self.at_keyword("do") {
                node.push_node(self.do_statement()?);
            } else if self.at_keyword("return") {
                node.push_node(self.return_statement()?);
            } else {
                break;
            }
        }
        Ok(node)
    }

    /// `let := 'let' identifier ('[' expression ']')? '=' expression ';'`
    fn let_statement(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::LetStatement);
        node.push_leaf(self.expect_keyword("let")?);
        node.push_leaf(self.expect(TokenType::Identifier, None)?);
        if self.at_symbol("[") {
            node.push_leaf(self.expect_symbol("[")?);
            node.push_node(self.expression()?);
            node.push_leaf(self.expect_symbol("]")?);
        }
        node.push_leaf(self.expect_symbol("=")?);
        node.push_node(self.expression()?);
        node.push_leaf(self.expect_symbol(";")?);
        Ok(node)
    }

    /// `if := 'if' '(' expression ')' '{' statements '}' ('else' '{' statements '}')?`
    fn if_statement(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::IfStatement);
        node.push_leaf(self.expect_keyword("if")?);
        node.push_leaf(self.expect_symbol("(")?);
        node.push_node(self.expression()?);
        node.push_leaf(self.expect_symbol(")")?);
        node.push_leaf(self.expect_symbol("{")?);
        node.push_node(self.statements()?);
        node.push_leaf(self.expect_symbol("}")?);
        if self.at_keyword("else") {
            node.push_leaf(self.expect_keyword("else")?);
            node.push_leaf(self.expect_symbol("{")?);
            node.push_node(self.statements()?);
            node.push_leaf(self.expect_symbol("}")?);
        }
        Ok(node)
    }

    /// `while := 'while' '(' expression ')' '{' statements '}'`
    fn while_statement(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::WhileStatement);
        node.push_leaf(self.expect_keyword("while")?);
        node.push_leaf(self.expect_symbol("(")?);
        node.push_node(self.expression()?);
        node.push_leaf(self.expect_symbol(")")?);
        node.push_leaf(self.expect_symbol("{")?);
        node.push_node(self.statements()?);
        node.push_leaf(self.expect_symbol("}")?);
        Ok(node)
    }

    /// `do := 'do' subroutineCall ';'`
    fn do_statement(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::DoStatement);
        node.push_leaf(self.expect_keyword("do")?);
        self.subroutine_call(&mut node)?;
        node.push_leaf(self.expect_symbol(";")?);
        Ok(node)
    }

    /// `return := 'return' expression? ';'`
    fn return_statement(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::ReturnStatement);
        node.push_leaf(self.expect_keyword("return")?);
        if !self.at_symbol(";") {
            node.push_node(self.expression()?);
        }
        node.push_leaf(self.expect_symbol(";")?);
        Ok(node)
    }

    /// `subroutineCall := identifier '(' expressionList ')'
    ///                  | identifier '.' identifier '(' expressionList ')'`
    /// Appended directly onto `node` (used by both `do` and `term`).
    fn subroutine_call(&mut self, node: &mut ParseNode) -> PResult<()> {
        node.push_leaf(self.expect(TokenType::Identifier, None)?);
        if self.at_symbol(".") {
            node.push_leaf(self.expect_symbol(".")?);
            node.push_leaf(self.expect(TokenType::Identifier, None)?);
        }
        node.push_leaf(self.expect_symbol("(")?);
        node.push_node(self.expression_list()?);
        node.push_leaf(self.expect_symbol(")")?);
        Ok(())
    }

    /// `expression := term (op term)*`
    fn expression(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::Expression);
        node.push_node(self.term()?);
        while self.peek_is_operator() {
            node.push_leaf(self.advance()?);
            node.push_node(self.term()?);
        }
        Ok(node)
    }

    fn peek_is_operator(&self) -> bool {
        self.peek().is_some_and(|t| {
            t.token_type == TokenType::Symbol && "+-*/&|<>=".contains(t.text.as_str())
        })
    }

    /// `term := integerConstant | stringConstant | keywordConstant
    ///        | identifier ( '[' expression ']' | '.' identifier '(' expressionList ')' | '(' expressionList ')' )?
    ///        | '(' expression ')'
    ///        | ('-'|'~') term`
    fn term(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::Term);
        let line = self.peek_line();
        match self.peek().map(|t| t.token_type.clone()) {
            Some(TokenType::IntegerConstant) | Some(TokenType::StringConstant) => {
                node.push_leaf(self.advance()?);
            }
            Some(TokenType::Keyword)
                if ["true", "false", "null", "this"].contains(&self.peek_text()) =>
            {
                node.push_leaf(self.advance()?);
            }
            Some(TokenType::Identifier) => {
                node.push_leaf(self.advance()?);
                if self.at_symbol("[") {
                    node.push_leaf(self.expect_symbol("[")?);
                    node.push_node(self.expression()?);
                    node.push_leaf(self.expect_symbol("]")?);
                } else if self.at_symbol(".") {
                    node.push_leaf(self.expect_symbol(".")?);
                    node.push_leaf(self.expect(TokenType::Identifier, None)?);
                    node.push_leaf(self.expect_symbol("(")?);
                    node.push_node(self.expression_list()?);
                    node.push_leaf(self.expect_symbol(")")?);
                } else if self.at_symbol("(") {
                    node.push_leaf(self.expect_symbol("(")?);
                    node.push_node(self.expression_list()?);
                    node.push_leaf(self.expect_symbol(")")?);
                }
            }
            Some(TokenType::Symbol) if self.at_symbol("(") => {
                node.push_leaf(self.expect_symbol("(")?);
                node.push_node(self.expression()?);
                node.push_leaf(self.expect_symbol(")")?);
            }
            Some(TokenType::Symbol) if self.at_symbol("-") || self.at_symbol("~") => {
                node.push_leaf(self.advance()?);
                node.push_node(self.term()?);
            }
            _ => {
                return Err(CompileError::syntax(
                    self.peek_text().to_string(),
                    "term",
                    line,
                ));
            }
        }
        Ok(node)
    }

    /// `expressionList := (expression (',' expression)*)?`
    fn expression_list(&mut self) -> PResult<ParseNode> {
        let mut node = ParseNode::new(ParseTag::ExpressionList);
        if self.at_symbol(")") {
            return Ok(node);
        }
        node.push_node(self.expression()?);
        while self.at_symbol(",") {
            node.push_leaf(self.expect_symbol(",")?);
            node.push_node(self.expression()?);
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use std::io::Cursor;

    fn parse(src: &str) -> ParseNode {
        let tokens = Lexer::lex(Cursor::new(src)).unwrap();
        Parser::parse_class(tokens).unwrap()
    }

    #[test]
    fn parses_empty_class() {
        let tree = parse("class Foo { }");
        assert_eq!(tree.tag, ParseTag::Class);
        assert_eq!(tree.line, 1);
    }

    #[test]
    fn parses_class_var_decs_and_subroutine() {
        let tree = parse("class Foo { field int x; method int get() { return x; } }");
        assert_eq!(tree.node(ParseTag::ClassVarDec).unwrap().tag, ParseTag::ClassVarDec);
        assert!(tree.node(ParseTag::SubroutineDec).is_some());
    }

    #[test]
    fn parses_if_without_else() {
        let tree = parse(
            "class Foo { function void m() { if (true) { let x = 1; } return; } }",
        );
        let sub = tree.node(ParseTag::SubroutineDec).unwrap();
        let body = sub.node(ParseTag::SubroutineBody).unwrap();
        let statements = body.node(ParseTag::Statements).unwrap();
        let if_stmt = statements.node(ParseTag::IfStatement).unwrap();
        // two `{ statements }` blocks worth of leaves/nodes but only one `Statements`
        // node list with content (then-branch); no second Statements node means no else.
        let statement_nodes: Vec<_> = if_stmt.nodes().filter(|n| n.tag == ParseTag::Statements).collect();
        assert_eq!(statement_nodes.len(), 1);
    }

    #[test]
    fn missing_closing_brace_is_syntax_error() {
        let tokens = Lexer::lex(Cursor::new("class Foo { ")).unwrap();
        let err = Parser::parse_class(tokens).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
    }

    #[test]
    fn expression_is_left_to_right_flat_list() {
        let tree = parse("class Foo { function void m() { do f(1+2+3); } }");
        let sub = tree.node(ParseTag::SubroutineDec).unwrap();
        let body = sub.node(ParseTag::SubroutineBody).unwrap();
        let statements = body.node(ParseTag::Statements).unwrap();
        let do_stmt = statements.node(ParseTag::DoStatement).unwrap();
        let expr_list = do_stmt.node(ParseTag::ExpressionList).unwrap();
        let expr = expr_list.node(ParseTag::Expression).unwrap();
        let terms: Vec<_> = expr.nodes().filter(|n| n.tag == ParseTag::Term).collect();
        assert_eq!(terms.len(), 3);
    }
}
