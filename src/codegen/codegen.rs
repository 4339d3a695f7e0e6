use crate::error::CompileError;
use crate::parser::{
    Class, Expression, KeywordConst, Operator, Reference, Statement, SubCall, SubroutineCategory,
    Term, UnaryOp,
};
use crate::symbols::SymbolTable;

type CResult<T> = Result<T, CompileError>;

/// Lowers a lifted `Class` into VM text, one instruction per line (spec
/// §4.4). The label counter is per-class and monotonic across every
/// subroutine, matching the shared counter a class-level compiler owns.
pub struct ClassCompiler<'a> {
    class: &'a Class,
    class_table: SymbolTable,
    label_counter: usize,
}

impl<'a> ClassCompiler<'a> {
    pub fn new(class: &'a Class) -> CResult<Self> {
        let mut class_table = SymbolTable::new_class();
        for declaration in &class.declarations {
            class_table.insert(&declaration.name, declaration.clone(), declaration.line)?;
        }
        Ok(ClassCompiler {
            class,
            class_table,
            label_counter: 0,
        })
    }

    pub fn compile(mut self) -> CResult<String> {
        let mut lines = Vec::new();
        for subroutine in &self.class.subroutines {
            let mut compiler = SubroutineCompiler::new(self.class, &self.class_table, &mut self.label_counter);
            lines.extend(compiler.compile(subroutine)?);
        }
        Ok(lines.join("\n"))
    }
}

struct SubroutineCompiler<'a, 'c> {
    class: &'a Class,
    table: SymbolTable,
    /// The class's own field count (spec §4.4 point 2's `Memory.alloc`
    /// argument) — the subroutine-local `table` never holds `Field`
    /// entries, so this must come from the class-level table directly.
    class_field_count: usize,
    label_counter: &'c mut usize,
}

impl<'a, 'c> SubroutineCompiler<'a, 'c> {
    fn new(class: &'a Class, class_table: &SymbolTable, label_counter: &'c mut usize) -> Self {
        SubroutineCompiler {
            class,
            table: SymbolTable::new_subroutine(class_table),
            class_field_count: class_table.field_count(),
            label_counter,
        }
    }

    fn next_label(&mut self) -> usize {
        let id = *self.label_counter;
        *self.label_counter += 1;
        id
    }

    fn compile(&mut self, sub: &crate::parser::Subroutine) -> CResult<Vec<String>> {
        if sub.category == SubroutineCategory::Method {
            self.table.declare_method_this()?;
        }
        for declaration in &sub.declarations {
            self.table.insert(&declaration.name, declaration.clone(), declaration.line)?;
        }

        let mut lines = Vec::new();
        lines.push(format!(
            "function {}.{} {}",
            self.class.name,
            sub.name,
            self.table.local_count()
        ));
        match sub.category {
            SubroutineCategory::Constructor => {
                lines.push(format!("push constant {}", self.class_field_count));
                lines.push("call Memory.alloc 1".to_string());
                lines.push("pop pointer 0".to_string());
            }
            SubroutineCategory::Method => {
                lines.push("push argument 0".to_string());
                lines.push("pop pointer 0".to_string());
            }
            SubroutineCategory::Function => {}
        }
        for statement in &sub.statements {
            lines.extend(self.compile_statement(statement)?);
        }
        Ok(lines)
    }

    fn compile_statements(&mut self, statements: &[Statement]) -> CResult<Vec<String>> {
        let mut lines = Vec::new();
        for statement in statements {
            lines.extend(self.compile_statement(statement)?);
        }
        Ok(lines)
    }

    fn compile_statement(&mut self, statement: &Statement) -> CResult<Vec<String>> {
        match statement {
            Statement::Let { target, value } => self.compile_let(target, value),
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => self.compile_if(condition, then_branch, else_branch),
            Statement::While { condition, body } => self.compile_while(condition, body),
            Statement::Do(call) => {
                let mut lines = self.compile_sub_call(call)?;
                lines.push("pop temp 0".to_string());
                Ok(lines)
            }
            Statement::Return(expr) => self.compile_return(expr.as_ref()),
        }
    }

    /// Plain target: compile `expr`, `pop <seg> <offset>`. Array target:
    /// address-first ordering via `temp 0` (spec §4.4's authoritative
    /// array-assignment sequence).
    fn compile_let(&mut self, target: &Reference, value: &Expression) -> CResult<Vec<String>> {
        let mut lines = Vec::new();
        match &target.index {
            None => {
                lines.extend(self.compile_expression(value)?);
                let resolved = self.table.resolve(&target.name, target.line)?;
                lines.push(format!("pop {} {}", resolved.segment, resolved.offset));
            }
            Some(index) => {
                let resolved = self.table.resolve(&target.name, target.line)?;
                lines.push(format!("push {} {}", resolved.segment, resolved.offset));
                lines.extend(self.compile_expression(index)?);
                lines.push("add".to_string());
                lines.extend(self.compile_expression(value)?);
                lines.push("pop temp 0".to_string());
                lines.push("pop pointer 1".to_string());
                lines.push("push temp 0".to_string());
                lines.push("pop that 0".to_string());
            }
        }
        Ok(lines)
    }

    fn compile_if(
        &mut self,
        condition: &Expression,
        then_branch: &[Statement],
        else_branch: &[Statement],
    ) -> CResult<Vec<String>> {
        let id = self.next_label();
        let mut lines = self.compile_expression(condition)?;
        lines.push(format!("if-goto IF_{}", id));
        lines.extend(self.compile_statements(else_branch)?);
        lines.push(format!("goto ENDIF_{}", id));
        lines.push(format!("label IF_{}", id));
        lines.extend(self.compile_statements(then_branch)?);
        lines.push(format!("label ENDIF_{}", id));
        Ok(lines)
    }

    fn compile_while(&mut self, condition: &Expression, body: &[Statement]) -> CResult<Vec<String>> {
        let id = self.next_label();
        let mut lines = vec![format!("label WHILE_{}", id)];
        lines.extend(self.compile_expression(condition)?);
        lines.push("not".to_string());
        lines.push(format!("if-goto END_WHILE_{}", id));
        lines.extend(self.compile_statements(body)?);
        lines.push(format!("goto WHILE_{}", id));
        lines.push(format!("label END_WHILE_{}", id));
        Ok(lines)
    }

    fn compile_return(&mut self, expr: Option<&Expression>) -> CResult<Vec<String>> {
        let mut lines = match expr {
            Some(expr) => self.compile_expression(expr)?,
            None => vec!["push constant 0".to_string()],
        };
        lines.push("return".to_string());
        Ok(lines)
    }

    fn compile_expression(&mut self, expr: &Expression) -> CResult<Vec<String>> {
        let mut lines = self.compile_term(&expr.terms[0])?;
        for (term, op) in expr.terms[1..].iter().zip(expr.operations.iter()) {
            lines.extend(self.compile_term(term)?);
            lines.push(self.compile_operator(*op));
        }
        Ok(lines)
    }

    fn compile_operator(&self, op: Operator) -> String {
        match op {
            Operator::Add => "add".to_string(),
            Operator::Sub => "sub".to_string(),
            Operator::And => "and".to_string(),
            Operator::Or => "or".to_string(),
            Operator::Lt => "lt".to_string(),
            Operator::Gt => "gt".to_string(),
            Operator::Eq => "eq".to_string(),
            Operator::Mul => "call Math.multiply 2".to_string(),
            Operator::Div => "call Math.divide 2".to_string(),
        }
    }

    fn compile_term(&mut self, term: &Term) -> CResult<Vec<String>> {
        match term {
            Term::IntConst(n) => Ok(vec![format!("push constant {}", n)]),
            Term::StringConst(s) => Ok(self.compile_string_const(s)),
            Term::KeywordConst(k) => Ok(self.compile_keyword_const(*k)),
            Term::Unary(op, inner) => {
                let mut lines = self.compile_term(inner)?;
                lines.push(
                    match op {
                        UnaryOp::Neg => "neg",
                        UnaryOp::Not => "not",
                    }
                    .to_string(),
                );
                Ok(lines)
            }
            Term::Parenthesized(expr) => self.compile_expression(expr),
            Term::Reference(reference) => self.compile_reference(reference),
            Term::SubCall(call) => self.compile_sub_call(call),
        }
    }

    fn compile_string_const(&self, s: &str) -> Vec<String> {
        let mut lines = vec![
            format!("push constant {}", s.chars().count()),
            "call String.new 1".to_string(),
        ];
        for c in s.chars() {
            lines.push(format!("push constant {}", c as u32));
            lines.push("call String.appendChar 2".to_string());
        }
        lines
    }

    fn compile_keyword_const(&self, k: KeywordConst) -> Vec<String> {
        match k {
            KeywordConst::Null | KeywordConst::False => vec!["push constant 0".to_string()],
            KeywordConst::True => vec!["push constant 1".to_string(), "neg".to_string()],
            KeywordConst::This => vec!["push pointer 0".to_string()],
        }
    }

    /// Reads a (possibly array-indexed) reference's value. Assignment to an
    /// array target is handled separately by `compile_let`'s address-before-
    /// value ordering, not by this helper.
    fn compile_reference(&mut self, reference: &Reference) -> CResult<Vec<String>> {
        let resolved = self.table.resolve(&reference.name, reference.line)?;
        let mut lines = vec![format!("push {} {}", resolved.segment, resolved.offset)];
        if let Some(index) = &reference.index {
            lines.extend(self.compile_expression(index)?);
            lines.push("add".to_string());
            lines.push("pop pointer 1".to_string());
            lines.push("push that 0".to_string());
        }
        Ok(lines)
    }

    fn compile_sub_call(&mut self, call: &SubCall) -> CResult<Vec<String>> {
        let mut lines = Vec::new();
        let (callee_class, extra_arg) = match &call.target {
            None => {
                lines.push("push pointer 0".to_string());
                (self.class.name.clone(), 1)
            }
            // Type-checking is out of scope: a call on a resolved variable
            // lowers to `call <var's declared type>.<name>` regardless of
            // whether that type is itself a class name.
            Some(target) => match self.table.resolve(target, call.line) {
                Ok(resolved) => {
                    lines.push(format!("push {} {}", resolved.segment, resolved.offset));
                    (resolved.var_type.to_string(), 1)
                }
                Err(_) => (target.clone(), 0),
            },
        };
        for arg in &call.args {
            lines.extend(self.compile_expression(arg)?);
        }
        lines.push(format!(
            "call {}.{} {}",
            callee_class,
            call.name,
            call.args.len() + extra_arg
        ));
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::{lift_class, Parser};
    use std::io::Cursor;

    fn compile(src: &str) -> String {
        let tokens = Lexer::lex(Cursor::new(src)).unwrap();
        let tree = Parser::parse_class(tokens).unwrap();
        let class = lift_class(&tree).unwrap();
        ClassCompiler::new(&class).unwrap().compile().unwrap()
    }

    #[test]
    fn zero_arg_function_returning_constant() {
        let vm = compile("class C { function int zero() { return 0; } }");
        assert_eq!(vm, "function C.zero 0\npush constant 0\nreturn");
    }

    #[test]
    fn method_aliases_this_and_reads_a_field() {
        let vm = compile("class C { field int x; method int get() { return x; } }");
        assert_eq!(
            vm,
            "function C.get 0\npush argument 0\npop pointer 0\npush this 0\nreturn"
        );
    }

    #[test]
    fn do_statement_discards_return_value() {
        let vm = compile("class Main { function void m() { do Output.printInt(1+2); } }");
        assert!(vm.contains("push constant 1\npush constant 2\nadd\ncall Output.printInt 1\npop temp 0"));
    }

    #[test]
    fn array_assignment_uses_temp_based_ordering() {
        let vm = compile(
            "class C { function void m() { var Array a, i, j; let a[i] = a[j]; } }",
        );
        let expected = "push local 0\npush local 1\nadd\npush local 0\npush local 2\nadd\npop pointer 1\npush that 0\npop temp 0\npop pointer 1\npush temp 0\npop that 0";
        assert!(vm.contains(expected));
    }

    #[test]
    fn array_assignment_with_scalar_value_still_addresses_target_first() {
        let vm = compile("class C { function void m() { var Array a; var int i; let a[i] = 5; } }");
        let expected = "push local 0\npush local 1\nadd\npush constant 5\npop temp 0\npop pointer 1\npush temp 0\npop that 0";
        assert!(vm.contains(expected));
    }

    #[test]
    fn constructor_allocates_memory_for_its_fields() {
        let vm = compile("class C { field int a, b; constructor C new() { return this; } }");
        assert!(vm.starts_with("function C.new 0\npush constant 2\ncall Memory.alloc 1\npop pointer 0\n"));
    }

    #[test]
    fn if_without_else_emits_empty_else_branch() {
        let vm = compile("class C { function void m() { if (true) { return; } } }");
        assert!(vm.contains("if-goto IF_0\ngoto ENDIF_0\nlabel IF_0\n"));
    }

    #[test]
    fn while_loop_emits_matching_labels() {
        let vm = compile("class C { function void m() { while (true) { } } }");
        assert!(vm.contains("label WHILE_0"));
        assert!(vm.contains("label END_WHILE_0"));
    }

    #[test]
    fn implicit_self_call_pushes_pointer_zero() {
        let vm = compile("class C { function void m() { do helper(); } }");
        assert!(vm.contains("push pointer 0\ncall C.helper 1"));
    }

    #[test]
    fn label_counter_is_shared_across_subroutines() {
        let vm = compile(
            "class C { function void a() { if (true) { } } function void b() { if (true) { } } }",
        );
        assert!(vm.contains("IF_0"));
        assert!(vm.contains("IF_1"));
    }

    #[test]
    fn undeclared_reference_reports_its_own_source_line() {
        let tokens = Lexer::lex(Cursor::new(
            "class C { function void m() {\n\n  return missing;\n} }",
        ))
        .unwrap();
        let tree = Parser::parse_class(tokens).unwrap();
        let class = lift_class(&tree).unwrap();
        let err = ClassCompiler::new(&class).unwrap().compile().unwrap_err();
        match err {
            CompileError::Semantic { line, .. } => assert_eq!(line, 3),
            other => panic!("expected a semantic error, got {other:?}"),
        }
    }
}
