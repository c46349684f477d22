use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ast::{
    Accessor, AssignOperator, Declarator, Expression, ExpressionKind, GroupMember, Place,
    Program, Statement, StatementKind, UpdateOperator,
};
use crate::builtins::BuiltinFunction;
use crate::token::Span;

pub mod error;
pub mod scope;
pub mod types;

pub use error::{SemanticError, SemanticErrorKind};
pub use scope::{Symbol, SymbolEntry, SymbolKind, SymbolTable};
pub use types::StaticType;

use types::{binary_result, cast_allowed, unary_result};

/// Result of checking a program: the symbols it declares and every problem found.
pub struct Analysis {
    pub table: SymbolTable,
    pub errors: Vec<SemanticError>,
}

impl Analysis {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.table.symbols()
    }
}

pub fn analyze(program: &Program) -> Analysis {
    let mut analyzer = Analyzer::default();
    analyzer.hoist_functions(&program.statements);
    for statement in &program.statements {
        analyzer.visit_statement(statement);
    }
    debug!(
        symbols = analyzer.table.entries().len(),
        errors = analyzer.errors.len(),
        "analyzed program"
    );
    Analysis {
        table: analyzer.table,
        errors: analyzer.errors,
    }
}

#[derive(Default)]
struct Analyzer {
    table: SymbolTable,
    errors: Vec<SemanticError>,
    reported: FxHashSet<(String, usize, usize)>,
    loop_depth: usize,
    function_depth: usize,
}

impl Analyzer {
    fn error(&mut self, kind: SemanticErrorKind, span: Span) {
        let key = (kind.to_string(), span.line, span.column);
        if self.reported.insert(key) {
            self.errors.push(SemanticError::new(kind, span));
        }
    }

    /// Registers every top-level function before any statement is checked, so calls may
    /// precede definitions.
    fn hoist_functions(&mut self, statements: &[Statement]) {
        let mut variables = FxHashSet::default();
        for statement in statements {
            match &statement.kind {
                StatementKind::Var(declarators) | StatementKind::Fixed(declarators) => {
                    variables.extend(declarators.iter().map(|d| d.name.as_str()));
                }
                StatementKind::Group { name, .. } => {
                    variables.insert(name.as_str());
                }
                StatementKind::Function {
                    name,
                    name_span,
                    params,
                    ..
                } => {
                    if variables.contains(name.as_str()) {
                        self.error(
                            SemanticErrorKind::DefinedAsVariable { name: name.clone() },
                            *name_span,
                        );
                        continue;
                    }
                    let entry = SymbolEntry::function(name, *name_span, params.len());
                    if self.table.declare_global(entry).is_err() {
                        self.error(
                            SemanticErrorKind::FunctionRedefined { name: name.clone() },
                            *name_span,
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn with_scope(&mut self, body: impl FnOnce(&mut Self)) {
        self.table.enter_scope();
        body(self);
        self.table.leave_scope();
    }

    fn visit_block(&mut self, statements: &[Statement]) {
        self.with_scope(|analyzer| {
            for statement in statements {
                analyzer.visit_statement(statement);
            }
        });
    }

    fn visit_loop_body(&mut self, statements: &[Statement]) {
        self.loop_depth += 1;
        self.visit_block(statements);
        self.loop_depth -= 1;
    }

    fn visit_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Var(declarators) => self.declare_variables(declarators, false),
            StatementKind::Fixed(declarators) => self.declare_variables(declarators, true),
            StatementKind::Group {
                name,
                name_span,
                members,
            } => {
                self.visit_group_members(members);
                self.declare_variable(name, *name_span, StaticType::Group, false);
            }
            StatementKind::Function { params, body, .. } => {
                let top_level = self.table.is_global() && self.function_depth == 0;
                if !top_level {
                    self.error(SemanticErrorKind::NestedFunction, statement.span);
                }
                let saved_loops = std::mem::take(&mut self.loop_depth);
                self.function_depth += 1;
                self.with_scope(|analyzer| {
                    for param in params {
                        let entry = SymbolEntry::parameter(&param.name, param.span);
                        if analyzer.table.declare(entry).is_err() {
                            analyzer.error(
                                SemanticErrorKind::DuplicateParameter {
                                    name: param.name.clone(),
                                },
                                param.span,
                            );
                        }
                    }
                    for statement in body {
                        analyzer.visit_statement(statement);
                    }
                });
                self.function_depth -= 1;
                self.loop_depth = saved_loops;
            }
            StatementKind::Assign { target, op, value } => {
                let value_type = self.visit_expression(value);
                self.visit_assignment(target, *op, value_type, value.span);
            }
            StatementKind::Update { target, op } => {
                let operator = match op {
                    UpdateOperator::Increment => "++",
                    UpdateOperator::Decrement => "--",
                };
                if let Some(ty) = self.visit_place(target)
                    && target.accessor.is_none()
                    && !ty.may_be_numeric()
                {
                    self.error(
                        SemanticErrorKind::OperandType {
                            operator,
                            operand: ty.name(),
                        },
                        target.span,
                    );
                }
            }
            StatementKind::Show(value) => {
                self.visit_expression(value);
            }
            StatementKind::Throw(value) => {
                if self.function_depth == 0 {
                    self.error(SemanticErrorKind::ThrowOutsideFunction, statement.span);
                }
                if let Some(value) = value {
                    self.visit_expression(value);
                }
            }
            StatementKind::Exit => {
                if self.loop_depth == 0 {
                    self.error(SemanticErrorKind::ExitOutsideLoop, statement.span);
                }
            }
            StatementKind::Next => {
                if self.loop_depth == 0 {
                    self.error(SemanticErrorKind::NextOutsideLoop, statement.span);
                }
            }
            StatementKind::Checkif {
                branches,
                otherwise,
            } => {
                for (index, branch) in branches.iter().enumerate() {
                    let construct = if index == 0 { "checkif" } else { "recheck" };
                    self.visit_condition(construct, &branch.condition);
                    self.visit_block(&branch.body);
                }
                if let Some(otherwise) = otherwise {
                    self.visit_block(otherwise);
                }
            }
            StatementKind::Match {
                subject,
                cases,
                default,
            } => {
                self.visit_expression(subject);
                for case in cases {
                    self.visit_expression(&case.value);
                    self.visit_block(&case.body);
                }
                if let Some(default) = default {
                    self.visit_block(default);
                }
            }
            StatementKind::Each {
                init,
                condition,
                update,
                body,
            } => self.with_scope(|analyzer| {
                analyzer.visit_each_init(init);
                analyzer.visit_condition("each", condition);
                analyzer.visit_statement(update);
                analyzer.visit_loop_body(body);
            }),
            StatementKind::Repeat { condition, body } => {
                self.visit_condition("repeat", condition);
                self.visit_loop_body(body);
            }
            StatementKind::DoRepeat { body, condition } => {
                self.visit_loop_body(body);
                self.visit_condition("repeat", condition);
            }
            StatementKind::Expression(expression) => {
                self.visit_expression(expression);
            }
        }
    }

    fn visit_each_init(&mut self, init: &Statement) {
        if let StatementKind::Assign {
            target,
            op: AssignOperator::Set,
            value,
        } = &init.kind
            && target.accessor.is_none()
            && self.table.lookup(&target.name).is_none()
        {
            let ty = self.visit_expression(value);
            self.declare_variable(&target.name, target.span, ty, false);
            return;
        }
        self.visit_statement(init);
    }

    fn declare_variables(&mut self, declarators: &[Declarator], fixed: bool) {
        for declarator in declarators {
            let ty = declarator
                .value
                .as_ref()
                .map_or(StaticType::Unknown, |value| self.visit_expression(value));
            self.declare_variable(&declarator.name, declarator.span, ty, fixed);
        }
    }

    fn declare_variable(&mut self, name: &str, span: Span, ty: StaticType, fixed: bool) {
        if let Some(existing) = self.table.lookup(name)
            && existing.kind == SymbolKind::Function
        {
            self.error(
                SemanticErrorKind::DefinedAsFunction {
                    name: name.to_string(),
                },
                span,
            );
            return;
        }
        let mut entry = SymbolEntry::variable(name, span, ty);
        if fixed {
            entry = entry.fixed();
        }
        if self.table.declare(entry).is_err() {
            self.error(
                SemanticErrorKind::AlreadyDeclared {
                    name: name.to_string(),
                },
                span,
            );
        }
    }

    /// Resolves an assignable place and checks its accessor. Returns the variable's type.
    fn visit_place(&mut self, place: &Place) -> Option<StaticType> {
        match &place.accessor {
            Some(Accessor::Index(index)) => {
                let index_type = self.visit_expression(index);
                self.check_index_type(index_type, index.span);
            }
            Some(Accessor::Key(key)) => {
                self.visit_expression(key);
            }
            None => {}
        }

        let Some(entry) = self.table.lookup(&place.name) else {
            self.error(
                SemanticErrorKind::UndeclaredIdentifier {
                    name: place.name.clone(),
                },
                place.span,
            );
            return None;
        };
        if entry.kind == SymbolKind::Function {
            self.error(
                SemanticErrorKind::FunctionAsValue {
                    name: place.name.clone(),
                },
                place.span,
            );
            return None;
        }
        let (ty, fixed) = (entry.ty, entry.fixed);
        if fixed {
            self.error(
                SemanticErrorKind::FixedReassignment {
                    name: place.name.clone(),
                },
                place.span,
            );
        }
        match &place.accessor {
            Some(Accessor::Index(_)) if !matches!(ty, StaticType::List | StaticType::Unknown) => {
                self.error(SemanticErrorKind::IndexTarget { found: ty.name() }, place.span);
            }
            Some(Accessor::Key(_)) if !matches!(ty, StaticType::Group | StaticType::Unknown) => {
                self.error(SemanticErrorKind::KeyTarget { found: ty.name() }, place.span);
            }
            _ => {}
        }
        Some(ty)
    }

    fn visit_assignment(
        &mut self,
        target: &Place,
        op: AssignOperator,
        value_type: StaticType,
        value_span: Span,
    ) {
        let Some(current) = self.visit_place(target) else {
            return;
        };
        if target.accessor.is_some() {
            return;
        }
        let assigned = match op.binary() {
            None => value_type,
            Some(binary) => match binary_result(binary, current, value_type) {
                Some(result) => result,
                None => {
                    self.error(
                        SemanticErrorKind::OperandTypes {
                            operator: op.symbol(),
                            left: current.name(),
                            right: value_type.name(),
                        },
                        value_span,
                    );
                    StaticType::Unknown
                }
            },
        };
        if let Some(entry) = self.table.lookup_mut(&target.name) {
            entry.ty = entry.ty.merge(assigned);
        }
    }

    fn visit_condition(&mut self, construct: &'static str, condition: &Expression) {
        let ty = self.visit_expression(condition);
        if ty.is_known() && ty != StaticType::State {
            self.error(
                SemanticErrorKind::ConditionType {
                    construct,
                    found: ty.name(),
                },
                condition.span,
            );
        }
    }

    fn check_index_type(&mut self, ty: StaticType, span: Span) {
        if !matches!(ty, StaticType::Integer | StaticType::Unknown) {
            self.error(SemanticErrorKind::IndexType { found: ty.name() }, span);
        }
    }

    fn visit_group_members(&mut self, members: &[GroupMember]) {
        let mut keys = FxHashSet::default();
        for member in members {
            let key_type = self.visit_expression(&member.key);
            self.visit_expression(&member.value);
            if matches!(
                key_type,
                StaticType::List | StaticType::Group | StaticType::Empty
            ) {
                self.error(
                    SemanticErrorKind::GroupKeyType {
                        found: key_type.name(),
                    },
                    member.key.span,
                );
            }
            if let Some(key) = literal_key(&member.key)
                && !keys.insert(key.clone())
            {
                self.error(SemanticErrorKind::DuplicateGroupKey { key }, member.key.span);
            }
        }
    }

    fn visit_expression(&mut self, expression: &Expression) -> StaticType {
        match &expression.kind {
            ExpressionKind::Integer(_) => StaticType::Integer,
            ExpressionKind::Point(_) => StaticType::Point,
            ExpressionKind::Text(_) => StaticType::Text,
            ExpressionKind::State(_) => StaticType::State,
            ExpressionKind::Empty => StaticType::Empty,
            ExpressionKind::Identifier(name) => match self.table.lookup(name) {
                None => {
                    self.error(
                        SemanticErrorKind::UndeclaredIdentifier { name: name.clone() },
                        expression.span,
                    );
                    StaticType::Unknown
                }
                Some(entry) if entry.kind == SymbolKind::Function => {
                    self.error(
                        SemanticErrorKind::FunctionAsValue { name: name.clone() },
                        expression.span,
                    );
                    StaticType::Unknown
                }
                Some(entry) => entry.ty,
            },
            ExpressionKind::List(items) => {
                for item in items {
                    self.visit_expression(item);
                }
                StaticType::List
            }
            ExpressionKind::Group(members) => {
                self.visit_group_members(members);
                StaticType::Group
            }
            ExpressionKind::Index { target, index } => {
                let target_type = self.visit_expression(target);
                let index_type = self.visit_expression(index);
                self.check_index_type(index_type, index.span);
                match target_type {
                    StaticType::Text => StaticType::Text,
                    StaticType::List | StaticType::Unknown => StaticType::Unknown,
                    other => {
                        self.error(
                            SemanticErrorKind::IndexTarget { found: other.name() },
                            target.span,
                        );
                        StaticType::Unknown
                    }
                }
            }
            ExpressionKind::Member { target, key } => {
                let target_type = self.visit_expression(target);
                self.visit_expression(key);
                if !matches!(target_type, StaticType::Group | StaticType::Unknown) {
                    self.error(
                        SemanticErrorKind::KeyTarget {
                            found: target_type.name(),
                        },
                        target.span,
                    );
                }
                StaticType::Unknown
            }
            ExpressionKind::Unary { op, operand } => {
                let operand_type = self.visit_expression(operand);
                unary_result(*op, operand_type).unwrap_or_else(|| {
                    self.error(
                        SemanticErrorKind::OperandType {
                            operator: op.symbol(),
                            operand: operand_type.name(),
                        },
                        expression.span,
                    );
                    StaticType::Unknown
                })
            }
            ExpressionKind::Binary { left, op, right } => {
                let left_type = self.visit_expression(left);
                let right_type = self.visit_expression(right);
                binary_result(*op, left_type, right_type).unwrap_or_else(|| {
                    self.error(
                        SemanticErrorKind::OperandTypes {
                            operator: op.symbol(),
                            left: left_type.name(),
                            right: right_type.name(),
                        },
                        expression.span,
                    );
                    StaticType::Unknown
                })
            }
            ExpressionKind::Call {
                name,
                name_span,
                args,
            } => {
                for arg in args {
                    self.visit_expression(arg);
                }
                match self.table.lookup(name) {
                    None => self.error(
                        SemanticErrorKind::UndefinedFunction { name: name.clone() },
                        *name_span,
                    ),
                    Some(entry) if entry.kind != SymbolKind::Function => self.error(
                        SemanticErrorKind::NotAFunction { name: name.clone() },
                        *name_span,
                    ),
                    Some(entry) if entry.arity != args.len() => {
                        let expected = entry.arity.to_string();
                        self.error(
                            SemanticErrorKind::ArityMismatch {
                                name: name.clone(),
                                expected,
                                found: args.len(),
                            },
                            *name_span,
                        )
                    }
                    Some(_) => {}
                }
                StaticType::Unknown
            }
            ExpressionKind::BuiltinCall { function, args } => {
                let arg_types = args
                    .iter()
                    .map(|arg| self.visit_expression(arg))
                    .collect::<Vec<_>>();
                self.check_builtin_call(*function, &arg_types, args, expression.span)
            }
            ExpressionKind::Cast { target, value } => {
                let value_type = self.visit_expression(value);
                if !cast_allowed(*target, value_type) {
                    self.error(
                        SemanticErrorKind::InvalidCast {
                            target: target.name(),
                            found: value_type.name(),
                        },
                        expression.span,
                    );
                }
                StaticType::from_cast(*target)
            }
            ExpressionKind::Input { prompt } => {
                if let Some(prompt) = prompt {
                    self.visit_expression(prompt);
                }
                StaticType::Unknown
            }
        }
    }

    fn check_builtin_call(
        &mut self,
        function: BuiltinFunction,
        arg_types: &[StaticType],
        args: &[Expression],
        span: Span,
    ) -> StaticType {
        let signature = function.signature();
        if !signature.accepts_arity(arg_types.len()) {
            self.error(
                SemanticErrorKind::ArityMismatch {
                    name: function.name().to_string(),
                    expected: signature.arity_label(),
                    found: arg_types.len(),
                },
                span,
            );
            return signature.returns;
        }
        for (position, (accepted, (&ty, arg))) in signature
            .params
            .iter()
            .zip(arg_types.iter().zip(args))
            .enumerate()
        {
            if accepted.is_empty() || !ty.is_known() || accepted.contains(&ty) {
                continue;
            }
            let expected = accepted
                .iter()
                .map(|ty| ty.name())
                .collect::<Vec<_>>()
                .join(" or ");
            self.error(
                SemanticErrorKind::ArgumentType {
                    function: function.name(),
                    position: position + 1,
                    expected,
                    found: ty.name(),
                },
                arg.span,
            );
        }

        let first = arg_types.first().copied().unwrap_or(StaticType::Unknown);
        match function {
            BuiltinFunction::Reverse | BuiltinFunction::Slice | BuiltinFunction::Abs => first,
            BuiltinFunction::Round if arg_types.len() == 1 => StaticType::Integer,
            BuiltinFunction::Round => StaticType::Point,
            _ => signature.returns,
        }
    }
}

/// Display form of a group key written as a literal, used to spot duplicates.
fn literal_key(expression: &Expression) -> Option<String> {
    match &expression.kind {
        ExpressionKind::Integer(value) => Some(value.to_string()),
        ExpressionKind::Point(value) => Some(value.to_string()),
        ExpressionKind::Text(value) => Some(format!("{value:?}")),
        ExpressionKind::State(value) => Some(if *value { "YES" } else { "NO" }.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};
    use indoc::indoc;

    fn analyze_source(input: &str) -> Analysis {
        let lexed = lexer::tokenize(input);
        assert!(lexed.errors.is_empty(), "{:?}", lexed.errors);
        let parsed = parser::parse_lexed(&lexed);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        analyze(&parsed.program)
    }

    fn messages(input: &str) -> Vec<String> {
        analyze_source(input)
            .errors
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn block_variables_do_not_leak() {
        let input = indoc! {"
            checkif(YES) {
                var inner = 1;
                show(inner);
            }
            show(inner);
        "};
        assert_eq!(messages(input), vec!["Undeclared identifier 'inner'"]);
    }

    #[test]
    fn redeclaration_and_fixed_reassignment() {
        let input = indoc! {"
            var x = 1;
            var x = 2;
            fixed limit = 10;
            limit = 11;
            limit++;
        "};
        assert_eq!(
            messages(input),
            vec![
                "Variable 'x' is already declared in the current scope",
                "Cannot reassign fixed variable 'limit'",
                "Cannot reassign fixed variable 'limit'",
            ]
        );
    }

    #[test]
    fn functions_are_hoisted_and_arity_checked() {
        let input = indoc! {"
            show(add(1, 2));
            show(add(1));
            show(missing());
            func add(a, b) {
                throw a + b;
            }
        "};
        assert_eq!(
            messages(input),
            vec![
                "Function 'add' expects 2 argument(s) but got 1",
                "Function 'missing' is not defined",
            ]
        );
    }

    #[test]
    fn loop_control_and_throw_placement() {
        let input = indoc! {"
            exit;
            repeat(YES) { next; exit; }
            throw 1;
        "};
        assert_eq!(
            messages(input),
            vec![
                "'exit' used outside of a loop",
                "'throw' used outside of a function",
            ]
        );
    }

    #[test]
    fn nested_functions_are_rejected() {
        let input = indoc! {"
            func outer() {
                func inner() { throw 1; }
                throw 2;
            }
        "};
        assert_eq!(
            messages(input),
            vec!["Functions can only be defined at the top level"]
        );
    }

    #[test]
    fn reports_static_type_errors() {
        let input = indoc! {r#"
            var n = 3;
            checkif(n) { show(1); }
            show("a" - n);
            show(length(5));
            show(integer([1, 2]));
        "#};
        assert_eq!(
            messages(input),
            vec![
                "Condition of 'checkif' must be state, not integer",
                "Cannot apply '-' to text and integer",
                "Argument 1 of 'length' must be list or text, not integer",
                "Cannot cast list to integer",
            ]
        );
    }

    #[test]
    fn state_is_arithmetic_but_logic_needs_state() {
        let input = indoc! {"
            show(YES + 1);
            show(NO * 3 - -YES);
            var flags = [YES];
            show(flags + 1);
            show(1 && YES);
            show(!3);
        "};
        assert_eq!(
            messages(input),
            vec![
                "Cannot apply '+' to list and integer",
                "Cannot apply '&&' to integer and state",
                "Cannot apply '!' to integer",
            ]
        );
    }

    #[test]
    fn reassignment_with_another_type_demotes_to_unknown() {
        let input = indoc! {r#"
            var v = 1;
            v = "one";
            show(v - 1);
        "#};
        assert!(messages(input).is_empty());
    }

    #[test]
    fn builtin_arity_uses_the_accepted_range() {
        assert_eq!(
            messages("show(round(1.5, 1, 2));"),
            vec!["Function 'round' expects 1 to 2 argument(s) but got 3"]
        );
    }

    #[test]
    fn each_header_declares_its_variable() {
        let analysis = analyze_source("each(i = 0; i < 3; i++) { show(i); }");
        assert!(analysis.errors.is_empty());
        let symbols = analysis.symbols();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "i");
        assert_eq!(symbols[0].scope, "local:1");
    }

    #[test]
    fn lists_parameters_with_their_function_scope() {
        let analysis = analyze_source("func twice(n) { throw n * 2; }\nvar r = twice(4);");
        let symbols = analysis.symbols();
        let summary = symbols
            .iter()
            .map(|symbol| {
                format!(
                    "{}:{:?}:{}:{}",
                    symbol.name, symbol.kind, symbol.scope, symbol.is_parameter
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                "twice:Function:global:false",
                "n:Parameter:local:1:true",
                "r:Variable:global:false",
            ]
        );
    }

    #[test]
    fn duplicate_group_keys_and_parameters() {
        let input = indoc! {r#"
            group g { "a": 1, "a": 2 };
            func f(p, p) { throw p; }
        "#};
        assert_eq!(
            messages(input),
            vec![
                "Duplicate key \"a\" in group literal",
                "Duplicate parameter name 'p'",
            ]
        );
    }
}
