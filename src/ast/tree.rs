use serde::Serialize;

use super::{
    Accessor, ConditionalBranch, Declarator, Expression, ExpressionKind, GroupMember, MatchCase,
    Place, Program, Statement, StatementKind, UpdateOperator,
};

/// Generic labelled tree used to display the AST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(name: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }
}

impl Program {
    pub fn to_tree(&self) -> TreeNode {
        TreeNode::with_children("Program", block(&self.statements))
    }
}

fn block(statements: &[Statement]) -> Vec<TreeNode> {
    statements.iter().map(Statement::to_tree).collect()
}

fn labelled_block(label: &str, statements: &[Statement]) -> TreeNode {
    TreeNode::with_children(label, block(statements))
}

fn declarators(label: &str, declarators: &[Declarator]) -> TreeNode {
    let children = declarators
        .iter()
        .map(|declarator| match &declarator.value {
            Some(value) => TreeNode::with_children(&declarator.name, vec![value.to_tree()]),
            None => TreeNode::leaf(&declarator.name),
        })
        .collect();
    TreeNode::with_children(label, children)
}

fn members(members: &[GroupMember]) -> Vec<TreeNode> {
    members
        .iter()
        .map(|member| {
            TreeNode::with_children("Member", vec![member.key.to_tree(), member.value.to_tree()])
        })
        .collect()
}

fn place(place: &Place) -> TreeNode {
    let base = TreeNode::leaf(format!("Identifier: {}", place.name));
    match &place.accessor {
        None => base,
        Some(Accessor::Index(index)) => {
            TreeNode::with_children("Index", vec![base, index.to_tree()])
        }
        Some(Accessor::Key(key)) => TreeNode::with_children("Member", vec![base, key.to_tree()]),
    }
}

fn branch(label: &str, branch: &ConditionalBranch) -> TreeNode {
    TreeNode::with_children(
        label,
        vec![
            TreeNode::with_children("Condition", vec![branch.condition.to_tree()]),
            labelled_block("Body", &branch.body),
        ],
    )
}

fn match_case(case: &MatchCase) -> TreeNode {
    let mut children = vec![case.value.to_tree()];
    children.extend(block(&case.body));
    TreeNode::with_children("Case", children)
}

impl Statement {
    pub fn to_tree(&self) -> TreeNode {
        match &self.kind {
            StatementKind::Var(list) => declarators("VarDeclaration", list),
            StatementKind::Fixed(list) => declarators("FixedDeclaration", list),
            StatementKind::Group {
                name, members: list, ..
            } => TreeNode::with_children(format!("GroupDeclaration: {name}"), members(list)),
            StatementKind::Function {
                name, params, body, ..
            } => TreeNode::with_children(
                format!("Function: {name}"),
                vec![
                    TreeNode::with_children(
                        "Parameters",
                        params
                            .iter()
                            .map(|param| TreeNode::leaf(&param.name))
                            .collect(),
                    ),
                    labelled_block("Body", body),
                ],
            ),
            StatementKind::Assign { target, op, value } => TreeNode::with_children(
                format!("Assignment ({})", op.symbol()),
                vec![place(target), value.to_tree()],
            ),
            StatementKind::Update { target, op } => {
                let symbol = match op {
                    UpdateOperator::Increment => "++",
                    UpdateOperator::Decrement => "--",
                };
                TreeNode::with_children(format!("Update ({symbol})"), vec![place(target)])
            }
            StatementKind::Show(value) => TreeNode::with_children("Show", vec![value.to_tree()]),
            StatementKind::Throw(value) => TreeNode::with_children(
                "Throw",
                value.iter().map(Expression::to_tree).collect(),
            ),
            StatementKind::Exit => TreeNode::leaf("Exit"),
            StatementKind::Next => TreeNode::leaf("Next"),
            StatementKind::Checkif {
                branches,
                otherwise,
            } => {
                let mut children = Vec::new();
                for (index, conditional) in branches.iter().enumerate() {
                    let label = if index == 0 { "Checkif" } else { "Recheck" };
                    children.push(branch(label, conditional));
                }
                if let Some(otherwise) = otherwise {
                    children.push(labelled_block("Otherwise", otherwise));
                }
                TreeNode::with_children("Conditional", children)
            }
            StatementKind::Match {
                subject,
                cases,
                default,
            } => {
                let mut children = vec![TreeNode::with_children(
                    "Subject",
                    vec![subject.to_tree()],
                )];
                children.extend(cases.iter().map(match_case));
                if let Some(default) = default {
                    children.push(labelled_block("Default", default));
                }
                TreeNode::with_children("Match", children)
            }
            StatementKind::Each {
                init,
                condition,
                update,
                body,
            } => TreeNode::with_children(
                "Each",
                vec![
                    TreeNode::with_children("Init", vec![init.to_tree()]),
                    TreeNode::with_children("Condition", vec![condition.to_tree()]),
                    TreeNode::with_children("Update", vec![update.to_tree()]),
                    labelled_block("Body", body),
                ],
            ),
            StatementKind::Repeat { condition, body } => TreeNode::with_children(
                "Repeat",
                vec![
                    TreeNode::with_children("Condition", vec![condition.to_tree()]),
                    labelled_block("Body", body),
                ],
            ),
            StatementKind::DoRepeat { body, condition } => TreeNode::with_children(
                "DoRepeat",
                vec![
                    labelled_block("Body", body),
                    TreeNode::with_children("Condition", vec![condition.to_tree()]),
                ],
            ),
            StatementKind::Expression(expression) => {
                TreeNode::with_children("ExpressionStatement", vec![expression.to_tree()])
            }
        }
    }
}

impl Expression {
    pub fn to_tree(&self) -> TreeNode {
        match &self.kind {
            ExpressionKind::Integer(value) => TreeNode::leaf(format!("Integer: {value}")),
            ExpressionKind::Point(value) => TreeNode::leaf(format!("Point: {value}")),
            ExpressionKind::Text(value) => TreeNode::leaf(format!("Text: {value:?}")),
            ExpressionKind::State(value) => {
                TreeNode::leaf(format!("State: {}", if *value { "YES" } else { "NO" }))
            }
            ExpressionKind::Empty => TreeNode::leaf("Empty"),
            ExpressionKind::Identifier(name) => TreeNode::leaf(format!("Identifier: {name}")),
            ExpressionKind::List(items) => {
                TreeNode::with_children("List", items.iter().map(Expression::to_tree).collect())
            }
            ExpressionKind::Group(list) => TreeNode::with_children("Group", members(list)),
            ExpressionKind::Index { target, index } => {
                TreeNode::with_children("Index", vec![target.to_tree(), index.to_tree()])
            }
            ExpressionKind::Member { target, key } => {
                TreeNode::with_children("Member", vec![target.to_tree(), key.to_tree()])
            }
            ExpressionKind::Unary { op, operand } => TreeNode::with_children(
                format!("Unary ({})", op.symbol()),
                vec![operand.to_tree()],
            ),
            ExpressionKind::Binary { left, op, right } => TreeNode::with_children(
                format!("Binary ({})", op.symbol()),
                vec![left.to_tree(), right.to_tree()],
            ),
            ExpressionKind::Call { name, args, .. } => TreeNode::with_children(
                format!("Call: {name}"),
                args.iter().map(Expression::to_tree).collect(),
            ),
            ExpressionKind::BuiltinCall { function, args } => TreeNode::with_children(
                format!("Builtin: {}", function.name()),
                args.iter().map(Expression::to_tree).collect(),
            ),
            ExpressionKind::Cast { target, value } => {
                TreeNode::with_children(format!("Cast: {}", target.name()), vec![value.to_tree()])
            }
            ExpressionKind::Input { prompt } => TreeNode::with_children(
                "Get",
                prompt.iter().map(|prompt| prompt.to_tree()).collect(),
            ),
        }
    }
}
