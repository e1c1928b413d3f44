//! Construction of query models from parsed node trees.
//!
//! The builder walks the node list source-first, keeping a running
//! projection expression that stands for "the current item". Lambdas are
//! resolved by substituting their parameters with pieces of that projection,
//! and member access into an inline projection record collapses to the
//! projected expression, so intermediate record shapes never survive into
//! the model. Nested query chains found inside expressions become
//! [`Expression::SubQuery`] values built into the same clause arena.

use std::collections::HashMap;

use crate::error::{TranslateError, TranslateResult};
use crate::expr::{Expression, LambdaExpression, MethodCallExpression, Value};
use crate::model::{
    BodyClause, ClauseArena, GroupClause, OrderByClause, Ordering, QueryModel, ResultOperator,
    SelectClause, SelectOrGroup, SourceClause, SourceClauseKind, WhereClause,
};
use crate::nodes::{NodeRegistry, ParseContext, QueryNode};

/// Builds [`QueryModel`]s from node trees, allocating all query sources into
/// one shared arena.
pub struct QueryModelBuilder<'a> {
    arena: &'a mut ClauseArena,
    registry: &'a NodeRegistry,
    ctx: &'a ParseContext,
}

impl<'a> QueryModelBuilder<'a> {
    pub fn new(
        arena: &'a mut ClauseArena,
        registry: &'a NodeRegistry,
        ctx: &'a ParseContext,
    ) -> Self {
        Self {
            arena,
            registry,
            ctx,
        }
    }

    /// Build the model for a parsed chain.
    pub fn build(&mut self, node: &QueryNode) -> TranslateResult<QueryModel> {
        let ops = linearize(node);
        let (leaf, rest) = ops.split_first().ok_or_else(|| {
            TranslateError::parser("<empty>", "the query chain is empty", &self.ctx.root)
        })?;
        let QueryNode::Source {
            expression,
            element_type,
            name,
        } = leaf
        else {
            return Err(TranslateError::parser(
                "<chain>",
                "the query chain does not end in a source",
                &self.ctx.root,
            ));
        };

        let item_name = name
            .clone()
            .or_else(|| leaf_item_name(rest))
            .unwrap_or_else(|| "item".to_string());
        let main_from = self.arena.alloc(SourceClause {
            item_name,
            item_type: element_type.clone(),
            source: expression.clone(),
            kind: SourceClauseKind::MainFrom,
        });
        let mut model = QueryModel::new(main_from);
        let mut projection = Expression::Reference(main_from);

        for op in rest {
            // A clause-producing operator arriving after result operators
            // applies to the operators' outcome, so the model so far becomes
            // the source of a fresh one.
            if is_clause_operator(op) && !model.result_operators.is_empty() {
                let item_name = self.arena.get(model.main_from).item_name.clone();
                let wrapped = self.arena.alloc(SourceClause {
                    item_name,
                    item_type: None,
                    source: Expression::SubQuery(Box::new(model)),
                    kind: SourceClauseKind::MainFrom,
                });
                model = QueryModel::new(wrapped);
                projection = Expression::Reference(wrapped);
            }
            self.apply(op, &mut model, &mut projection)?;
        }
        Ok(model)
    }

    fn apply(
        &mut self,
        op: &QueryNode,
        model: &mut QueryModel,
        projection: &mut Expression,
    ) -> TranslateResult<()> {
        match op {
            QueryNode::Source { .. } => Err(TranslateError::parser(
                "<source>",
                "a source cannot appear past the start of a chain",
                &self.ctx.root,
            )),
            QueryNode::Where { predicate, .. } => {
                let predicate = self.resolve_lambda(predicate, &[projection.clone()])?;
                model
                    .body_clauses
                    .push(BodyClause::Where(WhereClause { predicate }));
                Ok(())
            }
            QueryNode::Select { selector, .. } => {
                *projection = self.resolve_lambda(selector, &[projection.clone()])?;
                model.select = SelectOrGroup::Select(SelectClause {
                    selector: projection.clone(),
                });
                Ok(())
            }
            QueryNode::OrderBy {
                selector,
                direction,
                append,
                ..
            } => {
                let ordering = Ordering {
                    expression: self.resolve_lambda(selector, &[projection.clone()])?,
                    direction: *direction,
                };
                if *append {
                    match model.body_clauses.last_mut() {
                        Some(BodyClause::OrderBy(clause)) => {
                            clause.orderings.push(ordering);
                            Ok(())
                        }
                        _ => Err(TranslateError::not_supported(
                            "'ThenBy' must directly follow an ordering",
                        )),
                    }
                } else {
                    model.body_clauses.push(BodyClause::OrderBy(OrderByClause {
                        orderings: vec![ordering],
                    }));
                    Ok(())
                }
            }
            QueryNode::SelectMany {
                collection_selector,
                result_selector,
                ..
            } => {
                let source = self.resolve_lambda(collection_selector, &[projection.clone()])?;
                let item = result_selector.parameters.get(1);
                let id = self.arena.alloc(SourceClause {
                    item_name: item
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| "item".to_string()),
                    item_type: item.and_then(|p| p.param_type.clone()),
                    source,
                    kind: SourceClauseKind::AdditionalFrom,
                });
                model.body_clauses.push(BodyClause::AdditionalFrom(id));
                *projection = self.resolve_lambda(
                    result_selector,
                    &[projection.clone(), Expression::Reference(id)],
                )?;
                model.select = SelectOrGroup::Select(SelectClause {
                    selector: projection.clone(),
                });
                Ok(())
            }
            QueryNode::Join {
                inner,
                outer_key,
                inner_key,
                result_selector,
                grouped,
                ..
            } => {
                let source = self.resolve_expression(inner, &HashMap::new())?;
                let item = inner_key.parameters.first();
                // Allocate first so the inner key can reference the clause;
                // the keys are patched in below.
                let id = self.arena.alloc(SourceClause {
                    item_name: item
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| "item".to_string()),
                    item_type: item.and_then(|p| p.param_type.clone()),
                    source,
                    kind: SourceClauseKind::Join {
                        outer_key: Expression::Constant(Value::Null),
                        inner_key: Expression::Constant(Value::Null),
                    },
                });
                let outer_key = self.resolve_lambda(outer_key, &[projection.clone()])?;
                let inner_key = self.resolve_lambda(inner_key, &[Expression::Reference(id)])?;
                self.arena.get_mut(id).kind = if *grouped {
                    SourceClauseKind::GroupJoin {
                        outer_key,
                        inner_key,
                    }
                } else {
                    SourceClauseKind::Join {
                        outer_key,
                        inner_key,
                    }
                };
                model.body_clauses.push(BodyClause::Join(id));
                *projection = self.resolve_lambda(
                    result_selector,
                    &[projection.clone(), Expression::Reference(id)],
                )?;
                model.select = SelectOrGroup::Select(SelectClause {
                    selector: projection.clone(),
                });
                Ok(())
            }
            QueryNode::GroupBy {
                key_selector,
                element_selector,
                ..
            } => {
                let key = self.resolve_lambda(key_selector, &[projection.clone()])?;
                let element = match element_selector {
                    Some(selector) => self.resolve_lambda(selector, &[projection.clone()])?,
                    None => projection.clone(),
                };
                model.select = SelectOrGroup::Group(GroupClause {
                    key_selector: key.clone(),
                    element_selector: element,
                });
                *projection = key;
                Ok(())
            }
            QueryNode::Distinct { .. } => {
                model.result_operators.push(ResultOperator::Distinct);
                Ok(())
            }
            QueryNode::Take { count, .. } => {
                let count = self.resolve_expression(count, &HashMap::new())?;
                model.result_operators.push(ResultOperator::Take(count));
                Ok(())
            }
            QueryNode::Skip { count, .. } => {
                let count = self.resolve_expression(count, &HashMap::new())?;
                model.result_operators.push(ResultOperator::Skip(count));
                Ok(())
            }
            QueryNode::Cast { target, .. } => {
                model
                    .result_operators
                    .push(ResultOperator::Cast(target.clone()));
                Ok(())
            }
            QueryNode::Count { long, .. } => {
                model.result_operators.push(if *long {
                    ResultOperator::LongCount
                } else {
                    ResultOperator::Count
                });
                Ok(())
            }
            QueryNode::Any { predicate, .. } => {
                let predicate = match predicate {
                    Some(predicate) => {
                        Some(self.resolve_lambda(predicate, &[projection.clone()])?)
                    }
                    None => None,
                };
                model
                    .result_operators
                    .push(ResultOperator::Any { predicate });
                Ok(())
            }
            QueryNode::All { predicate, .. } => {
                let predicate = self.resolve_lambda(predicate, &[projection.clone()])?;
                model
                    .result_operators
                    .push(ResultOperator::All { predicate });
                Ok(())
            }
            QueryNode::Contains { item, .. } => {
                let item = self.resolve_expression(item, &HashMap::new())?;
                model
                    .result_operators
                    .push(ResultOperator::Contains { item });
                Ok(())
            }
            QueryNode::SetOperation { op, other, .. } => {
                let other = self.build_chain(other)?;
                model
                    .result_operators
                    .push(ResultOperator::SetOperation { op: *op, other });
                Ok(())
            }
            QueryNode::Choice {
                kind, or_default, ..
            } => {
                model.result_operators.push(ResultOperator::Choice {
                    kind: *kind,
                    or_default: *or_default,
                });
                Ok(())
            }
        }
    }

    /// Parse and build a chain expression into a model in the shared arena.
    fn build_chain(&mut self, expression: &Expression) -> TranslateResult<QueryModel> {
        let node = self.registry.parse_chain(expression, self.ctx)?;
        self.build(&node)
    }

    /// Substitute the lambda's parameters with `arguments` and resolve the
    /// body.
    fn resolve_lambda(
        &mut self,
        lambda: &LambdaExpression,
        arguments: &[Expression],
    ) -> TranslateResult<Expression> {
        if lambda.parameters.len() > arguments.len() {
            return Err(TranslateError::parser(
                Expression::Lambda(Box::new(lambda.clone())),
                format!(
                    "the lambda takes {} parameters but only {} are available here",
                    lambda.parameters.len(),
                    arguments.len()
                ),
                &self.ctx.root,
            ));
        }
        let env: HashMap<String, Expression> = lambda
            .parameters
            .iter()
            .zip(arguments)
            .map(|(p, a)| (p.name.clone(), a.clone()))
            .collect();
        self.resolve_expression(&lambda.body, &env)
    }

    /// Resolve one expression: bind parameters from `env`, collapse member
    /// access into inline projections, and turn parseable call chains into
    /// sub-queries.
    fn resolve_expression(
        &mut self,
        expression: &Expression,
        env: &HashMap<String, Expression>,
    ) -> TranslateResult<Expression> {
        match expression {
            Expression::Parameter(p) => env.get(&p.name).cloned().ok_or_else(|| {
                TranslateError::parser(
                    expression,
                    format!("the parameter '{}' is not bound here", p.name),
                    &self.ctx.root,
                )
            }),
            Expression::Member { source, member } => {
                let source = self.resolve_expression(source, env)?;
                Ok(collapse_member(source, member))
            }
            Expression::Binary { op, left, right } => Ok(Expression::Binary {
                op: *op,
                left: Box::new(self.resolve_expression(left, env)?),
                right: Box::new(self.resolve_expression(right, env)?),
            }),
            Expression::Unary { op, operand } => Ok(Expression::Unary {
                op: *op,
                operand: Box::new(self.resolve_expression(operand, env)?),
            }),
            Expression::Call(call) if self.registry.can_parse(call) => {
                // A nested query chain. Bind the outer environment into it
                // first, then build it as a sub-query in the shared arena.
                let bound = substitute(expression, env);
                let model = self.build_chain(&bound)?;
                Ok(Expression::SubQuery(Box::new(model)))
            }
            Expression::Call(call) => Ok(Expression::Call(MethodCallExpression {
                method: call.method.clone(),
                source: Box::new(self.resolve_expression(&call.source, env)?),
                arguments: call
                    .arguments
                    .iter()
                    .map(|a| self.resolve_expression(a, env))
                    .collect::<TranslateResult<_>>()?,
            })),
            Expression::New { members } => Ok(Expression::New {
                members: members
                    .iter()
                    .map(|(n, e)| Ok((n.clone(), self.resolve_expression(e, env)?)))
                    .collect::<TranslateResult<_>>()?,
            }),
            Expression::Lambda(l) => {
                let mut inner_env = env.clone();
                for p in &l.parameters {
                    inner_env.remove(&p.name);
                }
                let mut l = l.clone();
                l.body = self.resolve_expression(&l.body, &inner_env)?;
                Ok(Expression::Lambda(l))
            }
            Expression::Constant(_)
            | Expression::Source { .. }
            | Expression::Reference(_)
            | Expression::SubQuery(_) => Ok(expression.clone()),
        }
    }
}

/// Member access into an inline record projection collapses to the projected
/// expression; everything else stays a member access.
fn collapse_member(source: Expression, member: &str) -> Expression {
    if let Expression::New { members } = &source {
        if let Some((_, projected)) = members.iter().find(|(name, _)| name == member) {
            return projected.clone();
        }
    }
    Expression::Member {
        source: Box::new(source),
        member: member.to_string(),
    }
}

/// Plain substitution of parameters, without sub-query detection. Parameters
/// bound by an inner lambda shadow the environment; unbound parameters are
/// left in place for a later resolution pass to report.
fn substitute(expression: &Expression, env: &HashMap<String, Expression>) -> Expression {
    match expression {
        Expression::Parameter(p) => env
            .get(&p.name)
            .cloned()
            .unwrap_or_else(|| expression.clone()),
        Expression::Member { source, member } => collapse_member(substitute(source, env), member),
        Expression::Binary { op, left, right } => Expression::Binary {
            op: *op,
            left: Box::new(substitute(left, env)),
            right: Box::new(substitute(right, env)),
        },
        Expression::Unary { op, operand } => Expression::Unary {
            op: *op,
            operand: Box::new(substitute(operand, env)),
        },
        Expression::Call(call) => Expression::Call(MethodCallExpression {
            method: call.method.clone(),
            source: Box::new(substitute(&call.source, env)),
            arguments: call.arguments.iter().map(|a| substitute(a, env)).collect(),
        }),
        Expression::New { members } => Expression::New {
            members: members
                .iter()
                .map(|(n, e)| (n.clone(), substitute(e, env)))
                .collect(),
        },
        Expression::Lambda(l) => {
            let mut inner_env = env.clone();
            for p in &l.parameters {
                inner_env.remove(&p.name);
            }
            let mut l = l.clone();
            l.body = substitute(&l.body, &inner_env);
            Expression::Lambda(l)
        }
        Expression::Constant(_)
        | Expression::Source { .. }
        | Expression::Reference(_)
        | Expression::SubQuery(_) => expression.clone(),
    }
}

fn is_clause_operator(node: &QueryNode) -> bool {
    matches!(
        node,
        QueryNode::Select { .. }
            | QueryNode::Where { .. }
            | QueryNode::OrderBy { .. }
            | QueryNode::SelectMany { .. }
            | QueryNode::Join { .. }
            | QueryNode::GroupBy { .. }
    )
}

/// Operators from leaf to root, leaf first.
fn linearize(node: &QueryNode) -> Vec<&QueryNode> {
    let mut ops = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        ops.push(n);
        current = n.source_node();
    }
    ops.reverse();
    ops
}

/// Item name for a leaf without one: the first lambda parameter found along
/// the chain.
fn leaf_item_name(ops: &[&QueryNode]) -> Option<String> {
    for op in ops {
        let lambda = match op {
            QueryNode::Select { selector, .. } => Some(selector),
            QueryNode::Where { predicate, .. } => Some(predicate),
            QueryNode::OrderBy { selector, .. } => Some(selector),
            QueryNode::SelectMany {
                collection_selector,
                ..
            } => Some(collection_selector),
            QueryNode::Join { outer_key, .. } => Some(outer_key),
            QueryNode::GroupBy { key_selector, .. } => Some(key_selector),
            QueryNode::Any {
                predicate: Some(predicate),
                ..
            } => Some(predicate),
            QueryNode::All { predicate, .. } => Some(predicate),
            _ => None,
        };
        if let Some(lambda) = lambda {
            if let Some(parameter) = lambda.parameters.first() {
                return Some(parameter.name.clone());
            }
        }
    }
    None
}
