//! Deep cloning of query models with reference rewriting.
//!
//! Cloning allocates fresh arena entries for every query source, records the
//! old-to-new correspondence in a [`QuerySourceMapping`], and rewrites every
//! reference expression through that mapping. Nested sub-query models are
//! cloned recursively with the same mapping, so references crossing sub-query
//! boundaries stay consistent. References to clauses outside the cloned model
//! (outer sources of a correlated sub-query) pass through unchanged unless
//! the mapping already covers them.

use std::collections::HashMap;

use crate::expr::{Expression, MethodCallExpression};
use crate::model::{
    BodyClause, ClauseArena, ClauseId, GroupClause, OrderByClause, Ordering, QueryModel,
    ResultOperator, SelectClause, SelectOrGroup, SourceClause, SourceClauseKind, WhereClause,
};

/// Mapping from original clause IDs to their clones, shared across nested
/// models during one clone operation.
#[derive(Debug, Clone, Default)]
pub struct QuerySourceMapping {
    map: HashMap<ClauseId, ClauseId>,
}

impl QuerySourceMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, original: ClauseId, clone: ClauseId) {
        self.map.insert(original, clone);
    }

    pub fn lookup(&self, original: ClauseId) -> Option<ClauseId> {
        self.map.get(&original).copied()
    }

    /// The clone of `id`, or `id` itself for sources outside the mapping.
    pub fn target(&self, id: ClauseId) -> ClauseId {
        self.lookup(id).unwrap_or(id)
    }
}

impl QueryModel {
    /// Deep-clone this model into fresh arena entries, rewriting every
    /// internal back-reference. The result shares no mutable state with the
    /// original; cloning twice yields two independent, structurally equal
    /// models.
    pub fn clone_with(
        &self,
        arena: &mut ClauseArena,
        mapping: &mut QuerySourceMapping,
    ) -> QueryModel {
        // Allocate all clones first so forward references resolve.
        let ids = self.source_clause_ids();
        for &id in &ids {
            let data = arena.get(id).clone();
            let clone_id = arena.alloc(data);
            mapping.insert(id, clone_id);
        }

        // Rewrite the expressions held by each cloned source clause.
        for &id in &ids {
            let clone_id = mapping.target(id);
            let clause = arena.get(clone_id).clone();
            let rewritten = SourceClause {
                item_name: clause.item_name,
                item_type: clause.item_type,
                source: remap_expression(&clause.source, arena, mapping),
                kind: match clause.kind {
                    SourceClauseKind::MainFrom => SourceClauseKind::MainFrom,
                    SourceClauseKind::AdditionalFrom => SourceClauseKind::AdditionalFrom,
                    SourceClauseKind::Join {
                        outer_key,
                        inner_key,
                    } => SourceClauseKind::Join {
                        outer_key: remap_expression(&outer_key, arena, mapping),
                        inner_key: remap_expression(&inner_key, arena, mapping),
                    },
                    SourceClauseKind::GroupJoin {
                        outer_key,
                        inner_key,
                    } => SourceClauseKind::GroupJoin {
                        outer_key: remap_expression(&outer_key, arena, mapping),
                        inner_key: remap_expression(&inner_key, arena, mapping),
                    },
                },
            };
            *arena.get_mut(clone_id) = rewritten;
        }

        let body_clauses = self
            .body_clauses
            .iter()
            .map(|clause| match clause {
                BodyClause::Where(w) => BodyClause::Where(WhereClause {
                    predicate: remap_expression(&w.predicate, arena, mapping),
                }),
                BodyClause::AdditionalFrom(id) => BodyClause::AdditionalFrom(mapping.target(*id)),
                BodyClause::Join(id) => BodyClause::Join(mapping.target(*id)),
                BodyClause::OrderBy(o) => BodyClause::OrderBy(OrderByClause {
                    orderings: o
                        .orderings
                        .iter()
                        .map(|ord| Ordering {
                            expression: remap_expression(&ord.expression, arena, mapping),
                            direction: ord.direction,
                        })
                        .collect(),
                }),
            })
            .collect();

        let select = match &self.select {
            SelectOrGroup::Select(s) => SelectOrGroup::Select(SelectClause {
                selector: remap_expression(&s.selector, arena, mapping),
            }),
            SelectOrGroup::Group(g) => SelectOrGroup::Group(GroupClause {
                key_selector: remap_expression(&g.key_selector, arena, mapping),
                element_selector: remap_expression(&g.element_selector, arena, mapping),
            }),
        };

        let result_operators = self
            .result_operators
            .iter()
            .map(|op| match op {
                ResultOperator::Distinct => ResultOperator::Distinct,
                ResultOperator::Take(e) => {
                    ResultOperator::Take(remap_expression(e, arena, mapping))
                }
                ResultOperator::Skip(e) => {
                    ResultOperator::Skip(remap_expression(e, arena, mapping))
                }
                ResultOperator::Cast(t) => ResultOperator::Cast(t.clone()),
                ResultOperator::Count => ResultOperator::Count,
                ResultOperator::LongCount => ResultOperator::LongCount,
                ResultOperator::Any { predicate } => ResultOperator::Any {
                    predicate: predicate
                        .as_ref()
                        .map(|p| remap_expression(p, arena, mapping)),
                },
                ResultOperator::All { predicate } => ResultOperator::All {
                    predicate: remap_expression(predicate, arena, mapping),
                },
                ResultOperator::Contains { item } => ResultOperator::Contains {
                    item: remap_expression(item, arena, mapping),
                },
                ResultOperator::SetOperation { op, other } => ResultOperator::SetOperation {
                    op: *op,
                    other: other.clone_with(arena, mapping),
                },
                ResultOperator::Choice { kind, or_default } => ResultOperator::Choice {
                    kind: *kind,
                    or_default: *or_default,
                },
            })
            .collect();

        QueryModel {
            main_from: mapping.target(self.main_from),
            body_clauses,
            select,
            result_operators,
        }
    }
}

fn remap_expression(
    expression: &Expression,
    arena: &mut ClauseArena,
    mapping: &mut QuerySourceMapping,
) -> Expression {
    match expression {
        Expression::Reference(id) => Expression::Reference(mapping.target(*id)),
        Expression::SubQuery(model) => {
            Expression::SubQuery(Box::new(model.clone_with(arena, mapping)))
        }
        Expression::Member { source, member } => Expression::Member {
            source: Box::new(remap_expression(source, arena, mapping)),
            member: member.clone(),
        },
        Expression::Binary { op, left, right } => Expression::Binary {
            op: *op,
            left: Box::new(remap_expression(left, arena, mapping)),
            right: Box::new(remap_expression(right, arena, mapping)),
        },
        Expression::Unary { op, operand } => Expression::Unary {
            op: *op,
            operand: Box::new(remap_expression(operand, arena, mapping)),
        },
        Expression::Call(call) => Expression::Call(MethodCallExpression {
            method: call.method.clone(),
            source: Box::new(remap_expression(&call.source, arena, mapping)),
            arguments: call
                .arguments
                .iter()
                .map(|a| remap_expression(a, arena, mapping))
                .collect(),
        }),
        Expression::Lambda(l) => {
            let mut l = l.clone();
            l.body = remap_expression(&l.body, arena, mapping);
            Expression::Lambda(l)
        }
        Expression::New { members } => Expression::New {
            members: members
                .iter()
                .map(|(n, e)| (n.clone(), remap_expression(e, arena, mapping)))
                .collect(),
        },
        Expression::Constant(_) | Expression::Source { .. } | Expression::Parameter(_) => {
            expression.clone()
        }
    }
}

/// Structural equality of two models modulo clause identity: same item names,
/// types, clause order and result-operator order, with references compared
/// through the clause correspondence the walk itself establishes.
pub fn structurally_equal(a: &QueryModel, b: &QueryModel, arena: &ClauseArena) -> bool {
    let mut correspondence = HashMap::new();
    models_equal(a, b, arena, &mut correspondence)
}

fn models_equal(
    a: &QueryModel,
    b: &QueryModel,
    arena: &ClauseArena,
    correspondence: &mut HashMap<ClauseId, ClauseId>,
) -> bool {
    let a_ids = a.source_clause_ids();
    let b_ids = b.source_clause_ids();
    if a_ids.len() != b_ids.len() {
        return false;
    }
    for (&ai, &bi) in a_ids.iter().zip(&b_ids) {
        correspondence.insert(ai, bi);
    }
    for (&ai, &bi) in a_ids.iter().zip(&b_ids) {
        if !clauses_equal(arena.get(ai), arena.get(bi), arena, correspondence) {
            return false;
        }
    }

    if a.body_clauses.len() != b.body_clauses.len() {
        return false;
    }
    for (ca, cb) in a.body_clauses.iter().zip(&b.body_clauses) {
        let equal = match (ca, cb) {
            (BodyClause::Where(wa), BodyClause::Where(wb)) => {
                exprs_equal(&wa.predicate, &wb.predicate, arena, correspondence)
            }
            (BodyClause::AdditionalFrom(ia), BodyClause::AdditionalFrom(ib))
            | (BodyClause::Join(ia), BodyClause::Join(ib)) => {
                correspondence.get(ia) == Some(ib)
            }
            (BodyClause::OrderBy(oa), BodyClause::OrderBy(ob)) => {
                oa.orderings.len() == ob.orderings.len()
                    && oa.orderings.iter().zip(&ob.orderings).all(|(x, y)| {
                        x.direction == y.direction
                            && exprs_equal(&x.expression, &y.expression, arena, correspondence)
                    })
            }
            _ => false,
        };
        if !equal {
            return false;
        }
    }

    let select_equal = match (&a.select, &b.select) {
        (SelectOrGroup::Select(sa), SelectOrGroup::Select(sb)) => {
            exprs_equal(&sa.selector, &sb.selector, arena, correspondence)
        }
        (SelectOrGroup::Group(ga), SelectOrGroup::Group(gb)) => {
            exprs_equal(&ga.key_selector, &gb.key_selector, arena, correspondence)
                && exprs_equal(
                    &ga.element_selector,
                    &gb.element_selector,
                    arena,
                    correspondence,
                )
        }
        _ => false,
    };
    if !select_equal {
        return false;
    }

    a.result_operators.len() == b.result_operators.len()
        && a.result_operators
            .iter()
            .zip(&b.result_operators)
            .all(|(oa, ob)| operators_equal(oa, ob, arena, correspondence))
}

fn clauses_equal(
    a: &SourceClause,
    b: &SourceClause,
    arena: &ClauseArena,
    correspondence: &mut HashMap<ClauseId, ClauseId>,
) -> bool {
    if a.item_name != b.item_name || a.item_type != b.item_type {
        return false;
    }
    if !exprs_equal(&a.source, &b.source, arena, correspondence) {
        return false;
    }
    match (&a.kind, &b.kind) {
        (SourceClauseKind::MainFrom, SourceClauseKind::MainFrom)
        | (SourceClauseKind::AdditionalFrom, SourceClauseKind::AdditionalFrom) => true,
        (
            SourceClauseKind::Join {
                outer_key: oa,
                inner_key: ia,
            },
            SourceClauseKind::Join {
                outer_key: ob,
                inner_key: ib,
            },
        )
        | (
            SourceClauseKind::GroupJoin {
                outer_key: oa,
                inner_key: ia,
            },
            SourceClauseKind::GroupJoin {
                outer_key: ob,
                inner_key: ib,
            },
        ) => {
            exprs_equal(oa, ob, arena, correspondence) && exprs_equal(ia, ib, arena, correspondence)
        }
        _ => false,
    }
}

fn operators_equal(
    a: &ResultOperator,
    b: &ResultOperator,
    arena: &ClauseArena,
    correspondence: &mut HashMap<ClauseId, ClauseId>,
) -> bool {
    match (a, b) {
        (ResultOperator::Distinct, ResultOperator::Distinct)
        | (ResultOperator::Count, ResultOperator::Count)
        | (ResultOperator::LongCount, ResultOperator::LongCount) => true,
        (ResultOperator::Take(ea), ResultOperator::Take(eb))
        | (ResultOperator::Skip(ea), ResultOperator::Skip(eb)) => {
            exprs_equal(ea, eb, arena, correspondence)
        }
        (ResultOperator::Cast(ta), ResultOperator::Cast(tb)) => ta == tb,
        (ResultOperator::Any { predicate: pa }, ResultOperator::Any { predicate: pb }) => {
            match (pa, pb) {
                (None, None) => true,
                (Some(pa), Some(pb)) => exprs_equal(pa, pb, arena, correspondence),
                _ => false,
            }
        }
        (ResultOperator::All { predicate: pa }, ResultOperator::All { predicate: pb }) => {
            exprs_equal(pa, pb, arena, correspondence)
        }
        (ResultOperator::Contains { item: ia }, ResultOperator::Contains { item: ib }) => {
            exprs_equal(ia, ib, arena, correspondence)
        }
        (
            ResultOperator::SetOperation { op: oa, other: ma },
            ResultOperator::SetOperation { op: ob, other: mb },
        ) => oa == ob && models_equal(ma, mb, arena, correspondence),
        (
            ResultOperator::Choice {
                kind: ka,
                or_default: da,
            },
            ResultOperator::Choice {
                kind: kb,
                or_default: db,
            },
        ) => ka == kb && da == db,
        _ => false,
    }
}

fn exprs_equal(
    a: &Expression,
    b: &Expression,
    arena: &ClauseArena,
    correspondence: &mut HashMap<ClauseId, ClauseId>,
) -> bool {
    match (a, b) {
        (Expression::Reference(ia), Expression::Reference(ib)) => {
            match correspondence.get(ia) {
                Some(mapped) => mapped == ib,
                // Outer references pass through cloning unchanged.
                None => ia == ib,
            }
        }
        (Expression::SubQuery(ma), Expression::SubQuery(mb)) => {
            models_equal(ma, mb, arena, correspondence)
        }
        (
            Expression::Member {
                source: sa,
                member: na,
            },
            Expression::Member {
                source: sb,
                member: nb,
            },
        ) => na == nb && exprs_equal(sa, sb, arena, correspondence),
        (
            Expression::Binary {
                op: oa,
                left: la,
                right: ra,
            },
            Expression::Binary {
                op: ob,
                left: lb,
                right: rb,
            },
        ) => {
            oa == ob
                && exprs_equal(la, lb, arena, correspondence)
                && exprs_equal(ra, rb, arena, correspondence)
        }
        (
            Expression::Unary {
                op: oa,
                operand: ea,
            },
            Expression::Unary {
                op: ob,
                operand: eb,
            },
        ) => oa == ob && exprs_equal(ea, eb, arena, correspondence),
        (Expression::Call(ca), Expression::Call(cb)) => {
            ca.method == cb.method
                && exprs_equal(&ca.source, &cb.source, arena, correspondence)
                && ca.arguments.len() == cb.arguments.len()
                && ca
                    .arguments
                    .iter()
                    .zip(&cb.arguments)
                    .all(|(x, y)| exprs_equal(x, y, arena, correspondence))
        }
        (Expression::Lambda(la), Expression::Lambda(lb)) => {
            la.parameters == lb.parameters
                && exprs_equal(&la.body, &lb.body, arena, correspondence)
        }
        (Expression::New { members: ma }, Expression::New { members: mb }) => {
            ma.len() == mb.len()
                && ma.iter().zip(mb).all(|((na, ea), (nb, eb))| {
                    na == nb && exprs_equal(ea, eb, arena, correspondence)
                })
        }
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use crate::model::OrderingDirection;

    fn sample_model(arena: &mut ClauseArena) -> QueryModel {
        let main = arena.alloc(SourceClause {
            item_name: "c".into(),
            item_type: Some("Customer".into()),
            source: Expression::Source {
                element_type: "Customer".into(),
                name: "c".into(),
            },
            kind: SourceClauseKind::MainFrom,
        });
        let mut model = QueryModel::new(main);
        model.body_clauses.push(BodyClause::Where(WhereClause {
            predicate: Expression::Reference(main)
                .member("Active")
                .eq(Expression::Constant(Value::Bool(true))),
        }));
        model.body_clauses.push(BodyClause::OrderBy(OrderByClause {
            orderings: vec![Ordering {
                expression: Expression::Reference(main).member("Name"),
                direction: OrderingDirection::Asc,
            }],
        }));
        model.select = SelectOrGroup::Select(SelectClause {
            selector: Expression::Reference(main).member("Name"),
        });
        model.result_operators.push(ResultOperator::Take(
            Expression::Constant(Value::Int(10)),
        ));
        model
    }

    fn referenced_ids(expression: &Expression, into: &mut Vec<ClauseId>) {
        match expression {
            Expression::Reference(id) => into.push(*id),
            Expression::Member { source, .. } => referenced_ids(source, into),
            Expression::Binary { left, right, .. } => {
                referenced_ids(left, into);
                referenced_ids(right, into);
            }
            Expression::Unary { operand, .. } => referenced_ids(operand, into),
            _ => {}
        }
    }

    #[test]
    fn test_clone_is_structurally_equal_but_shares_no_clause() {
        let mut arena = ClauseArena::new();
        let model = sample_model(&mut arena);
        let mut mapping = QuerySourceMapping::new();
        let clone = model.clone_with(&mut arena, &mut mapping);

        assert!(structurally_equal(&model, &clone, &arena));
        let original_ids = model.source_clause_ids();
        let clone_ids = clone.source_clause_ids();
        for id in &clone_ids {
            assert!(!original_ids.contains(id), "clone reuses clause {:?}", id);
        }
    }

    #[test]
    fn test_clone_references_resolve_only_to_clones() {
        let mut arena = ClauseArena::new();
        let model = sample_model(&mut arena);
        let mut mapping = QuerySourceMapping::new();
        let clone = model.clone_with(&mut arena, &mut mapping);

        let clone_ids = clone.source_clause_ids();
        let mut refs = Vec::new();
        for clause in &clone.body_clauses {
            match clause {
                BodyClause::Where(w) => referenced_ids(&w.predicate, &mut refs),
                BodyClause::OrderBy(o) => {
                    for ord in &o.orderings {
                        referenced_ids(&ord.expression, &mut refs);
                    }
                }
                _ => {}
            }
        }
        if let SelectOrGroup::Select(s) = &clone.select {
            referenced_ids(&s.selector, &mut refs);
        }
        assert!(!refs.is_empty());
        for id in refs {
            assert!(clone_ids.contains(&id), "reference {:?} escapes the clone", id);
        }
    }

    #[test]
    fn test_cloning_is_composable() {
        let mut arena = ClauseArena::new();
        let model = sample_model(&mut arena);

        let mut first_mapping = QuerySourceMapping::new();
        let first = model.clone_with(&mut arena, &mut first_mapping);
        let mut second_mapping = QuerySourceMapping::new();
        let second = first.clone_with(&mut arena, &mut second_mapping);

        assert!(structurally_equal(&first, &second, &arena));
        assert!(structurally_equal(&model, &second, &arena));
    }

    #[test]
    fn test_two_clones_are_independent() {
        let mut arena = ClauseArena::new();
        let model = sample_model(&mut arena);

        let mut mapping_a = QuerySourceMapping::new();
        let clone_a = model.clone_with(&mut arena, &mut mapping_a);
        let mut mapping_b = QuerySourceMapping::new();
        let clone_b = model.clone_with(&mut arena, &mut mapping_b);

        assert!(structurally_equal(&clone_a, &clone_b, &arena));
        for id in clone_a.source_clause_ids() {
            assert!(!clone_b.source_clause_ids().contains(&id));
        }

        // Mutating one clone's clause leaves the other untouched.
        arena.get_mut(clone_a.main_from).item_name = "renamed".into();
        assert_eq!(arena.get(clone_b.main_from).item_name, "c");
        assert_eq!(arena.get(model.main_from).item_name, "c");
    }

    #[test]
    fn test_sub_query_models_are_cloned_with_shared_mapping() {
        let mut arena = ClauseArena::new();
        let outer_main = arena.alloc(SourceClause {
            item_name: "c".into(),
            item_type: Some("Customer".into()),
            source: Expression::Source {
                element_type: "Customer".into(),
                name: "c".into(),
            },
            kind: SourceClauseKind::MainFrom,
        });
        let inner_main = arena.alloc(SourceClause {
            item_name: "o".into(),
            item_type: Some("Order".into()),
            source: Expression::Reference(outer_main).member("Orders"),
            kind: SourceClauseKind::MainFrom,
        });
        let mut inner = QueryModel::new(inner_main);
        inner.result_operators.push(ResultOperator::Any { predicate: None });

        let mut outer = QueryModel::new(outer_main);
        outer.body_clauses.push(BodyClause::Where(WhereClause {
            predicate: Expression::SubQuery(Box::new(inner)),
        }));

        let mut mapping = QuerySourceMapping::new();
        let clone = outer.clone_with(&mut arena, &mut mapping);

        assert!(structurally_equal(&outer, &clone, &arena));
        let BodyClause::Where(w) = &clone.body_clauses[0] else {
            panic!("expected where clause");
        };
        let Expression::SubQuery(cloned_inner) = &w.predicate else {
            panic!("expected sub-query predicate");
        };
        // The inner clone's source must reference the cloned outer clause,
        // not the original.
        let inner_clause = arena.get(cloned_inner.main_from);
        let Expression::Member { source, .. } = &inner_clause.source else {
            panic!("expected member source");
        };
        assert_eq!(**source, Expression::Reference(mapping.target(outer_main)));
        assert_ne!(mapping.target(outer_main), outer_main);
    }

    #[test]
    fn test_ordering_direction_participates_in_equality() {
        let mut arena = ClauseArena::new();
        let model = sample_model(&mut arena);
        let mut mapping = QuerySourceMapping::new();
        let mut clone = model.clone_with(&mut arena, &mut mapping);
        if let Some(BodyClause::OrderBy(o)) = clone.body_clauses.get_mut(1) {
            o.orderings[0].direction = OrderingDirection::Desc;
        }
        assert!(!structurally_equal(&model, &clone, &arena));
    }
}
