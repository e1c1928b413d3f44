//! Query-comprehension rendering of query models, used in trace output and
//! error diagnostics.

use crate::model::{BodyClause, ClauseArena, QueryModel, ResultOperator, SelectOrGroup, SourceClauseKind};

/// Render a model in comprehension style, e.g.
/// `from c in Customer where ... orderby ... select ...`.
pub fn format_model(model: &QueryModel, arena: &ClauseArena) -> String {
    let main = arena.get(model.main_from);
    let mut out = format!("from {} in {}", main.item_name, main.source);
    for clause in &model.body_clauses {
        match clause {
            BodyClause::Where(w) => {
                out.push_str(&format!(" where {}", w.predicate));
            }
            BodyClause::AdditionalFrom(id) => {
                let from = arena.get(*id);
                out.push_str(&format!(" from {} in {}", from.item_name, from.source));
            }
            BodyClause::Join(id) => {
                let join = arena.get(*id);
                match &join.kind {
                    SourceClauseKind::Join {
                        outer_key,
                        inner_key,
                    } => {
                        out.push_str(&format!(
                            " join {} in {} on {} equals {}",
                            join.item_name, join.source, outer_key, inner_key
                        ));
                    }
                    SourceClauseKind::GroupJoin {
                        outer_key,
                        inner_key,
                    } => {
                        out.push_str(&format!(
                            " join {} in {} on {} equals {} into group",
                            join.item_name, join.source, outer_key, inner_key
                        ));
                    }
                    _ => {}
                }
            }
            BodyClause::OrderBy(order) => {
                let orderings = order
                    .orderings
                    .iter()
                    .map(|o| format!("{} {}", o.expression, o.direction.keyword().to_lowercase()))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!(" orderby {}", orderings));
            }
        }
    }
    match &model.select {
        SelectOrGroup::Select(select) => {
            out.push_str(&format!(" select {}", select.selector));
        }
        SelectOrGroup::Group(group) => {
            out.push_str(&format!(
                " group {} by {}",
                group.element_selector, group.key_selector
            ));
        }
    }
    for operator in &model.result_operators {
        out.push_str(&format!(" => {}", operator_label(operator)));
    }
    out
}

fn operator_label(operator: &ResultOperator) -> String {
    match operator {
        ResultOperator::Distinct => "Distinct".to_string(),
        ResultOperator::Take(count) => format!("Take({})", count),
        ResultOperator::Skip(count) => format!("Skip({})", count),
        ResultOperator::Cast(target) => format!("Cast<{}>", target),
        ResultOperator::Count => "Count".to_string(),
        ResultOperator::LongCount => "LongCount".to_string(),
        ResultOperator::Any { predicate: None } => "Any".to_string(),
        ResultOperator::Any {
            predicate: Some(predicate),
        } => format!("Any({})", predicate),
        ResultOperator::All { predicate } => format!("All({})", predicate),
        ResultOperator::Contains { item } => format!("Contains({})", item),
        ResultOperator::SetOperation { op, .. } => format!("{} [query]", op.keyword()),
        ResultOperator::Choice { kind, or_default } => {
            let base = match kind {
                crate::model::ChoiceKind::First => "First",
                crate::model::ChoiceKind::Single => "Single",
                crate::model::ChoiceKind::Last => "Last",
            };
            if *or_default {
                format!("{}OrDefault", base)
            } else {
                base.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lambda, param, Queryable};
    use crate::model::builder::QueryModelBuilder;
    use crate::nodes::{NodeRegistry, ParseContext};

    #[test]
    fn test_comprehension_rendering() {
        let q = Queryable::source("Customer", "c")
            .filter(lambda("x", param("x").member("Active")))
            .order_by(lambda("x", param("x").member("Name")))
            .take(3);
        let mut arena = ClauseArena::new();
        let registry = NodeRegistry::with_defaults();
        let ctx = ParseContext::for_expression(q.expression());
        let node = registry.parse_chain(q.expression(), &ctx).unwrap();
        let model = QueryModelBuilder::new(&mut arena, &registry, &ctx)
            .build(&node)
            .unwrap();

        let text = format_model(&model, &arena);
        assert!(text.starts_with("from c in c<Customer>"), "was: {}", text);
        assert!(text.contains(" where "), "was: {}", text);
        assert!(text.contains(" orderby "), "was: {}", text);
        assert!(text.ends_with(" => Take(3)"), "was: {}", text);
    }
}
