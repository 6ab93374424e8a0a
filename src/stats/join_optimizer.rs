use std::collections::{BTreeSet, HashMap};

use crate::{
    error::{DbError, DbResult},
    predicate::Op,
    stats::{get_io_cost_per_page, TableStats},
};

/// One join predicate between two base tables:
/// `left_table.left_field <op> right_table.right_field`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinNode {
    pub left_table: String,
    pub left_field: usize,
    pub right_table: String,
    pub right_field: usize,
    pub op: Op,
}

impl JoinNode {
    pub fn new(left_table: &str, left_field: usize, right_table: &str, right_field: usize, op: Op) -> Self {
        Self {
            left_table: left_table.to_string(),
            left_field,
            right_table: right_table.to_string(),
            right_field,
            op,
        }
    }
}

#[derive(Clone)]
struct SubPlan {
    cost: f64,
    cardinality: usize,
    table_order: Vec<String>,
}

/// Cost-based ordering of joins into a left-deep plan under a simple
/// nested-loop model: the left-most table contributes its scan cost, and
/// every join contributes `card(left) * card(right) * io_cost`.
pub struct JoinOptimizer;

impl JoinOptimizer {
    /// Arrange the given join predicates into the cheapest left-deep
    /// order. `filter_selectivities` carries the selectivity of local
    /// filters per table (1.0 when absent).
    ///
    /// Enumerates table subsets bottom-up, memoizing the best plan per
    /// subset. A predicate only contributes once both its tables are in
    /// the subset; until then it is deferred.
    pub fn order_joins(
        stats: &HashMap<String, TableStats>,
        filter_selectivities: &HashMap<String, f64>,
        joins: &[JoinNode],
    ) -> DbResult<Vec<JoinNode>> {
        if joins.is_empty() {
            return Ok(Vec::new());
        }

        let mut tables = BTreeSet::new();
        for j in joins {
            tables.insert(j.left_table.clone());
            tables.insert(j.right_table.clone());
        }
        let tables: Vec<String> = tables.into_iter().collect();
        for t in &tables {
            if !stats.contains_key(t) {
                return Err(DbError::NoSuchTable(format!("no statistics for {}", t)));
            }
        }

        let base_card = |t: &str| -> usize {
            let selectivity = filter_selectivities.get(t).copied().unwrap_or(1.0);
            stats[t].estimate_table_cardinality(selectivity).max(1)
        };

        // best plan per subset of tables, keyed by the sorted subset
        let mut memo: HashMap<BTreeSet<String>, SubPlan> = HashMap::new();

        for t in &tables {
            let mut key = BTreeSet::new();
            key.insert(t.clone());
            memo.insert(
                key,
                SubPlan {
                    cost: stats[t].estimate_scan_cost(),
                    cardinality: base_card(t),
                    table_order: vec![t.clone()],
                },
            );
        }

        for size in 2..=tables.len() {
            for subset in subsets(&tables, size) {
                let mut best: Option<SubPlan> = None;

                for joined in &subset {
                    // left-deep: the new table joins the best plan of the
                    // rest
                    let mut rest = subset.clone();
                    rest.remove(joined);

                    // the new table must connect to the rest through some
                    // predicate, or the join degenerates to a cross
                    // product and is considered last
                    let connecting: Vec<&JoinNode> = joins
                        .iter()
                        .filter(|j| {
                            (j.left_table == *joined && rest.contains(&j.right_table))
                                || (j.right_table == *joined && rest.contains(&j.left_table))
                        })
                        .collect();

                    let sub = match memo.get(&rest) {
                        Some(sub) => sub.clone(),
                        None => continue,
                    };

                    let right_card = base_card(joined);
                    let cost = sub.cost
                        + (sub.cardinality as f64)
                            * (right_card as f64)
                            * get_io_cost_per_page() as f64;

                    let cardinality =
                        Self::estimate_join_cardinality(&connecting, sub.cardinality, right_card);

                    if best.as_ref().map_or(true, |b| cost < b.cost) {
                        let mut table_order = sub.table_order.clone();
                        table_order.push(joined.clone());
                        best = Some(SubPlan {
                            cost,
                            cardinality,
                            table_order,
                        });
                    }
                }

                if let Some(best) = best {
                    memo.insert(subset, best);
                }
            }
        }

        let full: BTreeSet<String> = tables.iter().cloned().collect();
        let plan = memo
            .remove(&full)
            .ok_or_else(|| DbError::NoSuchTable("no join plan found".to_string()))?;

        Ok(Self::emit_join_order(&plan.table_order, joins))
    }

    /// Cardinality of joining two sides: equality joins keep the larger
    /// side, range joins a fixed fraction of the cross product, and a
    /// cross product everything.
    fn estimate_join_cardinality(
        connecting: &[&JoinNode],
        left_card: usize,
        right_card: usize,
    ) -> usize {
        if connecting.is_empty() {
            return left_card.saturating_mul(right_card);
        }
        let mut card = if connecting.iter().any(|j| j.op == Op::Equals) {
            left_card.max(right_card)
        } else {
            ((left_card as f64) * (right_card as f64) * 0.3) as usize
        };
        if card == 0 {
            card = 1;
        }
        card
    }

    /// Order the predicates by the point at which both their tables have
    /// entered the left-deep plan.
    fn emit_join_order(table_order: &[String], joins: &[JoinNode]) -> Vec<JoinNode> {
        let position: HashMap<&str, usize> = table_order
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        let mut ordered: Vec<&JoinNode> = joins.iter().collect();
        ordered.sort_by_key(|j| {
            let l = position.get(j.left_table.as_str()).copied().unwrap_or(usize::MAX);
            let r = position.get(j.right_table.as_str()).copied().unwrap_or(usize::MAX);
            l.max(r)
        });
        ordered.into_iter().cloned().collect()
    }
}

/// All subsets of the given size, as sorted sets.
fn subsets(tables: &[String], size: usize) -> Vec<BTreeSet<String>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    subsets_rec(tables, size, 0, &mut current, &mut out);
    out
}

fn subsets_rec(
    tables: &[String],
    size: usize,
    start: usize,
    current: &mut Vec<String>,
    out: &mut Vec<BTreeSet<String>>,
) {
    if current.len() == size {
        out.push(current.iter().cloned().collect());
        return;
    }
    for i in start..tables.len() {
        current.push(tables[i].clone());
        subsets_rec(tables, size, i + 1, current, out);
        current.pop();
    }
}
