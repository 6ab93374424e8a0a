use std::fmt;

use crate::storage::{cell::Cell, tuple::Tuple};

/// Comparison operators available to predicates, index searches and the
/// selectivity estimator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Op {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
}

impl Op {
    pub fn apply(&self, left: &Cell, right: &Cell) -> bool {
        match self {
            Op::Equals => left == right,
            Op::NotEquals => left != right,
            Op::GreaterThan => left > right,
            Op::GreaterThanOrEq => left >= right,
            Op::LessThan => left < right,
            Op::LessThanOrEq => left <= right,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Op::Equals => "=",
            Op::NotEquals => "<>",
            Op::GreaterThan => ">",
            Op::GreaterThanOrEq => ">=",
            Op::LessThan => "<",
            Op::LessThanOrEq => "<=",
        };
        write!(f, "{}", s)
    }
}

/// `field <op> operand` over one column of a tuple.
pub struct Predicate {
    pub field_index: usize,
    pub op: Op,
    pub operand: Cell,
}

impl Predicate {
    pub fn new(field_index: usize, op: Op, operand: &Cell) -> Self {
        Self {
            field_index,
            op,
            operand: operand.clone(),
        }
    }

    pub fn filter(&self, tuple: &Tuple) -> bool {
        self.op.apply(&tuple.get_cell(self.field_index), &self.operand)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "f{} {} {}", self.field_index, self.op, self.operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_apply() {
        let a = Cell::Int(3);
        let b = Cell::Int(5);
        assert!(Op::LessThan.apply(&a, &b));
        assert!(Op::NotEquals.apply(&a, &b));
        assert!(!Op::GreaterThanOrEq.apply(&a, &b));
        assert!(Op::Equals.apply(&a, &Cell::Int(3)));
    }

    #[test]
    fn test_predicate_filter() {
        let t = Tuple::new_int_tuple(7, 2);
        let p = Predicate::new(1, Op::GreaterThan, &Cell::Int(5));
        assert!(p.filter(&t));
        let p = Predicate::new(0, Op::Equals, &Cell::Int(8));
        assert!(!p.filter(&t));
    }
}
