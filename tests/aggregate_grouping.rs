mod common;

use graphcore_db::exec::{AggFunc, Aggregate, ExecContext, PhysicalOperator};
use graphcore_db::value::Value;
use graphcore_db::GraphResult;

struct FixedRows(std::vec::IntoIter<Vec<Value>>);

impl PhysicalOperator for FixedRows {
    fn get_next_tuple(&mut self, _ctx: &ExecContext, out: &mut Vec<Vec<Value>>) -> GraphResult<bool> {
        match self.0.next() {
            Some(row) => {
                out.push(row);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn ctx() -> ExecContext {
    ExecContext::new(std::rc::Rc::new(std::cell::RefCell::new(graphcore_db::local::LocalStore::new())))
}

#[test]
fn count_and_avg_are_grouped_independently_per_key() {
    common::init_logging();
    // simulates an unflat grouping key fanned out by a preceding Extend: each
    // row here is (group_label, value), as if the key vector had been
    // un-flattened across several neighbor rows per bound node.
    let rows = FixedRows(
        vec![
            vec![Value::String("Alice".into()), Value::Int64(10)],
            vec![Value::String("Alice".into()), Value::Int64(20)],
            vec![Value::String("Alice".into()), Value::Int64(30)],
            vec![Value::String("Bob".into()), Value::Int64(100)],
        ]
        .into_iter(),
    );

    let mut agg = Aggregate::new(Box::new(rows), vec![0], vec![(AggFunc::Count, 1), (AggFunc::Avg, 1)]);
    let mut out = Vec::new();
    let ctx = ctx();
    agg.get_next_tuple(&ctx, &mut out).unwrap();
    assert_eq!(out.len(), 2);

    let alice = out.iter().find(|r| r[0] == Value::String("Alice".into())).unwrap();
    assert_eq!(alice[1], Value::Int64(3));
    assert_eq!(alice[2], Value::Double(20.0));

    let bob = out.iter().find(|r| r[0] == Value::String("Bob".into())).unwrap();
    assert_eq!(bob[1], Value::Int64(1));
    assert_eq!(bob[2], Value::Double(100.0));
}

#[test]
fn min_max_ignore_null_inputs() {
    common::init_logging();
    let rows = FixedRows(
        vec![
            vec![Value::String("g".into()), Value::Int64(5)],
            vec![Value::String("g".into()), Value::Null],
            vec![Value::String("g".into()), Value::Int64(1)],
        ]
        .into_iter(),
    );
    let mut agg = Aggregate::new(Box::new(rows), vec![0], vec![(graphcore_db::exec::AggFunc::Min, 1), (graphcore_db::exec::AggFunc::Max, 1)]);
    let mut out = Vec::new();
    let ctx = ctx();
    agg.get_next_tuple(&ctx, &mut out).unwrap();
    assert_eq!(out[0][1], Value::Double(1.0));
    assert_eq!(out[0][2], Value::Double(5.0));
}
