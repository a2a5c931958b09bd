mod common;

use graphcore_db::csr::Direction;
use graphcore_db::database::Connection;
use graphcore_db::exec::{DeleteRel, ExecContext, InsertNode, InsertRel, Intersect, PhysicalOperator, ScanNodeTable};
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

fn rows(values: Vec<Vec<Value>>) -> Box<dyn PhysicalOperator> {
    Box::new(FixedRows(values.into_iter()))
}

/// Scenario 6 (spec §8): `a -[knows]-> {p1a, p1b, p1c} -[knows]-> p2`, only
/// one of the three intermediates also reaches `p2`. Sources both
/// `Intersect` inputs from the real CSR adjacency rather than hand-built
/// rows, then deletes the identified edge and confirms only its weight
/// disappears.
#[test]
fn intersecting_real_neighbor_lists_narrows_to_the_shared_intermediate_node() {
    let (_dir, db) = common::open_fixture_db();
    let person = db.node_table("Person").unwrap();
    let knows = db.rel_table("Knows").unwrap();

    // a -[knows]-> {p1a, p1b, p1c} -[knows]-> p2, but only p1a also reaches
    // p2 (spec §8 scenario 6's topology).
    {
        let conn = Connection::begin_write(&db).unwrap();
        conn.execute(Box::new(InsertNode::new(
            person.clone(),
            "Person",
            0,
            rows(vec![
                vec![Value::Int64(0), Value::String("a".into())],
                vec![Value::Int64(1), Value::String("p1a".into())],
                vec![Value::Int64(2), Value::String("p1b".into())],
                vec![Value::Int64(3), Value::String("p1c".into())],
                vec![Value::Int64(4), Value::String("p2".into())],
            ]),
            false,
        )))
        .unwrap();
        conn.commit().unwrap();
    }
    {
        let conn = Connection::begin_write(&db).unwrap();
        conn.execute(Box::new(InsertRel::new(
            knows.clone(),
            "Knows",
            rows(vec![
                vec![Value::Int64(0), Value::Int64(1), Value::Int64(10)],  // a -> p1a, w=10
                vec![Value::Int64(0), Value::Int64(2), Value::Int64(20)],  // a -> p1b, w=20
                vec![Value::Int64(0), Value::Int64(3), Value::Int64(30)],  // a -> p1c, w=30
                vec![Value::Int64(1), Value::Int64(4), Value::Int64(100)], // p1a -> p2, w=100
            ]),
        )))
        .unwrap();
        conn.commit().unwrap();
    }

    // a's real forward neighbors and p2's real backward neighbors, each
    // through the actual CSR adjacency rather than a hand-built set.
    let a_offset = 0u64;
    let p2_offset = 4u64;
    let (a_fwd_neighbors, a_fwd_rel_ids) = {
        let table = knows.lock().unwrap();
        let (n, r) = table.csr.scan(Direction::Fwd, 0, a_offset as usize);
        (n.to_vec(), r.to_vec())
    };
    let p2_bwd_neighbors = {
        let table = knows.lock().unwrap();
        let (n, _) = table.csr.scan(Direction::Bwd, 0, p2_offset as usize);
        n.to_vec()
    };
    assert_eq!(a_fwd_neighbors, vec![1, 2, 3]);
    assert_eq!(p2_bwd_neighbors, vec![1]);

    // feed both real neighbor lists into the actual Intersect operator,
    // tagged with the same query key so they land in one bucket (spec §4.H).
    let left = rows(a_fwd_neighbors
        .iter()
        .map(|&n| vec![Value::String("a-to-p2".into()), Value::Int64(n as i64)])
        .collect());
    let right = rows(p2_bwd_neighbors
        .iter()
        .map(|&n| vec![Value::String("a-to-p2".into()), Value::Int64(n as i64)])
        .collect());
    let conn = Connection::begin_read_only(&db);
    let intersect = Intersect::new(vec![left, right], 0, 1);
    let common = conn.query(Box::new(intersect)).unwrap();
    let common_ids: Vec<i64> = common.iter().map(|r| r[1].as_int64().unwrap()).collect();
    assert_eq!(common_ids, vec![1]);

    // p1a (offset 1) is the only intermediate reaching p2; find the rel_id
    // of a's edge into it and delete exactly that one edge.
    let target_rel_id = a_fwd_neighbors
        .iter()
        .zip(a_fwd_rel_ids.iter())
        .find(|&(&dst, _)| dst == 1)
        .map(|(_, &rel_id)| rel_id)
        .unwrap();

    {
        let conn = Connection::begin_write(&db).unwrap();
        conn.execute(Box::new(DeleteRel::new(
            "Knows",
            rows(vec![vec![Value::Int64(a_offset as i64), Value::Int64(1), Value::Int64(target_rel_id as i64)]]),
        )))
        .unwrap();
        conn.commit().unwrap();
    }

    // the deleted edge's weight (10) is gone; the other two (20, 30) remain.
    let table = knows.lock().unwrap();
    let remaining_neighbors = table.csr.scan(Direction::Fwd, 0, a_offset as usize).0.to_vec();
    let remaining_weights = table.csr.property_slice(Direction::Fwd, 0, a_offset as usize, "weight").unwrap();
    assert_eq!(remaining_neighbors, vec![2, 3]);
    assert_eq!(remaining_weights, &[20, 30]);

    // sanity: ScanNodeTable still sees every node untouched by the rel delete.
    let scan = Box::new(ScanNodeTable::new(person, vec!["id".into()]));
    let people = conn.query(scan).unwrap();
    assert_eq!(people.len(), 5);
}

#[test]
fn intersect_keeps_only_ids_common_to_every_source_per_group() {
    common::init_logging();
    // two "friend lists" keyed by the querying person: person 1 is friends
    // with {10, 20, 30}, person 2 with {20, 30, 40}. The common friends of
    // both groups (modeled as the same key so the grouping collapses to one
    // bucket) are {20, 30}.
    let left = rows(vec![
        vec![Value::String("k".into()), Value::Int64(10)],
        vec![Value::String("k".into()), Value::Int64(20)],
        vec![Value::String("k".into()), Value::Int64(30)],
    ]);
    let right = rows(vec![
        vec![Value::String("k".into()), Value::Int64(20)],
        vec![Value::String("k".into()), Value::Int64(30)],
        vec![Value::String("k".into()), Value::Int64(40)],
    ]);

    let mut intersect = Intersect::new(vec![left, right], 0, 1);
    let ctx = ExecContext::new(std::rc::Rc::new(std::cell::RefCell::new(graphcore_db::local::LocalStore::new())));
    let mut out = Vec::new();
    intersect.get_next_tuple(&ctx, &mut out).unwrap();

    let mut ids: Vec<i64> = out.iter().map(|r| r[1].as_int64().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, vec![20, 30]);
}

#[test]
fn intersect_with_three_sources_narrows_further() {
    common::init_logging();
    let a = rows(vec![
        vec![Value::String("k".into()), Value::Int64(1)],
        vec![Value::String("k".into()), Value::Int64(2)],
        vec![Value::String("k".into()), Value::Int64(3)],
    ]);
    let b = rows(vec![
        vec![Value::String("k".into()), Value::Int64(2)],
        vec![Value::String("k".into()), Value::Int64(3)],
    ]);
    let c = rows(vec![vec![Value::String("k".into()), Value::Int64(3)]]);

    let mut intersect = Intersect::new(vec![a, b, c], 0, 1);
    let ctx = ExecContext::new(std::rc::Rc::new(std::cell::RefCell::new(graphcore_db::local::LocalStore::new())));
    let mut out = Vec::new();
    intersect.get_next_tuple(&ctx, &mut out).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0][1], Value::Int64(3));
}
