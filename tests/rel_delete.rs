mod common;

use graphcore_db::csr::Direction;
use graphcore_db::database::Connection;
use graphcore_db::exec::{DeleteRel, Extend, InsertNode, InsertRel, PhysicalOperator, ScanNodeTable};
use graphcore_db::value::Value;

fn rows(values: Vec<Vec<Value>>) -> Box<dyn PhysicalOperator> {
    struct FixedRows(std::vec::IntoIter<Vec<Value>>);
    impl PhysicalOperator for FixedRows {
        fn get_next_tuple(
            &mut self,
            _ctx: &graphcore_db::exec::ExecContext,
            out: &mut Vec<Vec<Value>>,
        ) -> graphcore_db::GraphResult<bool> {
            match self.0.next() {
                Some(row) => {
                    out.push(row);
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }
    Box::new(FixedRows(values.into_iter()))
}

#[test]
fn deleting_one_directed_edge_leaves_the_other_direction_and_reverse_edge_intact() {
    let (_dir, db) = common::open_fixture_db();
    let person = db.node_table("Person").unwrap();
    let knows = db.rel_table("Knows").unwrap();

    {
        let conn = Connection::begin_write(&db).unwrap();
        conn.execute(Box::new(InsertNode::new(
            person.clone(),
            "Person",
            0,
            rows(vec![
                vec![Value::Int64(1), Value::String("Alice".into())],
                vec![Value::Int64(2), Value::String("Bob".into())],
                vec![Value::Int64(3), Value::String("Carol".into())],
            ]),
            false,
        )))
        .unwrap();
        conn.commit().unwrap();
    }

    {
        let conn = Connection::begin_write(&db).unwrap();
        // offsets 0->1 and 0->2 (Alice knows Bob, Alice knows Carol)
        conn.execute(Box::new(InsertRel::new(
            knows.clone(),
            "Knows",
            rows(vec![
                vec![Value::Int64(0), Value::Int64(1), Value::Int64(0)],
                vec![Value::Int64(0), Value::Int64(2), Value::Int64(0)],
            ]),
        )))
        .unwrap();
        conn.commit().unwrap();
    }

    // both edges visible via forward extend from Alice.
    {
        let conn = Connection::begin_read_only(&db);
        let scan = Box::new(ScanNodeTable::new(person.clone(), vec!["id".into()]));
        let extend = Box::new(Extend::new(scan, knows.clone(), Direction::Fwd, 0));
        let out = conn.query(extend).unwrap();
        let alice_neighbors: Vec<i64> = out
            .iter()
            .filter(|r| r[1] == Value::Int64(0))
            .map(|r| r[2].as_int64().unwrap())
            .collect();
        assert_eq!(alice_neighbors.len(), 2);
    }

    // delete src=0,dst=1,rel_id=0 (Alice -> Bob)
    {
        let conn = Connection::begin_write(&db).unwrap();
        conn.execute(Box::new(DeleteRel::new(
            "Knows",
            rows(vec![vec![Value::Int64(0), Value::Int64(1), Value::Int64(0)]]),
        )))
        .unwrap();
        conn.commit().unwrap();
    }

    let knows = db.rel_table("Knows").unwrap();
    let table = knows.lock().unwrap();
    let (fwd_neighbors, _) = table.csr.scan(Direction::Fwd, 0, 0);
    assert_eq!(fwd_neighbors, &[2]);

    // the reverse direction no longer has Bob -> Alice either, but Carol ->
    // Alice's backward entry is untouched.
    let (bwd_of_bob, _) = table.csr.scan(Direction::Bwd, 0, 1);
    assert!(bwd_of_bob.is_empty());
    let (bwd_of_carol, _) = table.csr.scan(Direction::Bwd, 0, 2);
    assert_eq!(bwd_of_carol, &[0]);
}
