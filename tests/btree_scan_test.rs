mod test_utils;

use serial_test::serial;

use minidb::{utils::HandyRwLock, BufferPool, Cell, Op, Transaction};

use test_utils::{entry, new_btree_table, populate_btree_table, setup};

#[test]
#[serial]
fn test_search_operators() {
    setup();

    let table_rc = new_btree_table("btree_search");
    let table = table_rc.rl();

    let tx = Transaction::new();
    // keys 0, 10, 20, ..., 90 plus duplicates of 50
    for i in 0..10 {
        table.insert_entry(&tx, &entry(&table, i * 10, i as usize)).unwrap();
    }
    table.insert_entry(&tx, &entry(&table, 50, 100)).unwrap();
    table.insert_entry(&tx, &entry(&table, 50, 101)).unwrap();

    let count = |op: Op, key: i32| table.search(&tx, op, &Cell::Int(key)).count();

    assert_eq!(count(Op::Equals, 50), 3);
    assert_eq!(count(Op::Equals, 55), 0);
    assert_eq!(count(Op::GreaterThan, 50), 4);
    assert_eq!(count(Op::GreaterThanOrEq, 50), 7);
    assert_eq!(count(Op::LessThan, 50), 5);
    assert_eq!(count(Op::LessThanOrEq, 50), 8);
    assert_eq!(count(Op::NotEquals, 50), 9);

    drop(table);
    tx.commit().unwrap();
}

#[test]
#[serial]
fn test_search_crosses_leaf_boundaries() {
    setup();
    BufferPool::set_page_size(1024);
    BufferPool::set_capacity(1000);

    let table_rc = new_btree_table("btree_search_wide");
    populate_btree_table(&table_rc, 2000);

    let table = table_rc.rl();
    let tx = Transaction::new();

    let all: Vec<i32> = table
        .iter(&tx)
        .map(|e| e.get_key().get_int().unwrap())
        .collect();
    let median = all[all.len() / 2];

    let expected = all.iter().filter(|k| **k >= median).count();
    let found = table.search(&tx, Op::GreaterThanOrEq, &Cell::Int(median)).count();
    assert_eq!(found, expected);

    let expected = all.iter().filter(|k| **k < median).count();
    let found = table.search(&tx, Op::LessThan, &Cell::Int(median)).count();
    assert_eq!(found, expected);

    drop(table);
    tx.commit().unwrap();
}

#[test]
#[serial]
fn test_reverse_iteration() {
    setup();

    let table_rc = new_btree_table("btree_reverse");
    let keys = populate_btree_table(&table_rc, 500);

    let table = table_rc.rl();
    let tx = Transaction::new();

    let mut backwards: Vec<i32> = table
        .iter(&tx)
        .rev()
        .map(|e| e.get_key().get_int().unwrap())
        .collect();
    backwards.reverse();
    assert_eq!(backwards, keys);

    drop(table);
    tx.commit().unwrap();
}
