mod test_utils;

use std::thread;

use serial_test::serial;

use minidb::{
    page::{PageCategory, PageId},
    transaction::Permission,
    utils::HandyRwLock,
    BufferPool, Database, DbError, Transaction, Tuple,
};

use test_utils::{new_heap_table, populate_heap_table, setup};

fn count_tuples(table_rc: &std::sync::Arc<std::sync::RwLock<minidb::HeapTable>>) -> usize {
    let tx = Transaction::new();
    let table = table_rc.rl();
    let mut it = table.iter(&tx);
    it.open();
    let count = it.by_ref().count();
    it.close();
    drop(table);
    tx.commit().unwrap();
    count
}

#[test]
#[serial]
fn test_abort_undoes_insert() {
    setup();

    let table_rc = new_heap_table("tx_abort", 2);
    populate_heap_table(&table_rc, &[1, 2], 2);

    let tx = Transaction::new();
    let table_id = table_rc.rl().get_id();
    Database::buffer_pool()
        .insert_tuple(&tx, table_id, &Tuple::new_int_tuple(99, 2))
        .unwrap();

    // the inserting transaction sees its own write
    {
        let table = table_rc.rl();
        let mut it = table.iter(&tx);
        it.open();
        assert_eq!(it.by_ref().count(), 3);
        it.close();
    }

    tx.abort().unwrap();

    // a fresh transaction must not
    assert_eq!(count_tuples(&table_rc), 2);
}

#[test]
#[serial]
fn test_abort_undoes_delete() {
    setup();

    let table_rc = new_heap_table("tx_abort_delete", 2);
    populate_heap_table(&table_rc, &[1, 2, 3], 2);

    let tx = Transaction::new();
    {
        let table = table_rc.rl();
        let mut it = table.iter(&tx);
        it.open();
        let victim = it.by_ref().next().unwrap();
        it.close();
        Database::buffer_pool().delete_tuple(&tx, &victim).unwrap();
    }
    tx.abort().unwrap();

    assert_eq!(count_tuples(&table_rc), 3);
}

#[test]
#[serial]
fn test_commit_makes_writes_durable() {
    setup();

    let table_rc = new_heap_table("tx_commit", 2);
    populate_heap_table(&table_rc, &[5], 2);

    // drop every cached page; the data must come back from disk
    Database::buffer_pool().clear();

    assert_eq!(count_tuples(&table_rc), 1);
}

#[test]
#[serial]
fn test_last_committer_wins() {
    setup();

    let table_rc = new_heap_table("tx_order", 2);
    populate_heap_table(&table_rc, &[1], 2);
    populate_heap_table(&table_rc, &[2], 2);

    Database::buffer_pool().clear();
    assert_eq!(count_tuples(&table_rc), 2);
}

#[test]
#[serial]
fn test_no_steal_eviction_fails_on_all_dirty() {
    setup();
    BufferPool::set_capacity(1);

    let a_rc = new_heap_table("tx_nosteal_a", 2);
    let b_rc = new_heap_table("tx_nosteal_b", 2);

    let t1 = Transaction::new();
    Database::buffer_pool()
        .insert_tuple(&t1, a_rc.rl().get_id(), &Tuple::new_int_tuple(1, 2))
        .unwrap();

    // the only frame is dirty and uncommitted: the second transaction
    // cannot load its page
    let t2 = Transaction::new();
    let res = Database::buffer_pool().insert_tuple(&t2, b_rc.rl().get_id(), &Tuple::new_int_tuple(2, 2));
    assert!(matches!(res, Err(DbError::BufferFull(_))));

    t2.abort().unwrap();
    t1.commit().unwrap();

    // after the commit the frame is clean and evictable again
    assert_eq!(count_tuples(&b_rc), 0);
    assert_eq!(count_tuples(&a_rc), 1);
}

#[test]
#[serial]
fn test_eviction_skips_dirty_pages() {
    setup();
    BufferPool::set_capacity(2);

    let a_rc = new_heap_table("tx_evict_a", 2);
    let b_rc = new_heap_table("tx_evict_b", 2);
    let c_rc = new_heap_table("tx_evict_c", 2);

    let t1 = Transaction::new();
    Database::buffer_pool()
        .insert_tuple(&t1, a_rc.rl().get_id(), &Tuple::new_int_tuple(7, 2))
        .unwrap();

    // churn pages of two other tables through the remaining frame; only
    // the clean one is ever evicted and the dirty page survives
    for v in 0..10 {
        let t2 = Transaction::new();
        let target = if v % 2 == 0 { &b_rc } else { &c_rc };
        Database::buffer_pool()
            .insert_tuple(&t2, target.rl().get_id(), &Tuple::new_int_tuple(v, 2))
            .unwrap();
        t2.commit().unwrap();
    }
    t1.commit().unwrap();

    assert_eq!(count_tuples(&a_rc), 1);
    assert_eq!(count_tuples(&b_rc), 5);
    assert_eq!(count_tuples(&c_rc), 5);
}

#[test]
#[serial]
fn test_holds_lock_after_get_page() {
    setup();

    let table_rc = new_heap_table("tx_locks", 2);
    populate_heap_table(&table_rc, &[1], 2);

    let tx = Transaction::new();
    let pid = PageId::new(PageCategory::Heap, table_rc.rl().get_id(), 0);
    Database::buffer_pool()
        .get_heap_page(&tx, Permission::ReadOnly, &pid)
        .unwrap();
    assert!(Database::lock_manager().holds_lock(&tx, &pid));

    tx.commit().unwrap();
    assert!(!Database::lock_manager().holds_lock(&tx, &pid));
}

#[test]
#[serial]
fn test_concurrent_committed_inserts_all_visible() {
    setup();

    let table_rc = new_heap_table("tx_concurrent", 2);
    let table_id = table_rc.rl().get_id();

    let threads = 4;
    let per_thread = 25;
    let mut handles = Vec::new();
    for t in 0..threads {
        handles.push(thread::spawn(move || {
            for i in 0..per_thread {
                let tx = Transaction::new();
                let tuple = Tuple::new_int_tuple(t * per_thread + i, 2);
                Database::buffer_pool()
                    .insert_tuple(&tx, table_id, &tuple)
                    .unwrap();
                tx.commit().unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(count_tuples(&table_rc), (threads * per_thread) as usize);
}
