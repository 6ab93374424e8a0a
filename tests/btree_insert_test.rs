mod test_utils;

use serial_test::serial;

use minidb::{
    page::{PageCategory, PageId},
    transaction::Permission,
    utils::HandyRwLock,
    BufferPool, Database, Transaction,
};

use test_utils::{
    collect_keys, entry, internal_entries_cap, leaf_entries_cap, new_btree_table,
    populate_btree_table, setup,
};

#[test]
#[serial]
fn test_insert_into_empty_tree() {
    setup();

    let table_rc = new_btree_table("btree_basic");
    let table = table_rc.rl();

    let tx = Transaction::new();
    for (slot, key) in [42, 7, 19].iter().enumerate() {
        table.insert_entry(&tx, &entry(&table, *key, slot)).unwrap();
    }
    assert_eq!(collect_keys(&table, &tx), vec![7, 19, 42]);
    table.check_integrity(&tx, true);
    drop(table);
    tx.commit().unwrap();
}

#[test]
#[serial]
fn test_split_leaf_page() {
    setup();
    BufferPool::set_page_size(1024);

    let table_rc = new_btree_table("btree_leaf_split");
    let table = table_rc.rl();
    let cap = leaf_entries_cap();

    let tx = Transaction::new();
    // pack the single root leaf
    for i in 0..cap {
        table
            .insert_entry(&tx, &entry(&table, (i as i32) * 2, i))
            .unwrap();
    }
    assert_eq!(
        table.get_root_pid(&tx, Permission::ReadOnly).unwrap().category,
        PageCategory::Leaf
    );

    // one more entry in the middle of the key range forces the split
    table.insert_entry(&tx, &entry(&table, cap as i32, cap)).unwrap();

    let root_pid = table.get_root_pid(&tx, Permission::ReadOnly).unwrap();
    assert_eq!(root_pid.category, PageCategory::Internal);

    let root_rc = Database::buffer_pool()
        .get_internal_page(&tx, Permission::ReadOnly, &root_pid)
        .unwrap();
    assert_eq!(root_rc.rl().entries_count(), 1);

    // both halves hold at least half the entries, and nothing was lost
    let root_entry = root_rc.rl().iter().next().unwrap();
    let left_rc = Database::buffer_pool()
        .get_leaf_page(&tx, Permission::ReadOnly, &root_entry.get_left_child())
        .unwrap();
    let right_rc = Database::buffer_pool()
        .get_leaf_page(&tx, Permission::ReadOnly, &root_entry.get_right_child())
        .unwrap();
    let left_count = left_rc.rl().entries_count();
    let right_count = right_rc.rl().entries_count();
    assert_eq!(left_count + right_count, cap + 1);
    assert!(left_count >= cap / 2);
    assert!(right_count >= cap / 2);

    // the separator equals the smallest key of the right page
    assert_eq!(
        root_entry.get_key(),
        right_rc.rl().iter().next().unwrap().get_key()
    );

    table.check_integrity(&tx, true);
    drop(table);
    tx.commit().unwrap();
}

#[test]
#[serial]
fn test_split_propagates_to_internal_pages() {
    setup();
    BufferPool::set_page_size(1024);
    BufferPool::set_capacity(1000);

    let table_rc = new_btree_table("btree_deep");
    let table = table_rc.rl();

    // enough ascending keys to overflow the root internal page and grow
    // a third level
    let rows = (internal_entries_cap() + 2) * (leaf_entries_cap() / 2 + 1);
    let tx = Transaction::new();
    for i in 0..rows {
        table.insert_entry(&tx, &entry(&table, i as i32, i)).unwrap();
    }

    let root_pid = table.get_root_pid(&tx, Permission::ReadOnly).unwrap();
    assert_eq!(root_pid.category, PageCategory::Internal);
    let root_rc = Database::buffer_pool()
        .get_internal_page(&tx, Permission::ReadOnly, &root_pid)
        .unwrap();
    assert_eq!(
        root_rc.rl().get_child_category(),
        PageCategory::Internal,
        "expected a three-level tree"
    );

    assert_eq!(table.entries_count(&tx), rows);
    let keys = collect_keys(&table, &tx);
    assert!(keys.windows(2).all(|w| w[0] <= w[1]));

    table.check_integrity(&tx, true);
    drop(table);
    tx.commit().unwrap();
}

#[test]
#[serial]
fn test_random_inserts_stay_sorted() {
    setup();
    BufferPool::set_page_size(1024);
    BufferPool::set_capacity(1000);

    let table_rc = new_btree_table("btree_random");
    let keys = populate_btree_table(&table_rc, 5000);

    let table = table_rc.rl();
    let tx = Transaction::new();
    assert_eq!(collect_keys(&table, &tx), keys);
    table.check_integrity(&tx, true);
    drop(table);
    tx.commit().unwrap();
}

#[test]
#[serial]
fn test_empty_page_index_reuse() {
    setup();

    let table_rc = new_btree_table("btree_free_list");
    let table = table_rc.rl();
    let tx = Transaction::new();

    // a fresh table hands out page index 2 next
    let first = table.get_empty_page_index(&tx).unwrap();
    assert_eq!(first, 2);

    // free it: the next allocation must return it instead of extending
    let freed = PageId::new(PageCategory::Leaf, table.get_id(), first);
    table.set_empty_page(&tx, &freed).unwrap();
    assert_eq!(table.get_empty_page_index(&tx).unwrap(), first);

    // the free list is drained (the header page itself took an index),
    // so the next allocation extends the file
    assert!(table.get_empty_page_index(&tx).unwrap() > first);

    drop(table);
    tx.commit().unwrap();
}
