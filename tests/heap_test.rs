//! Integration tests for the page list and string heap collections

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pagestore::buffer::PageManager;
use pagestore::common::{StorageConfig, StoreError, TransactionId};
use pagestore::heap::{PageListCollection, StringHeapCollection};
use pagestore::transaction::{LockingTransaction, PageLockManager, Transaction};
use pagestore::tuple::{ColumnInfo, ColumnSchema, RowHolder, RowsetHolder, Value};
use tempfile::NamedTempFile;

fn create_manager(page_size: usize) -> Arc<PageManager> {
    Arc::new(PageManager::in_memory(StorageConfig::default().with_page_size(page_size)).unwrap())
}

fn create_locks() -> Arc<PageLockManager> {
    Arc::new(PageLockManager::new(Duration::from_secs(2)))
}

fn create_schema() -> Arc<ColumnSchema> {
    Arc::new(ColumnSchema::new(vec![
        ColumnInfo::int(),
        ColumnInfo::double(),
        ColumnInfo::string_pointer(),
    ]))
}

#[test]
fn test_string_heap_round_trip() {
    let manager = create_manager(4096);
    let tran = LockingTransaction::new(TransactionId::new(1), create_locks());
    let heap = StringHeapCollection::create(manager, &tran).unwrap();

    let pointer = heap.add(b"one", &tran).unwrap();
    assert_eq!(heap.fetch(pointer, &tran).unwrap(), b"one".to_vec());
}

#[test]
fn test_rows_reference_strings() {
    let manager = create_manager(256);
    let tran = LockingTransaction::new(TransactionId::new(1), create_locks());
    let schema = create_schema();
    let list = PageListCollection::create(manager.clone(), Arc::clone(&schema), &tran).unwrap();
    let heap = StringHeapCollection::create(manager, &tran).unwrap();

    for i in 0..200 {
        let name = format!("row number {}", i);
        let pointer = heap.add(name.as_bytes(), &tran).unwrap();
        let mut row = RowHolder::new(Arc::clone(&schema));
        row.set_int(0, i);
        row.set_double(1, i as f64);
        row.set_string_pointer(2, pointer);
        list.add(&row, &tran).unwrap();
    }

    let names: Vec<String> = list
        .iter(&tran)
        .map(|row| {
            let pointer = row.unwrap().get_string_pointer(2);
            String::from_utf8(heap.fetch(pointer, &tran).unwrap()).unwrap()
        })
        .collect();
    assert_eq!(names.len(), 200);
    assert_eq!(names[0], "row number 0");
    assert_eq!(names[199], "row number 199");
}

#[test]
fn test_page_list_queries() {
    let manager = create_manager(512);
    let tran = LockingTransaction::new(TransactionId::new(1), create_locks());
    let schema = Arc::new(ColumnSchema::new(vec![ColumnInfo::int(), ColumnInfo::double()]));
    let list = PageListCollection::create(manager, Arc::clone(&schema), &tran).unwrap();

    let rows: Vec<_> = (0..1000)
        .map(|i| RowHolder::from_values(Arc::clone(&schema), &[Value::Int(i), Value::Double(-i as f64)]).unwrap())
        .collect();
    let rowset = RowsetHolder::from_rows(Arc::clone(&schema), &rows).unwrap();
    list.add_rowset(&rowset, &tran).unwrap();

    assert_eq!(list.count(&tran).unwrap(), 1000);
    assert_eq!(list.max(|row| row.get_int(0), i32::MIN, &tran).unwrap(), 999);
    assert_eq!(list.max(|row| row.get_double(1), f64::MIN, &tran).unwrap(), 0.0);

    let hits: Vec<i32> = list
        .where_(|row| row.get_int(0) % 100 == 0, &tran)
        .map(|row| row.unwrap().get_int(0))
        .collect();
    assert_eq!(hits, (0..10).map(|i| i * 100).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_page_list_writers() {
    let manager = create_manager(256);
    let locks = create_locks();
    let schema = Arc::new(ColumnSchema::new(vec![ColumnInfo::int()]));
    let setup = LockingTransaction::new(TransactionId::new(1), Arc::clone(&locks));
    let list = Arc::new(PageListCollection::create(manager, Arc::clone(&schema), &setup).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let list = Arc::clone(&list);
            let locks = Arc::clone(&locks);
            let schema = Arc::clone(&schema);
            thread::spawn(move || {
                let tran = LockingTransaction::new(TransactionId::new(10 + t), locks);
                for i in 0..250 {
                    let key = (t as i32) * 1000 + i;
                    let row = RowHolder::from_values(Arc::clone(&schema), &[Value::Int(key)]).unwrap();
                    list.add(&row, &tran).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut keys: Vec<i32> = list.iter(&setup).map(|row| row.unwrap().get_int(0)).collect();
    keys.sort_unstable();
    let expected: Vec<i32> = (0..4).flat_map(|t| (0..250).map(move |i| t * 1000 + i)).collect();
    assert_eq!(keys, expected);
}

#[test]
fn test_heap_reopen_from_file() {
    let temp = NamedTempFile::new().unwrap();
    let config = StorageConfig::default().with_page_size(256);
    let tran = LockingTransaction::new(TransactionId::new(1), create_locks());

    let (root, pointers) = {
        let manager = Arc::new(PageManager::open_file(temp.path(), config.clone()).unwrap());
        let heap = StringHeapCollection::create(manager.clone(), &tran).unwrap();
        let pointers: Vec<_> = (0..50)
            .map(|i| heap.add(format!("value {}", i).as_bytes(), &tran).unwrap())
            .collect();
        manager.checkpoint().unwrap();
        (heap.root_page_id(), pointers)
    };

    let manager = Arc::new(PageManager::open_file(temp.path(), config).unwrap());
    let heap = StringHeapCollection::open(manager, root);
    for (i, pointer) in pointers.into_iter().enumerate() {
        assert_eq!(heap.fetch(pointer, &tran).unwrap(), format!("value {}", i).into_bytes());
    }
}

#[test]
fn test_finished_transaction_is_rejected() {
    let manager = create_manager(4096);
    let tran = LockingTransaction::new(TransactionId::new(1), create_locks());
    let heap = StringHeapCollection::create(manager.clone(), &tran).unwrap();
    let schema = Arc::new(ColumnSchema::new(vec![ColumnInfo::int()]));
    let list = PageListCollection::create(manager, Arc::clone(&schema), &tran).unwrap();
    tran.rollback().unwrap();

    assert!(matches!(heap.add(b"late", &tran), Err(StoreError::LockError(_))));
    let row = RowHolder::from_values(schema, &[Value::Int(1)]).unwrap();
    assert!(matches!(list.add(&row, &tran), Err(StoreError::LockError(_))));
    assert!(matches!(list.count(&tran), Err(StoreError::LockError(_))));
}
