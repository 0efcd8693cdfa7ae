//! The pool under concurrent use from worker threads

use kiln_db::{Adapter, DbError, DuckDbBackend};
use std::sync::Arc;
use std::thread;

#[test]
fn test_workers_never_exceed_the_cap() {
    let threads = 4;
    let adapter = Arc::new(Adapter::new(
        Arc::new(DuckDbBackend::in_memory().unwrap()),
        threads,
    ));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let adapter = Arc::clone(&adapter);
            thread::spawn(move || {
                for round in 0..10 {
                    let mut conn = adapter.acquire(&format!("worker_{}_{}", i, round)).unwrap();
                    adapter.execute(&mut conn, "select 1").unwrap();
                    conn.commit().unwrap();
                    adapter.release(conn);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(adapter.pool().allocated() <= threads);
    assert!(adapter.cleanup().is_empty());
    assert_eq!(adapter.pool().allocated(), 0);
}

#[test]
fn test_exhaustion_is_immediate() {
    let adapter = Adapter::new(Arc::new(DuckDbBackend::in_memory().unwrap()), 0);
    let a = adapter.acquire("a").unwrap();
    let b = adapter.acquire("b").unwrap();
    match adapter.acquire("c") {
        Err(DbError::PoolExhausted { name, max }) => {
            assert_eq!(name, "c");
            assert_eq!(max, 2);
        }
        other => panic!("expected pool exhaustion, got {:?}", other.map(|c| c.name().to_string())),
    }
    adapter.release(a);
    adapter.release(b);
}
