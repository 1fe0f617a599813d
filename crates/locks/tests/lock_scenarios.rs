use std::sync::Arc;
use std::thread;

use sk_locks::{Acquisition, LockManager, ResourceMask};

#[test]
fn publisher_jobs_take_turns() {
    let mgr = LockManager::new();

    let job7 = mgr.acquire(ResourceMask::PUBLISH, "publisher-job-7").unwrap();
    let Acquisition::Granted(job7_lock) = job7 else {
        panic!("job 7 should be granted");
    };

    let job8 = mgr.acquire(ResourceMask::PUBLISH, "publisher-job-8").unwrap();
    assert!(!job8.is_granted());
    assert_eq!(job8.conflicts().len(), 1);
    assert_eq!(job8.conflicts()[0].lock_id, job7_lock.lock_id);
    assert_eq!(job8.conflicts()[0].locker, "publisher-job-7");

    assert!(mgr.release(job7_lock.lock_id));

    let job9 = mgr.acquire(ResourceMask::PUBLISH, "publisher-job-9").unwrap();
    assert!(job9.is_granted());
    assert_eq!(
        mgr.current_lock(ResourceMask::PUBLISH).unwrap().unwrap().locker,
        "publisher-job-9"
    );
}

#[test]
fn granted_ids_strictly_increase() {
    let mgr = LockManager::new();
    let flags = [
        ResourceMask::PUBLISH,
        ResourceMask::IMPORT,
        ResourceMask::PUBLISH,
        ResourceMask::EXPORT,
        ResourceMask::IMPORT,
    ];

    let mut last = 0;
    for (i, flag) in flags.iter().enumerate() {
        let outcome = mgr.acquire(*flag, &format!("job-{i}")).unwrap();
        if let Some(lock) = outcome.lock() {
            assert!(lock.lock_id > last);
            last = lock.lock_id;
            // Release every other grant so later requests can succeed.
            if i % 2 == 0 {
                mgr.release(lock.lock_id);
            }
        }
    }
    assert!(last >= 3);
}

#[test]
fn concurrent_acquirers_get_exactly_one_grant() {
    let mgr = Arc::new(LockManager::new());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let mgr = mgr.clone();
            thread::spawn(move || {
                mgr.acquire(ResourceMask::REINDEX | ResourceMask::EXPORT, &format!("worker-{i}"))
                    .unwrap()
                    .is_granted()
            })
        })
        .collect();

    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|g| *g)
        .count();

    assert_eq!(granted, 1);
    assert_eq!(mgr.all_locks().len(), 1);
}

#[test]
fn held_locks_never_overlap() {
    let mgr = LockManager::new();
    let requests = [
        ResourceMask::PUBLISH | ResourceMask::IMPORT,
        ResourceMask::IMPORT | ResourceMask::EXPORT,
        ResourceMask::EXPORT,
        ResourceMask::REINDEX | ResourceMask::PUBLISH,
        ResourceMask::MAINTENANCE | ResourceMask::REINDEX,
    ];
    for (i, mask) in requests.iter().enumerate() {
        mgr.acquire(*mask, &format!("r{i}")).unwrap();
    }

    let held = mgr.all_locks();
    for (i, a) in held.iter().enumerate() {
        for b in &held[i + 1..] {
            assert!(!a.resources.intersects(b.resources));
        }
    }
}
