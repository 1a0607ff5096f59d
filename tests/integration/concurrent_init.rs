use revfs::atomic::{AtomicInit, AtomicStatus, InitOnce};
use revfs::error::InitError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, OnceLock};
use std::thread;
use std::time::Duration;

static TABLE_INIT: InitOnce = AtomicInit::new();
static TABLE: OnceLock<Vec<String>> = OnceLock::new();
static RUNS: AtomicUsize = AtomicUsize::new(0);

fn message_table() -> Result<&'static [String], InitError> {
    TABLE_INIT.init_once(|| {
        RUNS.fetch_add(1, Ordering::SeqCst);
        // Long enough that the other threads see Initializing and poll.
        thread::sleep(Duration::from_millis(20));
        let _ = TABLE.set((0..8).map(|i| format!("message {}", i)).collect());
        Ok(())
    })?;
    TABLE
        .get()
        .map(Vec::as_slice)
        .ok_or_else(|| InitError::Failed("table missing".to_string()))
}

#[test]
fn lazy_global_is_built_once_under_contention() {
    let barrier = Arc::new(Barrier::new(12));
    let handles: Vec<_> = (0..12)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                message_table().unwrap().len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 8);
    }
    assert_eq!(RUNS.load(Ordering::SeqCst), 1);
    assert_eq!(TABLE_INIT.status(), AtomicStatus::Initialized);
}

#[test]
fn failure_is_replayed_to_late_callers() {
    let init: Arc<AtomicInit<InitError>> = Arc::new(AtomicInit::new());
    let first = init.init_once(|| Err(InitError::Failed("disk on fire".to_string())));
    assert_eq!(first, Err(InitError::Failed("disk on fire".to_string())));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let init = init.clone();
            thread::spawn(move || init.init_once(|| Ok(())))
        })
        .collect();
    for handle in handles {
        assert_eq!(
            handle.join().unwrap(),
            Err(InitError::Failed("disk on fire".to_string()))
        );
    }
    assert_eq!(init.status(), AtomicStatus::Failed);
}

#[test]
fn global_config_loads_once() {
    let first = revfs::config::global().map(|c| c as *const _);
    let second = revfs::config::global().map(|c| c as *const _);
    assert_eq!(first, second);
}
