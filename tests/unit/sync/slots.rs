use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

#[test]
fn zero_slots_is_rejected() {
    assert!(FrameSlotLimiter::new(0).is_err());
}

#[test]
fn release_never_exceeds_max() {
    let l = FrameSlotLimiter::new(3).unwrap();
    assert!(!l.release());
    assert_eq!(l.available(), 3);

    l.acquire();
    assert_eq!(l.in_flight(), 1);
    assert!(l.release());
    assert!(!l.release());
    assert_eq!(l.available(), 3);
    assert_eq!(l.in_flight(), 0);
}

#[test]
fn try_acquire_stops_at_zero() {
    let l = FrameSlotLimiter::new(2).unwrap();
    assert!(l.try_acquire());
    assert!(l.try_acquire());
    assert!(!l.try_acquire());
    assert_eq!(l.available(), 0);
}

#[test]
fn fourth_acquire_blocks_until_release() {
    let l = Arc::new(FrameSlotLimiter::new(3).unwrap());
    let acquired = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    let worker = {
        let l = Arc::clone(&l);
        let acquired = Arc::clone(&acquired);
        std::thread::spawn(move || {
            for _ in 0..5 {
                l.acquire();
                acquired.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            }
        })
    };

    for _ in 0..3 {
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
    // The producer is now parked on the 4th acquire.
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(acquired.load(Ordering::SeqCst), 3);

    assert!(l.release());
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(acquired.load(Ordering::SeqCst), 4);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    assert!(l.release());
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    worker.join().unwrap();
    assert_eq!(acquired.load(Ordering::SeqCst), 5);
    assert_eq!(l.available(), 0);
}

#[test]
fn wait_idle_times_out_while_slots_are_held() {
    let l = FrameSlotLimiter::new(2).unwrap();
    l.acquire();
    assert!(!l.wait_idle(Duration::from_millis(20)));
    l.release();
    assert!(l.wait_idle(Duration::from_millis(20)));
}

#[test]
fn wait_idle_wakes_on_cross_thread_release() {
    let l = Arc::new(FrameSlotLimiter::new(3).unwrap());
    l.acquire();
    l.acquire();
    let releaser = {
        let l = Arc::clone(&l);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            l.release();
            l.release();
        })
    };
    assert!(l.wait_idle(Duration::from_secs(5)));
    releaser.join().unwrap();
}

#[test]
fn counter_stays_in_bounds_under_contention() {
    let max = 3;
    let l = Arc::new(FrameSlotLimiter::new(max).unwrap());
    let (tx, rx) = mpsc::channel::<()>();

    let completer = {
        let l = Arc::clone(&l);
        std::thread::spawn(move || {
            while rx.recv().is_ok() {
                let in_flight = l.in_flight();
                assert!(in_flight <= max);
                l.release();
            }
        })
    };

    for _ in 0..500 {
        l.acquire();
        let avail = l.available();
        assert!(avail <= max);
        tx.send(()).unwrap();
    }
    drop(tx);
    completer.join().unwrap();
    assert_eq!(l.available(), max);
}
