use slog::{o, Drain, Logger};

use relheap::{Heap, RuntimeConfig};

/// Log to the terminal when `RELHEAP_LOG` is set, otherwise discard
pub fn test_logger() -> Logger {
    if std::env::var_os("RELHEAP_LOG").is_some() {
        let plain = slog_term::PlainSyncDecorator::new(std::io::stderr());
        Logger::root(
            slog_term::FullFormat::new(plain).build().fuse(),
            o!("test" => true)
        )
    } else {
        Logger::root(slog::Discard, o!())
    }
}

/// A heap with allocation tracking and poisoning,
/// regardless of build profile
pub fn test_heap() -> Heap {
    Heap::with_config(
        RuntimeConfig {
            track_allocations: true,
            poison_freed: true,
            ..RuntimeConfig::default()
        },
        test_logger()
    )
}

/// Assert every permanent block has been freed
#[allow(dead_code)]
pub fn assert_no_leaks(heap: &Heap) {
    let live = heap.live_blocks().unwrap();
    assert!(live.is_empty(), "Leaked {} blocks: {:?}", live.len(), live);
    assert_eq!(heap.stats().unwrap().live_objects, 0);
}
