use std::time::Duration;

use nonzero_ext::nonzero;
use tollgate::{Limit, Registry};

fn main() {
    let registry = Registry::new(Limit::per_second_and_burst(
        nonzero!(10u32),
        nonzero!(20u32),
    ));
    assert_eq!(20, registry.draw_max("127.0.0.1", 25));
    assert!(!registry.draw("127.0.0.1", 1));
    // after two seconds the bucket is full again
    std::thread::sleep(Duration::from_secs(2));
    assert!(registry.draw("127.0.0.1", 20));
    registry.reset("127.0.0.1");
    assert_eq!(1, registry.purge());
}
