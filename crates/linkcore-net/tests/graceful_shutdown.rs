use std::sync::Arc;
use std::thread;
use std::time::Duration;

use linkcore_net::framed::Client;
use linkcore_net::NoopCallbacks;

/// `request_shutdown` unblocks a `run()` loop promptly, even with no
/// connection ever established, and `is_connected` reflects the closed
/// state afterward.
#[test]
fn request_shutdown_unblocks_run_within_two_seconds() {
    let client = Arc::new(Client::new(Arc::new(NoopCallbacks)).unwrap());
    let run = thread::spawn({
        let client = client.clone();
        move || client.run()
    });

    thread::sleep(Duration::from_millis(50));
    client.request_shutdown();

    let start = std::time::Instant::now();
    run.join().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(!client.is_connected());
}
