//! Client-side configuration helpers.

use std::time::Duration;

use ccubench::{BenchConfig, Scenario};

/// Small, short configuration bound to an ephemeral loopback port.
pub fn quick_config(scenario: Scenario) -> BenchConfig {
    BenchConfig::new()
        .with_scenario(scenario)
        .with_endpoint("127.0.0.1", 0)
        .with_ccu(16)
        .with_size(64)
        .with_inflight(4)
        .with_phases(
            Duration::from_millis(200),
            Duration::from_millis(500),
            Duration::from_secs(5),
        )
        .with_connect(32, Duration::from_secs(5))
}

/// A loopback port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
