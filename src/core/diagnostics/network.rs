//! Network failure reporting.

use super::bus::{BusCapacity, EventBus, EventStream};
use super::events::{NetworkErrorType, NetworkEvent};

pub struct NetworkMonitor {
    bus: EventBus<NetworkEvent>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self::with_capacity(BusCapacity::NETWORK)
    }

    pub fn with_capacity(capacity: BusCapacity) -> Self {
        Self {
            bus: EventBus::ordered("network", capacity),
        }
    }

    pub fn failures(&self) -> EventStream<NetworkEvent> {
        self.bus.stream()
    }

    pub fn report_timeout(&self, url: &str, timeout_ms: u64) {
        self.bus.publish(NetworkEvent::new(
            format!("Network timeout after {}ms", timeout_ms),
            NetworkErrorType::Timeout,
            url,
        ));
    }

    pub fn report_connection_failed(&self, url: &str, reason: &str) {
        self.bus.publish(NetworkEvent::new(
            format!("Connection failed: {}", reason),
            NetworkErrorType::ConnectionFailed,
            url,
        ));
    }

    pub fn report_http_error(&self, url: &str, status: u16) {
        self.bus.publish(
            NetworkEvent::new(
                format!("HTTP error {}", status),
                NetworkErrorType::HttpError,
                url,
            )
            .with_status(status),
        );
    }

    pub fn report_ssl_error(&self, url: &str, reason: &str) {
        self.bus.publish(NetworkEvent::new(
            format!("SSL/TLS error: {}", reason),
            NetworkErrorType::SslError,
            url,
        ));
    }

    pub fn report_dns_failure(&self, url: &str) {
        self.bus.publish(NetworkEvent::new(
            "DNS resolution failed",
            NetworkErrorType::DnsFailure,
            url,
        ));
    }
}
