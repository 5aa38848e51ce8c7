//! Prometheus metrics for the gift service
//!
//! Exposes metrics on /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_int_counter, register_int_counter_vec, register_int_gauge_vec, Gauge,
    IntCounter, IntCounterVec, IntGaugeVec,
};

lazy_static! {
    // Gateway
    pub static ref GIFT_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "gift_requests_total",
        "Gateway requests by mode and outcome",
        &["mode", "outcome"]
    ).expect("constant metric name is valid");

    pub static ref REDEMPTIONS: IntCounter = register_int_counter!(
        "gift_redemptions_total",
        "Redemptions committed and disbursed"
    ).expect("constant metric name is valid");

    /// Redemptions whose record was written but whose transfer failed
    pub static ref UNPAID_REDEMPTIONS: IntCounter = register_int_counter!(
        "gift_unpaid_redemptions_total",
        "Redemptions recorded without a successful transfer (operator action required)"
    ).expect("constant metric name is valid");

    // Deposits
    pub static ref DEPOSITS_PROCESSED: IntCounterVec = register_int_counter_vec!(
        "gift_deposits_processed_total",
        "Inbound deposits by outcome",
        &["outcome"]
    ).expect("constant metric name is valid");

    pub static ref TOKENS_ISSUED: IntCounter = register_int_counter!(
        "gift_token_pairs_issued_total",
        "Token pairs issued and delivered"
    ).expect("constant metric name is valid");

    pub static ref LATEST_HEIGHT: IntGaugeVec = register_int_gauge_vec!(
        "gift_latest_height",
        "Latest ledger height processed by the deposit watcher, per chain",
        &["chain"]
    ).expect("constant metric name is valid");

    // Errors
    pub static ref ERRORS: IntCounterVec = register_int_counter_vec!(
        "gift_errors_total",
        "Total number of errors",
        &["component", "type"]
    ).expect("constant metric name is valid");

    // Health
    pub static ref UP: Gauge = register_gauge!(
        "gift_up",
        "Whether the gift service is up (1) or down (0)"
    ).expect("constant metric name is valid");
}

pub fn record_request(mode: &str, outcome: &str) {
    GIFT_REQUESTS.with_label_values(&[mode, outcome]).inc();
}

pub fn record_deposit(outcome: &str) {
    DEPOSITS_PROCESSED.with_label_values(&[outcome]).inc();
}

pub fn record_error(component: &str, error_type: &str) {
    ERRORS.with_label_values(&[component, error_type]).inc();
}

pub fn record_height(chain: &str, height: u64) {
    LATEST_HEIGHT.with_label_values(&[chain]).set(height as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = GIFT_REQUESTS.with_label_values(&["view", "valid"]).get();
        record_request("view", "valid");
        assert_eq!(
            GIFT_REQUESTS.with_label_values(&["view", "valid"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_heights_are_tracked_per_chain() {
        record_height("901", 40);
        record_height("902", 7);
        assert_eq!(LATEST_HEIGHT.with_label_values(&["901"]).get(), 40);
        assert_eq!(LATEST_HEIGHT.with_label_values(&["902"]).get(), 7);

        record_height("902", 8);
        assert_eq!(LATEST_HEIGHT.with_label_values(&["901"]).get(), 40);
        assert_eq!(LATEST_HEIGHT.with_label_values(&["902"]).get(), 8);
    }

    #[test]
    fn test_metrics_are_gathered() {
        UP.set(1.0);
        record_error("test", "sample");
        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|mf| mf.get_name().to_string())
            .collect();
        assert!(names.contains(&"gift_up".to_string()));
        assert!(names.contains(&"gift_errors_total".to_string()));
    }
}
