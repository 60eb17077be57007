//! Metrics collection for the bot using Prometheus
//!
//! Business metrics only: case opens by rarity, Stars payments, gift
//! deliveries. Scraped from the mini-app router at `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_int_counter, CounterVec, IntCounter};

/// Case opens by drawn rarity
/// Labels: rarity (common/rare/epic/legendary/mythic)
pub static CASES_OPENED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)] // metric registration only fails on duplicate names
    register_counter_vec!(
        "cosmobot_cases_opened_total",
        "Total number of cases opened by drawn rarity",
        &["rarity"]
    )
    .unwrap()
});

/// Settled Stars payments
/// Labels: outcome (credited/duplicate)
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    register_counter_vec!(
        "cosmobot_payments_total",
        "Total number of settled Stars payment confirmations",
        &["outcome"]
    )
    .unwrap()
});

/// Revenue in Stars (sum over settled payments)
pub static REVENUE_STARS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    register_int_counter!("cosmobot_revenue_stars_total", "Total Stars received from topups").unwrap()
});

/// Gift delivery attempts
/// Labels: outcome (delivered/failed/pool_empty)
pub static GIFT_DELIVERIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    register_counter_vec!(
        "cosmobot_gift_deliveries_total",
        "Total number of gift delivery attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Force registration of all metrics at startup so the first /metrics
/// scrape sees every series at zero.
pub fn init_metrics() {
    Lazy::force(&CASES_OPENED_TOTAL);
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&REVENUE_STARS_TOTAL);
    Lazy::force(&GIFT_DELIVERIES_TOTAL);
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        log::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_gather() {
        init_metrics();
        CASES_OPENED_TOTAL.with_label_values(&["epic"]).inc();
        let text = gather();
        assert!(text.contains("cosmobot_cases_opened_total"));
    }
}
