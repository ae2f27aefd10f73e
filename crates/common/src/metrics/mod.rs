//! Prometheus metrics
//!
//! Every metric carries the `pledgehub_` prefix. Money counters hold whole
//! major currency units.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Instant;

pub const REQUESTS_TOTAL: &str = "pledgehub_requests_total";
pub const REQUEST_DURATION: &str = "pledgehub_request_duration_seconds";
pub const CONTRIBUTIONS_TOTAL: &str = "pledgehub_contributions_total";
pub const CONTRIBUTED_AMOUNT: &str = "pledgehub_contributed_amount_total";
pub const CONTRIBUTION_REVIEWS: &str = "pledgehub_contributions_reviewed_total";
pub const PAYMENTS_TOTAL: &str = "pledgehub_payments_recorded_total";
pub const PROJECT_TRANSITIONS: &str = "pledgehub_project_transitions_total";
pub const APPLICATIONS_TOTAL: &str = "pledgehub_applications_total";
pub const APPLICATION_REVIEWS: &str = "pledgehub_applications_reviewed_total";
pub const TENANT_RESOLUTION_FAILURES: &str = "pledgehub_tenant_resolution_failures_total";

/// Request latency buckets in seconds; P50 target 50ms, P99 target 250ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
];

const COUNTERS: &[(&str, Unit, &str)] = &[
    (REQUESTS_TOTAL, Unit::Count, "HTTP requests by method, route and status"),
    (CONTRIBUTIONS_TOTAL, Unit::Count, "Contributions created, by tenant and payment plan"),
    (CONTRIBUTED_AMOUNT, Unit::Count, "Whole currency units pledged, by tenant"),
    (CONTRIBUTION_REVIEWS, Unit::Count, "Contribution decisions, by outcome"),
    (PAYMENTS_TOTAL, Unit::Count, "Payments recorded, by whether they settled the pledge"),
    (PROJECT_TRANSITIONS, Unit::Count, "Project status changes, by source and target"),
    (APPLICATIONS_TOTAL, Unit::Count, "Tenant applications submitted"),
    (APPLICATION_REVIEWS, Unit::Count, "Tenant application decisions, by outcome"),
    (TENANT_RESOLUTION_FAILURES, Unit::Count, "Tenant-scoped requests refused before routing"),
];

/// Describe every metric to the installed recorder
pub fn register_metrics() {
    for &(name, unit, help) in COUNTERS {
        describe_counter!(name, unit, help);
    }
    describe_histogram!(REQUEST_DURATION, Unit::Seconds, "HTTP request latency");

    tracing::info!(count = COUNTERS.len() + 1, "Metrics registered");
}

/// Times one request from `start` to `finish`
pub struct RequestMetrics {
    started: Instant,
    method: String,
    route: String,
}

impl RequestMetrics {
    pub fn start(method: &str, route: &str) -> Self {
        Self {
            started: Instant::now(),
            method: method.to_string(),
            route: route.to_string(),
        }
    }

    pub fn finish(self, status: u16) {
        let elapsed = self.started.elapsed().as_secs_f64();

        counter!(
            REQUESTS_TOTAL,
            "method" => self.method.clone(),
            "endpoint" => self.route.clone(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!(REQUEST_DURATION, "method" => self.method, "endpoint" => self.route)
            .record(elapsed);
    }
}

/// Whole currency units for a counter; fractions are dropped
fn whole_units(amount: Decimal) -> u64 {
    amount.trunc().to_u64().unwrap_or(0)
}

pub fn record_contribution(tenant: &str, plan: &str, amount: Decimal) {
    counter!(CONTRIBUTIONS_TOTAL, "tenant" => tenant.to_string(), "plan" => plan.to_string())
        .increment(1);
    counter!(CONTRIBUTED_AMOUNT, "tenant" => tenant.to_string()).increment(whole_units(amount));
}

/// `outcome` is the status the contribution moved to
pub fn record_contribution_review(tenant: &str, outcome: &str) {
    counter!(CONTRIBUTION_REVIEWS, "tenant" => tenant.to_string(), "outcome" => outcome.to_string())
        .increment(1);
}

pub fn record_payment(tenant: &str, settled: bool) {
    counter!(PAYMENTS_TOTAL, "tenant" => tenant.to_string(), "settled" => settled.to_string())
        .increment(1);
}

pub fn record_project_transition(from: &str, to: &str) {
    counter!(PROJECT_TRANSITIONS, "from" => from.to_string(), "to" => to.to_string()).increment(1);
}

pub fn record_application_submitted() {
    counter!(APPLICATIONS_TOTAL).increment(1);
}

pub fn record_application_review(outcome: &str) {
    counter!(APPLICATION_REVIEWS, "outcome" => outcome.to_string()).increment(1);
}

/// `reason` is `unknown`, `suspended` or `missing`
pub fn record_tenant_resolution_failure(reason: &str) {
    counter!(TENANT_RESOLUTION_FAILURES, "reason" => reason.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_latency_buckets_ascend() {
        assert!(LATENCY_BUCKETS.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(LATENCY_BUCKETS.contains(&0.050));
        assert!(LATENCY_BUCKETS.contains(&0.250));
    }

    #[test]
    fn test_names_share_prefix() {
        for (name, _, _) in COUNTERS {
            assert!(name.starts_with("pledgehub_"), "{}", name);
            assert!(name.ends_with("_total"), "{}", name);
        }
        // the exporter matches histogram buckets on this suffix
        assert!(REQUEST_DURATION.ends_with("duration_seconds"));
    }

    #[test]
    fn test_whole_units() {
        assert_eq!(whole_units(dec!(149.99)), 149);
        assert_eq!(whole_units(dec!(0.50)), 0);
        assert_eq!(whole_units(dec!(-3)), 0);
    }

    #[test]
    fn test_recorders_without_exporter() {
        // no recorder installed: calls are no-ops
        register_metrics();
        let request = RequestMetrics::start("GET", "/v1/t/projects");
        request.finish(200);
        record_contribution("acme", "full", dec!(25.00));
        record_payment("acme", true);
        record_project_transition("draft", "active");
    }
}
