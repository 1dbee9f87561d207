use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub mutations_total: IntCounterVec,
    pub mutation_latency_seconds: HistogramVec,
    pub mutations_in_flight: IntGauge,
    pub messages_sent_total: IntCounter,
    pub refreshes_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let mutations_total = IntCounterVec::new(
            Opts::new("mutations_total", "Shipment mutations by kind and outcome"),
            &["kind", "outcome"],
        )
        .expect("valid mutations_total metric");

        let mutation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "mutation_latency_seconds",
                "Round-trip latency of shipment mutations in seconds",
            ),
            &["kind", "outcome"],
        )
        .expect("valid mutation_latency_seconds metric");

        let mutations_in_flight =
            IntGauge::new("mutations_in_flight", "Shipment mutations awaiting the backend")
                .expect("valid mutations_in_flight metric");

        let messages_sent_total =
            IntCounter::new("messages_sent_total", "Chat messages accepted for delivery")
                .expect("valid messages_sent_total metric");

        let refreshes_total = IntCounterVec::new(
            Opts::new("refreshes_total", "Snapshot refreshes by outcome"),
            &["outcome"],
        )
        .expect("valid refreshes_total metric");

        registry
            .register(Box::new(mutations_total.clone()))
            .expect("register mutations_total");
        registry
            .register(Box::new(mutation_latency_seconds.clone()))
            .expect("register mutation_latency_seconds");
        registry
            .register(Box::new(mutations_in_flight.clone()))
            .expect("register mutations_in_flight");
        registry
            .register(Box::new(messages_sent_total.clone()))
            .expect("register messages_sent_total");
        registry
            .register(Box::new(refreshes_total.clone()))
            .expect("register refreshes_total");

        Self {
            registry,
            mutations_total,
            mutation_latency_seconds,
            mutations_in_flight,
            messages_sent_total,
            refreshes_total,
        }
    }

    pub fn observe_mutation(&self, kind: &str, outcome: &str, elapsed_secs: f64) {
        self.mutations_total
            .with_label_values(&[kind, outcome])
            .inc();
        self.mutation_latency_seconds
            .with_label_values(&[kind, outcome])
            .observe(elapsed_secs);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
