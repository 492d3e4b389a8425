use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Counters and timings for the client-side session lifecycle.
#[derive(Clone)]
pub struct SessionMetrics {
    pub registry: Registry,
    pub sweeps_total: IntCounter,
    pub sweep_evictions_total: IntCounterVec,
    pub expiry_notifications_total: IntCounterVec,
    pub verifications_total: IntCounterVec,
    pub detections_total: IntCounterVec,
    pub sweep_duration_seconds: Histogram,
}

impl SessionMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let sweeps_total = IntCounter::new("session_sweeps_total", "Completed expiry sweeps")?;
        let sweep_evictions_total = IntCounterVec::new(
            Opts::new(
                "session_sweep_evictions_total",
                "Expired auth records removed by the sweeper",
            ),
            &["class"],
        )?;
        let expiry_notifications_total = IntCounterVec::new(
            Opts::new(
                "session_expiry_notifications_total",
                "Session expired notifications emitted",
            ),
            &["class"],
        )?;
        let verifications_total = IntCounterVec::new(
            Opts::new(
                "session_verifications_total",
                "Stored token verifications grouped by outcome",
            ),
            &["class", "outcome"],
        )?;
        let detections_total = IntCounterVec::new(
            Opts::new(
                "session_detections_total",
                "Auth type detections grouped by result",
            ),
            &["user_type"],
        )?;
        let sweep_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "session_sweep_duration_seconds",
                "Duration of a single expiry sweep",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;

        registry.register(Box::new(sweeps_total.clone()))?;
        registry.register(Box::new(sweep_evictions_total.clone()))?;
        registry.register(Box::new(expiry_notifications_total.clone()))?;
        registry.register(Box::new(verifications_total.clone()))?;
        registry.register(Box::new(detections_total.clone()))?;
        registry.register(Box::new(sweep_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            sweeps_total,
            sweep_evictions_total,
            expiry_notifications_total,
            verifications_total,
            detections_total,
            sweep_duration_seconds,
        })
    }

    pub fn sweep_completed(&self, elapsed_secs: f64) {
        self.sweeps_total.inc();
        self.sweep_duration_seconds.observe(elapsed_secs);
    }

    pub fn evicted(&self, class: &str) {
        self.sweep_evictions_total.with_label_values(&[class]).inc();
    }

    pub fn expiry_notified(&self, class: &str) {
        self.expiry_notifications_total
            .with_label_values(&[class])
            .inc();
    }

    pub fn verification(&self, class: &str, outcome: &str) {
        self.verifications_total
            .with_label_values(&[class, outcome])
            .inc();
    }

    pub fn detection(&self, user_type: &str) {
        self.detections_total.with_label_values(&[user_type]).inc();
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
