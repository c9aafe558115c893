use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

/// Global metrics for the gateway
pub struct Metrics {
    pub registry: Registry,

    // Request metrics
    pub requests_total: CounterVec,

    // Provider metrics
    pub provider_requests_total: CounterVec,
    pub provider_errors_total: CounterVec,
    pub provider_duration_seconds: HistogramVec,
    pub provider_models: GaugeVec,

    // Token metrics
    pub tokens_used_total: CounterVec,
    pub estimated_cost_usd: CounterVec,

    // Speech metrics
    pub tts_requests_total: CounterVec,
    pub tts_audio_bytes_total: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("switchyard_requests_total", "Total number of HTTP requests"),
            &["endpoint", "status"],
        )?;

        let provider_requests_total = CounterVec::new(
            Opts::new(
                "switchyard_provider_requests_total",
                "Total number of requests dispatched to each provider",
            ),
            &["provider", "output", "status"],
        )?;

        let provider_errors_total = CounterVec::new(
            Opts::new(
                "switchyard_provider_errors_total",
                "Total number of errors from each provider",
            ),
            &["provider", "error_type"],
        )?;

        let provider_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "switchyard_provider_duration_seconds",
                "Provider call duration in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
            &["provider"],
        )?;

        let provider_models = GaugeVec::new(
            Opts::new(
                "switchyard_provider_models",
                "Number of models registered for each provider",
            ),
            &["provider"],
        )?;

        let tokens_used_total = CounterVec::new(
            Opts::new("switchyard_tokens_used_total", "Total tokens used"),
            &["provider", "model", "token_type"], // token_type: prompt, completion
        )?;

        let estimated_cost_usd = CounterVec::new(
            Opts::new(
                "switchyard_estimated_cost_usd",
                "Estimated cost in USD based on token usage",
            ),
            &["provider", "model"],
        )?;

        let tts_requests_total = CounterVec::new(
            Opts::new("switchyard_tts_requests_total", "Total text-to-speech proxy requests"),
            &["status"],
        )?;

        let tts_audio_bytes_total = CounterVec::new(
            Opts::new("switchyard_tts_audio_bytes_total", "Audio bytes generated and stored"),
            &["model"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(provider_requests_total.clone()))?;
        registry.register(Box::new(provider_errors_total.clone()))?;
        registry.register(Box::new(provider_duration_seconds.clone()))?;
        registry.register(Box::new(provider_models.clone()))?;
        registry.register(Box::new(tokens_used_total.clone()))?;
        registry.register(Box::new(estimated_cost_usd.clone()))?;
        registry.register(Box::new(tts_requests_total.clone()))?;
        registry.register(Box::new(tts_audio_bytes_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            provider_requests_total,
            provider_errors_total,
            provider_duration_seconds,
            provider_models,
            tokens_used_total,
            estimated_cost_usd,
            tts_requests_total,
            tts_audio_bytes_total,
        })
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<Arc<Metrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(Metrics::default()));
