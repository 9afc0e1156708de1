use prometheus::{
    opts, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Registry, TextEncoder,
};

pub struct ObservabilityRepository {
    registry: Registry,
    instance_count: Gauge,
    backend_failure_total: CounterVec,
    operation_total: CounterVec,
    operation_latency_seconds: HistogramVec,
}

impl ObservabilityRepository {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();

        let instance_count = Gauge::with_opts(opts!(
            "tablebroker_instance_count",
            "Service instances currently provisioned"
        ))
        .map_err(|e| e.to_string())?;
        let backend_failure_total = CounterVec::new(
            opts!(
                "tablebroker_backend_failure_total",
                "Provisioning backend failures by backend call"
            ),
            &["call"],
        )
        .map_err(|e| e.to_string())?;
        let operation_total = CounterVec::new(
            opts!(
                "tablebroker_operation_total",
                "Broker lifecycle operations by outcome"
            ),
            &["operation", "status"],
        )
        .map_err(|e| e.to_string())?;
        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "tablebroker_operation_latency_seconds",
                "Broker lifecycle operation latency (seconds)",
            ),
            &["operation"],
        )
        .map_err(|e| e.to_string())?;

        registry
            .register(Box::new(instance_count.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(backend_failure_total.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(operation_total.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .map_err(|e| e.to_string())?;

        Ok(Self {
            registry,
            instance_count,
            backend_failure_total,
            operation_total,
            operation_latency_seconds,
        })
    }

    pub fn set_instance_count(&self, count: f64) {
        self.instance_count.set(count);
    }

    pub fn inc_backend_failure(&self, call: &str) {
        self.backend_failure_total.with_label_values(&[call]).inc();
    }

    pub fn observe_operation(&self, operation: &str, status: &str, seconds: f64) {
        self.operation_total
            .with_label_values(&[operation, status])
            .inc();
        self.operation_latency_seconds
            .with_label_values(&[operation])
            .observe(seconds);
    }

    pub fn render_metrics(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}
