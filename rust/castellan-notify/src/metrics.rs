use prometheus::{IntCounterVec, Opts, Registry as PromRegistry};

pub struct NotifyMetrics {
    pub sent: IntCounterVec,
    pub suppressed: IntCounterVec,
}

impl NotifyMetrics {
    pub fn new(registry: &PromRegistry) -> prometheus::Result<Self> {
        let sent = IntCounterVec::new(
            Opts::new("notifications_sent_total", "Notifications actually delivered to a user"),
            &["type"],
        )?;
        let suppressed = IntCounterVec::new(
            Opts::new(
                "notifications_suppressed_total",
                "Notifications gated before delivery, by reason",
            ),
            &["type", "reason"],
        )?;
        registry.register(Box::new(sent.clone()))?;
        registry.register(Box::new(suppressed.clone()))?;
        Ok(Self { sent, suppressed })
    }
}
