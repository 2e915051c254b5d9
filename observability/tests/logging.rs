use observability::{
    AccessLogEntry, CorrelationContext, ErrorDetails, LogLevel, LogOptions, LogOutput,
    MemoryLogSink, ObservabilityClient,
};
use serde_json::{Value, json};

fn client(memory: &MemoryLogSink, level: LogLevel) -> ObservabilityClient {
    ObservabilityClient::builder()
        .service_name("edge-proxy")
        .with_logger(|logs| {
            logs.level(level)
                .default_attributes([("service", "edge-proxy"), ("region", "eu-west-1")])
                .output(LogOutput::Memory(memory.clone()))
        })
        .build()
        .unwrap()
}

#[test]
fn defaults_merge_under_call_attributes() {
    let memory = MemoryLogSink::new();
    let logger = client(&memory, LogLevel::Debug).logger().unwrap();

    logger.info(
        "request forwarded",
        LogOptions::new()
            .with_attribute("region", "us-east-1")
            .with_attribute("upstream", "api.internal")
            .with_context(CorrelationContext::for_trace("4bf92f3577b34da6").with_span("00f067aa0ba902b7")),
    );

    let records = memory.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.attribute("service"), Some(&Value::from("edge-proxy")));
    assert_eq!(record.attribute("region"), Some(&Value::from("us-east-1")));
    assert_eq!(record.attribute("upstream"), Some(&Value::from("api.internal")));

    let encoded = serde_json::to_value(record).unwrap();
    assert_eq!(encoded["msg"], "request forwarded");
    assert_eq!(encoded["level"], "info");
    assert_eq!(encoded["context"]["traceId"], "4bf92f3577b34da6");
    assert_eq!(encoded["region"], "us-east-1");
}

#[test]
fn level_filter_applies_to_every_method() {
    let memory = MemoryLogSink::new();
    let logger = client(&memory, LogLevel::Error).logger().unwrap();

    logger.trace("t", LogOptions::new());
    logger.debug("d", LogOptions::new());
    logger.info("i", LogOptions::new());
    logger.warn("w", LogOptions::new());
    logger.error("e", None, LogOptions::new());
    logger.fatal("f", None, LogOptions::new());

    let levels: Vec<_> = memory.records().iter().map(|record| record.level()).collect();
    assert_eq!(levels, vec![LogLevel::Error, LogLevel::Fatal]);
}

#[test]
fn access_entries_keep_their_schema() {
    let memory = MemoryLogSink::new();
    let logger = client(&memory, LogLevel::Info).logger().unwrap();

    let entry = AccessLogEntry::start("GET", "/proxy?url=https://example.com")
        .with_target_url("https://example.com")
        .with_client("203.0.113.7", "curl/8.4.0", "https://app.example")
        .with_allowed_origin(true)
        .fail(ErrorDetails::new("upstream timed out").with_code("ETIMEDOUT"));
    logger.access(&entry).unwrap();

    let record = &memory.records()[0];
    assert_eq!(record.level(), LogLevel::Error);
    let encoded = serde_json::to_value(record).unwrap();
    assert_eq!(encoded["requestId"], json!(entry.request_id));
    assert_eq!(encoded["targetUrl"], "https://example.com");
    assert_eq!(encoded["routedThroughProxy"], true);
    assert_eq!(encoded["isAllowedOrigin"], true);
    assert_eq!(encoded["statusCode"], 500);
    assert_eq!(encoded["error"]["code"], "ETIMEDOUT");
    assert_eq!(encoded["service"], "edge-proxy");
}

#[test]
fn structured_payloads_are_flattened() {
    #[derive(serde::Serialize)]
    struct Charge<'a> {
        amount_cents: u64,
        currency: &'a str,
    }

    let memory = MemoryLogSink::new();
    let logger = client(&memory, LogLevel::Info).logger().unwrap();
    logger
        .structured(
            LogLevel::Warn,
            "charge retried",
            &Charge {
                amount_cents: 1250,
                currency: "EUR",
            },
        )
        .unwrap();

    let record = &memory.records()[0];
    assert_eq!(record.attribute("amount_cents"), Some(&Value::from(1250)));
    assert_eq!(record.attribute("currency"), Some(&Value::from("EUR")));
}
