//! Tests for the event transport guarantees.

use chrono::Utc;
use serde_json::json;

use readership::EventEnvelope;
use readership::transport::{HttpTransport, MemoryTransport, Transport};

fn envelope(event_type: &str) -> EventEnvelope {
    EventEnvelope {
        event_type: event_type.to_string(),
        timestamp: Utc::now(),
        visitor_id: "v-1".to_string(),
        session_id: "s-1".to_string(),
        path: "/".to_string(),
        referrer: None,
        utm: None,
        data: json!({}),
    }
}

#[test]
fn memory_transport_records_in_emission_order() {
    let transport = MemoryTransport::new();
    transport.send(envelope("page_view"));
    transport.send(envelope("heartbeat"));
    transport.send(envelope("heartbeat"));

    assert_eq!(transport.events().len(), 3);
    assert_eq!(transport.of_type("heartbeat").len(), 2);
    assert_eq!(transport.events()[0].event_type, "page_view");
}

#[test]
fn http_send_without_a_runtime_is_a_silent_noop() {
    // No tokio runtime here: the event is dropped, the caller survives.
    let transport = HttpTransport::new("https://api.example.com/");
    transport.send(envelope("page_view"));
}

#[tokio::test]
async fn http_send_to_unreachable_endpoint_never_errors() {
    // Reserved TEST-NET address; connection failure is swallowed inside
    // the spawned send.
    let transport = HttpTransport::new("http://192.0.2.1:9");
    transport.send(envelope("page_view"));
    tokio::task::yield_now().await;
}
