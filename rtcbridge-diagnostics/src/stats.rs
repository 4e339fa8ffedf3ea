//! Stats report rendering
//!
//! Reports are rendered as a JSON array of `[id, {type, timestamp, ...}]`
//! pairs, with the timestamp in milliseconds.

use rtcbridge_core::{RtcStats, RtcStatsReport};
use serde_json::{Map, Value};

/// Render one stats object as its `[id, {...}]` pair
pub fn stats_entry(stats: &RtcStats) -> Value {
    let mut object = Map::with_capacity(stats.members.len() + 2);
    object.insert("type".to_string(), Value::from(stats.stats_type.clone()));
    object.insert("timestamp".to_string(), Value::from(stats.timestamp_us / 1000.0));
    for (key, value) in &stats.members {
        object.insert(key.clone(), value.clone());
    }
    Value::Array(vec![Value::from(stats.id.clone()), Value::Object(object)])
}

/// Render a whole report; an empty report renders as `[]`
pub fn stats_to_json(report: &RtcStatsReport) -> String {
    Value::Array(report.stats.values().map(stats_entry).collect()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inbound() -> RtcStats {
        let mut members = Map::new();
        members.insert("bytesReceived".to_string(), json!(1200));
        members.insert("kind".to_string(), json!("video"));
        RtcStats {
            id: "RTCInboundRTPVideoStream_1".to_string(),
            stats_type: "inbound-rtp".to_string(),
            timestamp_us: 1_500_000.0,
            members,
        }
    }

    #[test]
    fn test_entry_shape() {
        let entry = stats_entry(&inbound());
        assert_eq!(entry[0], "RTCInboundRTPVideoStream_1");
        assert_eq!(entry[1]["type"], "inbound-rtp");
        assert_eq!(entry[1]["timestamp"], 1500.0);
        assert_eq!(entry[1]["bytesReceived"], 1200);
        assert_eq!(entry[1]["kind"], "video");
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(stats_to_json(&RtcStatsReport::empty()), "[]");
    }
}
