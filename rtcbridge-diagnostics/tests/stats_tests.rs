//! Stats report rendering tests

use rtcbridge_core::{RtcStats, RtcStatsReport};
use rtcbridge_diagnostics::*;
use serde_json::{json, Map, Value};

fn stats(id: &str, stats_type: &str) -> RtcStats {
    RtcStats {
        id: id.to_string(),
        stats_type: stats_type.to_string(),
        timestamp_us: 2_000.0,
        members: Map::new(),
    }
}

#[test]
fn test_report_entries_ordered_by_id() {
    let mut report = RtcStatsReport::empty();
    for (id, kind) in [("T01", "transport"), ("CP01", "candidate-pair"), ("OT01", "outbound-rtp")] {
        report.stats.insert(id.to_string(), stats(id, kind));
    }

    let rendered: Value = serde_json::from_str(&stats_to_json(&report)).unwrap();
    let entries = rendered.as_array().unwrap();
    assert_eq!(entries.len(), 3);

    let ids: Vec<&str> = entries.iter().map(|e| e[0].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["CP01", "OT01", "T01"]);
    assert_eq!(entries[0][1], json!({"type": "candidate-pair", "timestamp": 2.0}));
}
