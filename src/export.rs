// src/export.rs
//
// Output-side collaborator contracts: completed-report records for the
// upload layer and the CSV serialization the export layer consumes.

use crate::types::PrivacyStats;
use serde::Serialize;

/// One finished report, ready for upload or export. Coordinates come from
/// the caller (GPS or manual pin in the app; configured fallback in the
/// CLI driver).
#[derive(Debug, Clone, Serialize)]
pub struct CompletedReport {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub analysis: String,
    pub stats: PrivacyStats,
    pub timestamp_ms: i64,
}

impl CompletedReport {
    pub fn new(lat: f64, lng: f64, analysis: String, stats: PrivacyStats) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lat,
            lng,
            analysis,
            stats,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Serialize reports as `ID,Lat,Lng,Analysis` rows. Newlines inside the
/// analysis field are replaced with `" | "` so each report stays on one
/// row; the field is double-quoted.
pub fn csv_content(reports: &[CompletedReport]) -> String {
    let mut out = String::from("ID,Lat,Lng,Analysis\n");
    for r in reports {
        out.push_str(&format!(
            "{},{},{},\"{}\"\n",
            r.id,
            r.lat,
            r.lng,
            r.analysis.replace('\n', " | ")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_header_and_row_shape() {
        let report = CompletedReport::new(
            12.5,
            -70.25,
            "1. AI Notes: ok\n2. Issue: None".to_string(),
            PrivacyStats { faces: 1, plates: 0 },
        );
        let csv = csv_content(&[report.clone()]);

        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "ID,Lat,Lng,Analysis");

        let row = lines.next().unwrap();
        assert!(row.starts_with(&format!("{},12.5,-70.25,\"", report.id)));
        assert!(row.contains("1. AI Notes: ok | 2. Issue: None"));
        assert!(row.ends_with('"'));
        assert!(!row.contains('\n'));
    }

    #[test]
    fn test_empty_export_is_header_only() {
        assert_eq!(csv_content(&[]), "ID,Lat,Lng,Analysis\n");
    }
}
