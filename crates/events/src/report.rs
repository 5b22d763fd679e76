//! Report generation job events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::Event;
use crate::timestamp::{self, Timestamp};

/// Requests a CPU-heavy report to be generated by a background worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateReportJob {
    pub job_id: String,
    pub report_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub timestamp: Timestamp,
}

impl GenerateReportJob {
    pub fn new(job_id: impl Into<String>, report_type: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            report_type: report_type.into(),
            parameters: Map::new(),
            timestamp: timestamp::now(),
        }
    }
}

impl Event for GenerateReportJob {
    const NAME: &'static str = "GenerateReportJob";
}

/// Published when a report job finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportGenerated {
    pub job_id: String,
    pub report_hash: String,
    pub duration_seconds: f64,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub timestamp: Timestamp,
}

impl ReportGenerated {
    pub fn new(
        job_id: impl Into<String>,
        report_hash: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            report_hash: report_hash.into(),
            duration_seconds,
            timestamp: timestamp::now(),
        }
    }
}

impl Event for ReportGenerated {
    const NAME: &'static str = "ReportGenerated";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_default_to_empty() {
        let body = br#"{"job_id": "job_1", "report_type": "sales"}"#;
        let job = GenerateReportJob::decode(body).unwrap();
        assert!(job.parameters.is_empty());
    }

    #[test]
    fn test_parameters_must_be_an_object() {
        let body = br#"{"job_id": "job_1", "report_type": "sales", "parameters": []}"#;
        let err = GenerateReportJob::decode(body).unwrap_err();
        assert_eq!(err.field, "parameters");
    }

    #[test]
    fn test_roundtrip_with_parameters() {
        let mut job = GenerateReportJob::new("job_1", "sales");
        job.parameters
            .insert("region".to_string(), Value::String("emea".to_string()));
        let bytes = job.encode().unwrap();
        assert_eq!(GenerateReportJob::decode(&bytes).unwrap(), job);
    }
}
