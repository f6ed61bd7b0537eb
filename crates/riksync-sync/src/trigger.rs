//! Inbound trigger and response contract
//!
//! A [`SyncRequest`] arrives from the CLI, the daemon schedule or any
//! caller speaking the JSON contract; [`SyncOrchestrator::handle`] turns
//! it into a preview, a single cycle or a strategic plan and answers with
//! a [`SyncResponse`].
//!
//! Both shapes use camelCase keys; absent response fields are omitted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use riksync_core::domain::{DomainError, ResourceType};

use crate::engine::{CycleOptions, PhaseResult, PlanOptions, PreviewResult, SyncOrchestrator};

/// Target of a sync request: one resource type or all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceSelector {
    All,
    One(ResourceType),
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceSelector::All => f.write_str("all"),
            ResourceSelector::One(r) => write!(f, "{}", r),
        }
    }
}

impl FromStr for ResourceSelector {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(ResourceSelector::All)
        } else {
            s.parse().map(ResourceSelector::One)
        }
    }
}

impl TryFrom<String> for ResourceSelector {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceSelector> for String {
    fn from(selector: ResourceSelector) -> Self {
        selector.to_string()
    }
}

/// A sync invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub resource_type: ResourceSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
    /// Build the request(s) without fetching
    #[serde(default)]
    pub preview: bool,
    /// Run the multi-phase plan
    #[serde(default)]
    pub strategic_plan: bool,
}

impl SyncRequest {
    pub fn new(resource_type: ResourceSelector) -> Self {
        Self {
            resource_type,
            batch_size: None,
            filters: BTreeMap::new(),
            preview: false,
            strategic_plan: false,
        }
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Result of a sync invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_fetched: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<Vec<PreviewResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phases: Option<Vec<PhaseResult>>,
}

impl SyncResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl SyncOrchestrator {
    /// Dispatches a request.
    ///
    /// - `preview`: requests are built for the target (every type in
    ///   priority order for `all`), nothing is fetched
    /// - `strategicPlan` or `all`: the multi-phase plan runs
    /// - a single type: one cycle runs
    ///
    /// Errors never escape; they are reported through `success: false`.
    pub async fn handle(&self, request: SyncRequest, cancel: &CancellationToken) -> SyncResponse {
        let cycle_options = CycleOptions {
            filters: request.filters.clone(),
            batch_size: request.batch_size,
        };

        if request.preview {
            let targets = match request.resource_type {
                ResourceSelector::All => self.config().resources.in_priority_order(),
                ResourceSelector::One(r) => vec![r],
            };
            let mut previews = Vec::with_capacity(targets.len());
            for resource_type in targets {
                match self.preview(resource_type, &cycle_options).await {
                    Ok(preview) => previews.push(preview),
                    Err(err) => return SyncResponse::failure(err.to_string()),
                }
            }
            return SyncResponse {
                success: true,
                preview: Some(previews),
                ..SyncResponse::default()
            };
        }

        match request.resource_type {
            ResourceSelector::One(resource_type) if !request.strategic_plan => {
                match self.run_cycle(resource_type, &cycle_options, cancel).await {
                    Ok(result) => SyncResponse {
                        success: true,
                        records_processed: Some(result.records_processed),
                        is_complete: Some(result.is_complete),
                        total_fetched: Some(result.total_fetched),
                        ..SyncResponse::default()
                    },
                    Err(err) => SyncResponse::failure(err.to_string()),
                }
            }
            _ => {
                let plan_options = PlanOptions {
                    filters: request.filters,
                    batch_size: request.batch_size,
                };
                let summary = self.run_strategic_plan(&plan_options, cancel).await;
                let error = match (summary.failure_message(), summary.cancelled) {
                    (Some(message), _) => Some(message),
                    (None, true) => Some(crate::CANCELLED_MESSAGE.to_string()),
                    (None, false) => None,
                };
                SyncResponse {
                    success: error.is_none(),
                    records_processed: Some(summary.total_processed),
                    error,
                    phases: Some(summary.phases),
                    ..SyncResponse::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_minimal() {
        let request = SyncRequest::from_json(r#"{"resourceType": "speeches"}"#).unwrap();
        assert_eq!(request, SyncRequest::new(ResourceSelector::One(ResourceType::Speeches)));
    }

    #[test]
    fn test_parse_request_full() {
        let request = SyncRequest::from_json(
            r#"{
                "resourceType": "all",
                "batchSize": 50,
                "filters": {"parti": "S", "anf_datum_from": "2024-01-01"},
                "preview": true,
                "strategicPlan": true
            }"#,
        )
        .unwrap();

        assert_eq!(request.resource_type, ResourceSelector::All);
        assert_eq!(request.batch_size, Some(50));
        assert_eq!(request.filters.get("parti").map(String::as_str), Some("S"));
        assert!(request.preview);
        assert!(request.strategic_plan);
    }

    #[test]
    fn test_unknown_resource_type_is_rejected() {
        let err = SyncRequest::from_json(r#"{"resourceType": "committees"}"#).unwrap_err();
        assert!(err.to_string().contains("committees"));
    }

    #[test]
    fn test_selector_round_trips_through_string() {
        assert_eq!("ALL".parse::<ResourceSelector>().unwrap(), ResourceSelector::All);
        assert_eq!(ResourceSelector::One(ResourceType::Votes).to_string(), "votes");
    }

    #[test]
    fn test_response_omits_absent_fields() {
        let response = SyncResponse {
            success: true,
            records_processed: Some(100),
            is_complete: Some(false),
            total_fetched: Some(300),
            ..SyncResponse::default()
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "success": true,
                "recordsProcessed": 100,
                "isComplete": false,
                "totalFetched": 300
            })
        );

        assert_eq!(
            serde_json::to_value(SyncResponse::failure("Sync cancelled")).unwrap(),
            serde_json::json!({"success": false, "error": "Sync cancelled"})
        );
    }

    #[test]
    fn test_response_phases_use_camel_case_keys() {
        let response = SyncResponse {
            success: false,
            records_processed: Some(0),
            error: Some("documents: HTTP 500".into()),
            phases: Some(vec![
                PhaseResult {
                    resource_type: ResourceType::Members,
                    outcome: crate::PhaseOutcome::Skipped,
                },
                PhaseResult {
                    resource_type: ResourceType::Documents,
                    outcome: crate::PhaseOutcome::Failed {
                        error: "HTTP 500".into(),
                    },
                },
                PhaseResult {
                    resource_type: ResourceType::Speeches,
                    outcome: crate::PhaseOutcome::Completed {
                        records_processed: 0,
                        is_complete: true,
                    },
                },
            ]),
            ..SyncResponse::default()
        };

        assert_eq!(
            serde_json::to_value(&response).unwrap()["phases"],
            serde_json::json!([
                {"resourceType": "members", "status": "skipped"},
                {"resourceType": "documents", "status": "failed", "error": "HTTP 500"},
                {
                    "resourceType": "speeches",
                    "status": "completed",
                    "recordsProcessed": 0,
                    "isComplete": true
                }
            ])
        );
    }
}
