//! # Configuration Payload
//!
//! The client-submitted project graph. Ids may be temporary (zero or
//! negative) for entities created in this save, or real (positive) database
//! ids; the reconciler rewrites every edge reference exactly once after all
//! nodes of a type are persisted. The schema is strict: unknown keys are
//! rejected.

use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::models::plan::{StageDraft, TaskDraft};

/// How a task's submission is approved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalType {
    /// No approval: submit completes the task directly
    None,
    /// A fixed, explicit list of organization positions
    Specified,
    /// An explicit list walked strictly in order
    Sequential,
}

impl ApprovalType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Specified => "specified",
            Self::Sequential => "sequential",
        }
    }

    /// Parse a stored approval type column value
    pub fn from_db(value: Option<&str>) -> Option<Self> {
        match value {
            Some("none") => Some(Self::None),
            Some("specified") => Some(Self::Specified),
            Some("sequential") => Some(Self::Sequential),
            _ => None,
        }
    }

    /// Whether this type requires a non-empty approval node list
    pub fn requires_nodes(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// The full graph a client submits for one project
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskConfigPayload {
    #[serde(deserialize_with = "deserialize_project_id")]
    pub project_id: i64,
    #[serde(default)]
    pub stages: Vec<StagePayload>,
    #[serde(default)]
    pub tasks: Vec<TaskPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StagePayload {
    pub id: i64,
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub start_time: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub end_time: Option<NaiveDate>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub predecessor_stages: Vec<i64>,
    #[serde(default)]
    pub successor_stages: Vec<i64>,
    #[serde(default)]
    pub position: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "deserialize_optional_project_id")]
    pub project_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskPayload {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub start_time: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub end_time: Option<NaiveDate>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub job_number: Option<String>,
    #[serde(default)]
    pub stage_id: Option<i64>,
    #[serde(default)]
    pub predecessor_tasks: Vec<i64>,
    #[serde(default)]
    pub successor_tasks: Vec<i64>,
    #[serde(default)]
    pub position: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "deserialize_optional_project_id")]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub approval_type: Option<ApprovalType>,
    #[serde(default)]
    pub approval_nodes: Vec<i64>,
}

impl StagePayload {
    pub fn is_temp(&self) -> bool {
        self.id <= 0
    }

    /// Build the write-side image. Edge lists are carried verbatim (possibly
    /// still temporary); the reconciler rewrites them in its second pass.
    pub fn to_draft(&self, project_id: i64) -> StageDraft {
        StageDraft {
            project_id,
            name: self.name.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration,
            predecessor_stages: self.predecessor_stages.clone(),
            successor_stages: self.successor_stages.clone(),
            position: self.position.clone(),
        }
    }
}

impl TaskPayload {
    pub fn is_temp(&self) -> bool {
        self.id <= 0
    }

    /// Build the write-side image with the stage reference already resolved
    /// to a real id (or None when unresolvable)
    pub fn to_draft(&self, project_id: i64, resolved_stage_id: Option<i64>) -> TaskDraft {
        let job_number = self
            .job_number
            .as_deref()
            .map(str::trim)
            .filter(|j| !j.is_empty())
            .map(str::to_string);
        TaskDraft {
            project_id,
            stage_id: resolved_stage_id,
            name: self.name.clone(),
            description: self.description.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration,
            job_number,
            predecessor_tasks: self.predecessor_tasks.clone(),
            successor_tasks: self.successor_tasks.clone(),
            position: self.position.clone(),
            approval_type: self.approval_type.map(|t| t.as_str().to_string()),
            approval_nodes: self.approval_nodes.clone(),
        }
    }
}

fn parse_id_str<E: de::Error>(value: &str) -> Result<i64, E> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| E::custom(format!("expected a numeric id, got '{value}'")))
}

struct ProjectIdVisitor;

impl de::Visitor<'_> for ProjectIdVisitor {
    type Value = i64;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("an integer or numeric string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v).map_err(|_| E::custom("project id out of range"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        parse_id_str(v)
    }
}

fn deserialize_project_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(ProjectIdVisitor)
}

fn deserialize_optional_project_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Int(i64),
        Text(String),
    }

    match Option::<IdRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IdRepr::Int(v)) => Ok(Some(v)),
        Some(IdRepr::Text(s)) => parse_id_str(&s).map(Some),
    }
}

/// Dates arrive as `YYYY-MM-DD`; an empty string means unset
fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| de::Error::custom(format!("dates must be YYYY-MM-DD, got '{s}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_full_payload() {
        let payload: TaskConfigPayload = serde_json::from_value(json!({
            "projectId": 100,
            "stages": [{
                "id": -1,
                "name": "S1",
                "startTime": "2025-01-01",
                "endTime": "2025-01-05",
                "predecessorStages": [],
                "successorStages": [-2],
                "projectId": 100
            }],
            "tasks": [{
                "id": -10,
                "name": "T1",
                "stageId": -1,
                "jobNumber": "E001",
                "startTime": "2025-01-01",
                "endTime": "2025-01-05",
                "approvalType": "specified",
                "approvalNodes": [500]
            }]
        }))
        .unwrap();

        assert_eq!(payload.project_id, 100);
        assert_eq!(payload.stages.len(), 1);
        assert!(payload.stages[0].is_temp());
        assert_eq!(payload.stages[0].successor_stages, vec![-2]);
        assert_eq!(payload.tasks[0].approval_type, Some(ApprovalType::Specified));
        assert_eq!(payload.tasks[0].approval_nodes, vec![500]);
    }

    #[test]
    fn accepts_numeric_string_project_id() {
        let payload: TaskConfigPayload =
            serde_json::from_value(json!({"projectId": "42", "stages": [], "tasks": []})).unwrap();
        assert_eq!(payload.project_id, 42);
    }

    #[test]
    fn rejects_non_numeric_project_id() {
        let result: Result<TaskConfigPayload, _> =
            serde_json::from_value(json!({"projectId": "abc", "stages": [], "tasks": []}));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        let result: Result<TaskConfigPayload, _> = serde_json::from_value(json!({
            "projectId": 1,
            "stages": [],
            "tasks": [],
            "extra": true
        }));
        assert!(result.is_err());
    }

    #[test]
    fn empty_date_string_means_unset() {
        let payload: TaskConfigPayload = serde_json::from_value(json!({
            "projectId": 1,
            "stages": [{"id": -1, "name": "S", "startTime": ""}],
            "tasks": []
        }))
        .unwrap();
        assert_eq!(payload.stages[0].start_time, None);
    }

    #[test]
    fn rejects_malformed_dates() {
        let result: Result<TaskConfigPayload, _> = serde_json::from_value(json!({
            "projectId": 1,
            "stages": [{"id": -1, "name": "S", "startTime": "01/05/2025"}],
            "tasks": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn blank_job_number_becomes_none_in_draft() {
        let task = TaskPayload {
            id: -1,
            name: "T".to_string(),
            description: None,
            start_time: None,
            end_time: None,
            duration: None,
            job_number: Some("  ".to_string()),
            stage_id: None,
            predecessor_tasks: vec![],
            successor_tasks: vec![],
            position: None,
            project_id: None,
            approval_type: Some(ApprovalType::None),
            approval_nodes: vec![],
        };
        let draft = task.to_draft(1, None);
        assert_eq!(draft.job_number, None);
        assert_eq!(draft.approval_type.as_deref(), Some("none"));
    }

    #[test]
    fn approval_type_round_trips() {
        for (ty, s) in [
            (ApprovalType::None, "none"),
            (ApprovalType::Specified, "specified"),
            (ApprovalType::Sequential, "sequential"),
        ] {
            assert_eq!(ty.as_str(), s);
            assert_eq!(ApprovalType::from_db(Some(s)), Some(ty));
        }
        assert_eq!(ApprovalType::from_db(None), None);
        assert_eq!(ApprovalType::from_db(Some("parallel")), None);
    }
}
