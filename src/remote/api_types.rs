//! Request and response shapes of the TickTick open API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::cache::Payload;

/// Fields accepted when creating a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
  pub project_id: String,
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<i32>,
  #[serde(serialize_with = "serialize_api_date")]
  pub start_date: DateTime<Utc>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    serialize_with = "serialize_opt_api_date"
  )]
  pub due_date: Option<DateTime<Utc>>,
  pub is_all_day: bool,
  pub time_zone: String,
}

impl NewTask {
  /// A timed task in UTC, starting now.
  pub fn new(project_id: impl Into<String>, title: impl Into<String>) -> Self {
    Self {
      project_id: project_id.into(),
      title: title.into(),
      content: None,
      priority: None,
      start_date: Utc::now(),
      due_date: None,
      is_all_day: false,
      time_zone: "UTC".to_string(),
    }
  }

  pub fn with_content(mut self, content: impl Into<String>) -> Self {
    self.content = Some(content.into());
    self
  }

  pub fn with_priority(mut self, priority: i32) -> Self {
    self.priority = Some(priority);
    self
  }

  pub fn with_start_date(mut self, start: DateTime<Utc>) -> Self {
    self.start_date = start;
    self
  }

  pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
    self.due_date = Some(due);
    self
  }
}

/// Fields accepted when creating a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
}

impl NewProject {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      color: None,
    }
  }

  pub fn with_color(mut self, color: impl Into<String>) -> Self {
    self.color = Some(color.into());
    self
  }
}

/// Response of `GET /project/{id}/data`. Only the open tasks are kept.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiProjectData {
  #[serde(default)]
  pub tasks: Vec<Payload>,
}

/// The API expects `yyyy-MM-dd'T'HH:mm:ssZ`, e.g. `2024-03-01T09:00:00+0000`.
const API_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

fn serialize_api_date<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_str(&date.format(API_DATE_FORMAT).to_string())
}

fn serialize_opt_api_date<S: Serializer>(
  date: &Option<DateTime<Utc>>,
  s: S,
) -> Result<S::Ok, S::Error> {
  match date {
    Some(date) => serialize_api_date(date, s),
    None => s.serialize_none(),
  }
}
