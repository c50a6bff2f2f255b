//! Job documents.
//!
//! A job is kept as an ordered JSON object so that every field the
//! scheduler returns survives a fetch → edit → submit round trip. Only the
//! fields a deployment touches get typed accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::JobSpecError;

pub const FIELD_ID: &str = "ID";
pub const FIELD_NAME: &str = "Name";
pub const FIELD_TASK_GROUPS: &str = "TaskGroups";
pub const FIELD_TASKS: &str = "Tasks";
pub const FIELD_CONFIG: &str = "Config";
pub const FIELD_ENV: &str = "Env";
pub const FIELD_META: &str = "Meta";
pub const FIELD_MODIFY_INDEX: &str = "JobModifyIndex";

/// Validated job document.
///
/// Invariant: `TaskGroups` is an array of objects, and each group's `Tasks`
/// is an array of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct JobSpec(Map<String, Value>);

impl JobSpec {
    /// Validate a raw document.
    pub fn from_value(value: Value) -> Result<Self, JobSpecError> {
        let Value::Object(map) = value else {
            return Err(JobSpecError::NotAnObject);
        };

        let groups = map
            .get(FIELD_TASK_GROUPS)
            .ok_or_else(|| JobSpecError::MissingField(FIELD_TASK_GROUPS.to_string()))?
            .as_array()
            .ok_or_else(|| JobSpecError::InvalidField {
                field: FIELD_TASK_GROUPS.to_string(),
                expected: "an array",
            })?;

        for (i, group) in groups.iter().enumerate() {
            let field = format!("{}[{}]", FIELD_TASK_GROUPS, i);
            let group = group.as_object().ok_or_else(|| JobSpecError::InvalidField {
                field: field.clone(),
                expected: "an object",
            })?;
            let tasks = group
                .get(FIELD_TASKS)
                .ok_or_else(|| JobSpecError::MissingField(format!("{}.{}", field, FIELD_TASKS)))?
                .as_array()
                .ok_or_else(|| JobSpecError::InvalidField {
                    field: format!("{}.{}", field, FIELD_TASKS),
                    expected: "an array",
                })?;
            if let Some(j) = tasks.iter().position(|t| !t.is_object()) {
                return Err(JobSpecError::InvalidField {
                    field: format!("{}.{}[{}]", field, FIELD_TASKS, j),
                    expected: "an object",
                });
            }
        }

        Ok(Self(map))
    }

    /// Job name, falling back to the job ID.
    pub fn name(&self) -> Option<&str> {
        self.0
            .get(FIELD_NAME)
            .or_else(|| self.0.get(FIELD_ID))
            .and_then(Value::as_str)
    }

    /// Index used for optimistic-concurrency registration.
    pub fn modify_index(&self) -> Option<u64> {
        self.0.get(FIELD_MODIFY_INDEX).and_then(Value::as_u64)
    }

    pub fn task_group_count(&self) -> usize {
        self.groups().count()
    }

    pub fn task_count(&self) -> usize {
        self.tasks().count()
    }

    /// Every task object, group by group.
    pub fn tasks(&self) -> impl Iterator<Item = &Map<String, Value>> {
        self.groups()
            .filter_map(|g| g.get(FIELD_TASKS).and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_object)
    }

    /// Mutable access to every task object, group by group.
    pub fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Map<String, Value>> {
        self.0
            .get_mut(FIELD_TASK_GROUPS)
            .and_then(Value::as_array_mut)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object_mut)
            .filter_map(|g| g.get_mut(FIELD_TASKS).and_then(Value::as_array_mut))
            .flatten()
            .filter_map(Value::as_object_mut)
    }

    /// Edit job metadata, created if absent or null.
    pub fn update_meta(&mut self, f: impl FnOnce(&mut Map<String, Value>)) {
        update_object(&mut self.0, FIELD_META, f)
    }

    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.0.get(FIELD_META).and_then(Value::as_object)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn groups(&self) -> impl Iterator<Item = &Map<String, Value>> {
        self.0
            .get(FIELD_TASK_GROUPS)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    }
}

/// Edit the object stored under `key` in place. Anything that is not an
/// object is replaced with an empty one; the key keeps its position.
pub fn update_object(map: &mut Map<String, Value>, key: &str, f: impl FnOnce(&mut Map<String, Value>)) {
    let slot = map.entry(key.to_string()).or_insert(Value::Null);
    let mut inner = match slot.take() {
        Value::Object(inner) => inner,
        _ => Map::new(),
    };
    f(&mut inner);
    *slot = Value::Object(inner);
}

impl TryFrom<Value> for JobSpec {
    type Error = JobSpecError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<JobSpec> for Value {
    fn from(spec: JobSpec) -> Self {
        spec.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "ID": "web",
            "Name": "web",
            "JobModifyIndex": 42,
            "TaskGroups": [
                {"Name": "api", "Tasks": [{"Name": "server", "Config": {"image": "app:old"}}]},
                {"Name": "worker", "Tasks": [{"Name": "a"}, {"Name": "b"}]}
            ]
        })
    }

    #[test]
    fn test_accessors() {
        let spec = JobSpec::from_value(sample()).unwrap();
        assert_eq!(spec.name(), Some("web"));
        assert_eq!(spec.modify_index(), Some(42));
        assert_eq!(spec.task_group_count(), 2);
        assert_eq!(spec.task_count(), 3);
        assert!(spec.meta().is_none());
    }

    #[test]
    fn test_rejects_non_object() {
        assert_eq!(JobSpec::from_value(json!([1, 2])), Err(JobSpecError::NotAnObject));
    }

    #[test]
    fn test_rejects_missing_task_groups() {
        let err = JobSpec::from_value(json!({"ID": "web"})).unwrap_err();
        assert_eq!(err, JobSpecError::MissingField("TaskGroups".to_string()));
    }

    #[test]
    fn test_rejects_non_object_task() {
        let err = JobSpec::from_value(json!({
            "TaskGroups": [{"Tasks": [{"Name": "ok"}, "bad"]}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("TaskGroups[0].Tasks[1]"));
    }

    #[test]
    fn test_update_meta_replaces_null() {
        let mut raw = sample();
        raw["Meta"] = Value::Null;
        let mut spec = JobSpec::from_value(raw).unwrap();

        spec.update_meta(|meta| {
            meta.insert("k".to_string(), json!("v"));
        });
        assert_eq!(spec.meta().unwrap()["k"], "v");
    }

    #[test]
    fn test_update_object_keeps_position_and_contents() {
        let mut map: Map<String, Value> =
            serde_json::from_str(r#"{"A":1,"Env":{"KEEP":"me"},"Config":"bogus","Z":2}"#).unwrap();

        update_object(&mut map, "Env", |env| {
            env.insert("NEW".to_string(), json!("x"));
        });
        update_object(&mut map, "Config", |config| {
            config.insert("image".to_string(), json!("app:v1"));
        });
        update_object(&mut map, "Missing", |_| {});

        assert_eq!(map["Env"], json!({"KEEP": "me", "NEW": "x"}));
        assert_eq!(map["Config"], json!({"image": "app:v1"}));
        assert_eq!(map["Missing"], json!({}));
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["A", "Env", "Config", "Z", "Missing"]);
    }

    #[test]
    fn test_field_order_preserved() {
        let spec: JobSpec = serde_json::from_str(
            r#"{"Zeta":1,"TaskGroups":[],"Alpha":2}"#,
        )
        .unwrap();
        let out = serde_json::to_string(&spec).unwrap();
        assert_eq!(out, r#"{"Zeta":1,"TaskGroups":[],"Alpha":2}"#);
    }
}
