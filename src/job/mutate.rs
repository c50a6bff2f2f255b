use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nomad_api::job::{update_object, FIELD_CONFIG, FIELD_ENV};
use nomad_api::JobSpec;

pub const META_DEPLOY_USER: &str = "deploy-user";
pub const META_DEPLOY_BRANCH: &str = "deploy-branch";
pub const META_DEPLOY_AT: &str = "deploy-at";

/// `YYYY-MM-DD HH:MM:SS <zone>` in local time. chrono has no zone names
/// for `Local`, so `<zone>` is the UTC offset, e.g. `+02:00`.
pub const DEPLOY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Names of the two environment variables that carry the deployed tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionEnv {
    pub version_var: String,
    pub release_var: String,
}

impl Default for VersionEnv {
    fn default() -> Self {
        Self {
            version_var: "DD_VERSION".to_string(),
            release_var: "RELEASE_VERSION".to_string(),
        }
    }
}

/// Point every task at `image:tag` using the default version variables.
pub fn apply_image_tag(spec: JobSpec, image: &str, tag: &str) -> JobSpec {
    apply_image_tag_with(spec, image, tag, &VersionEnv::default())
}

/// Point every task at `image:tag` and set both version variables to `tag`.
///
/// Task `Config` and `Env` are created when missing; no other field changes.
pub fn apply_image_tag_with(mut spec: JobSpec, image: &str, tag: &str, env: &VersionEnv) -> JobSpec {
    let reference = format!("{}:{}", image, tag);

    for task in spec.tasks_mut() {
        update_object(task, FIELD_CONFIG, |config| {
            config.insert("image".to_string(), Value::String(reference.clone()));
        });
        update_object(task, FIELD_ENV, |vars| {
            vars.insert(env.version_var.clone(), Value::String(tag.to_string()));
            vars.insert(env.release_var.clone(), Value::String(tag.to_string()));
        });
    }

    spec
}

/// Record who deployed what and when, stamped with the current local time.
pub fn apply_deploy_metadata(spec: JobSpec, user: Option<&str>, branch: Option<&str>) -> JobSpec {
    apply_deploy_metadata_at(spec, user, branch, Local::now())
}

/// Like [`apply_deploy_metadata`] with an explicit timestamp.
///
/// Empty user or branch values leave the existing entries untouched.
pub fn apply_deploy_metadata_at(
    mut spec: JobSpec,
    user: Option<&str>,
    branch: Option<&str>,
    at: DateTime<Local>,
) -> JobSpec {
    spec.update_meta(|meta| {
        if let Some(user) = user.filter(|u| !u.is_empty()) {
            meta.insert(META_DEPLOY_USER.to_string(), Value::String(user.to_string()));
        }
        if let Some(branch) = branch.filter(|b| !b.is_empty()) {
            meta.insert(META_DEPLOY_BRANCH.to_string(), Value::String(branch.to_string()));
        }
        meta.insert(
            META_DEPLOY_AT.to_string(),
            Value::String(at.format(DEPLOY_TIME_FORMAT).to_string()),
        );
    });

    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn job(groups: usize, tasks: usize) -> JobSpec {
        let groups: Vec<Value> = (0..groups)
            .map(|g| {
                let tasks: Vec<Value> = (0..tasks)
                    .map(|t| {
                        json!({
                            "Name": format!("task-{}-{}", g, t),
                            "Driver": "docker",
                            "Config": {"image": "app:old", "ports": ["http"]},
                            "Env": {"KEEP": "me"},
                            "Resources": {"CPU": 100}
                        })
                    })
                    .collect();
                json!({"Name": format!("group-{}", g), "Count": 1, "Tasks": tasks})
            })
            .collect();
        JobSpec::from_value(json!({
            "ID": "web",
            "Name": "web",
            "Datacenters": ["dc1"],
            "TaskGroups": groups
        }))
        .unwrap()
    }

    fn strip_owned_fields(spec: &JobSpec) -> Value {
        let mut value = spec.clone().into_value();
        for group in value["TaskGroups"].as_array_mut().unwrap() {
            for task in group["Tasks"].as_array_mut().unwrap() {
                task["Config"].as_object_mut().unwrap().remove("image");
                let env = task["Env"].as_object_mut().unwrap();
                env.remove("DD_VERSION");
                env.remove("RELEASE_VERSION");
            }
        }
        value
    }

    #[test]
    fn test_single_task_scenario() {
        let spec = JobSpec::from_value(json!({
            "Name": "web",
            "TaskGroups": [{"Name": "api", "Tasks": [{"Name": "server", "Config": {"image": "app:old"}}]}]
        }))
        .unwrap();

        let spec = apply_image_tag(spec, "app", "v2");
        let task = spec.tasks().next().unwrap();

        assert_eq!(task["Config"]["image"], "app:v2");
        assert_eq!(task["Env"]["DD_VERSION"], "v2");
        assert_eq!(task["Env"]["RELEASE_VERSION"], "v2");
    }

    #[test]
    fn test_counts_across_groups_and_tasks() {
        let (n, m) = (3, 4);
        let spec = apply_image_tag(job(n, m), "registry/app", "1.2.3");

        let images = spec
            .tasks()
            .filter(|t| t["Config"]["image"] == "registry/app:1.2.3")
            .count();
        let env_entries: usize = spec
            .tasks()
            .map(|t| {
                t["Env"]
                    .as_object()
                    .unwrap()
                    .values()
                    .filter(|v| *v == "1.2.3")
                    .count()
            })
            .sum();

        assert_eq!(images, n * m);
        assert_eq!(env_entries, 2 * n * m);
    }

    #[test]
    fn test_other_fields_unchanged() {
        let before = job(2, 2);
        let after = apply_image_tag(before.clone(), "app", "v9");

        assert_eq!(strip_owned_fields(&before), strip_owned_fields(&after));
        assert_eq!(after.tasks().next().unwrap()["Env"]["KEEP"], "me");
    }

    #[test]
    fn test_creates_missing_config_and_env() {
        let spec = JobSpec::from_value(json!({
            "TaskGroups": [{"Tasks": [{"Name": "bare", "Env": null}]}]
        }))
        .unwrap();

        let spec = apply_image_tag(spec, "app", "v1");
        let task = spec.tasks().next().unwrap();
        assert_eq!(task["Config"]["image"], "app:v1");
        assert_eq!(task["Env"]["DD_VERSION"], "v1");
    }

    #[test]
    fn test_custom_version_env() {
        let env = VersionEnv {
            version_var: "APP_VERSION".to_string(),
            release_var: "SENTRY_RELEASE".to_string(),
        };
        let spec = apply_image_tag_with(job(1, 1), "app", "v3", &env);
        let task = spec.tasks().next().unwrap();

        assert_eq!(task["Env"]["APP_VERSION"], "v3");
        assert_eq!(task["Env"]["SENTRY_RELEASE"], "v3");
        assert!(task["Env"].get("DD_VERSION").is_none());
    }

    #[test]
    fn test_deploy_metadata() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let spec = apply_deploy_metadata_at(job(1, 1), Some("alice"), Some("main"), at);
        let meta = spec.meta().unwrap();

        assert_eq!(meta[META_DEPLOY_USER], "alice");
        assert_eq!(meta[META_DEPLOY_BRANCH], "main");
        let stamp = meta[META_DEPLOY_AT].as_str().unwrap();
        assert!(stamp.starts_with("2024-03-09 14:05:07 "), "got {}", stamp);
    }

    #[test]
    fn test_deploy_at_zone_is_utc_offset() {
        let spec = apply_deploy_metadata(job(1, 1), None, None);
        let stamp = spec.meta().unwrap()[META_DEPLOY_AT].as_str().unwrap().to_string();

        let (_, zone) = stamp.rsplit_once(' ').unwrap();
        let bytes = zone.as_bytes();
        assert_eq!(bytes.len(), 6, "got {}", stamp);
        assert!(bytes[0] == b'+' || bytes[0] == b'-', "got {}", stamp);
        assert_eq!(bytes[3], b':', "got {}", stamp);
        assert!(zone[1..3].chars().chain(zone[4..].chars()).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_version_env_fills_missing_field() {
        let env: VersionEnv = serde_json::from_value(json!({"version_var": "APP_VERSION"})).unwrap();
        assert_eq!(env.version_var, "APP_VERSION");
        assert_eq!(env.release_var, "RELEASE_VERSION");

        let env: VersionEnv = toml::from_str(r#"release_var = "SENTRY_RELEASE""#).unwrap();
        assert_eq!(env.version_var, "DD_VERSION");
        assert_eq!(env.release_var, "SENTRY_RELEASE");
    }

    #[test]
    fn test_deploy_metadata_skips_empty_values() {
        let mut raw = job(1, 1).into_value();
        raw["Meta"] = json!({"deploy-user": "previous", "owner": "team-a"});
        let spec = JobSpec::from_value(raw).unwrap();

        let spec = apply_deploy_metadata(spec, Some(""), None);
        let meta = spec.meta().unwrap();

        assert_eq!(meta[META_DEPLOY_USER], "previous");
        assert!(meta.get(META_DEPLOY_BRANCH).is_none());
        assert_eq!(meta["owner"], "team-a");
        assert!(meta.get(META_DEPLOY_AT).is_some());
    }

    #[test]
    fn test_deploy_metadata_idempotent_except_timestamp() {
        let t1 = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap();

        let once = apply_deploy_metadata_at(job(1, 1), Some("bob"), Some("dev"), t1);
        let twice = apply_deploy_metadata_at(once.clone(), Some("bob"), Some("dev"), t2);

        let (m1, m2) = (once.meta().unwrap(), twice.meta().unwrap());
        assert_eq!(m1[META_DEPLOY_USER], m2[META_DEPLOY_USER]);
        assert_eq!(m1[META_DEPLOY_BRANCH], m2[META_DEPLOY_BRANCH]);
        assert_ne!(m1[META_DEPLOY_AT], m2[META_DEPLOY_AT]);
        assert!(m1[META_DEPLOY_AT].as_str().unwrap() < m2[META_DEPLOY_AT].as_str().unwrap());
    }
}
