//! Job spec mutation
//!
//! Pure edits applied to a fetched job before it is resubmitted: the
//! container image/tag of every task, and deployment metadata.

mod mutate;

pub use mutate::{
    apply_deploy_metadata, apply_deploy_metadata_at, apply_image_tag, apply_image_tag_with,
    VersionEnv, DEPLOY_TIME_FORMAT, META_DEPLOY_AT, META_DEPLOY_BRANCH, META_DEPLOY_USER,
};
