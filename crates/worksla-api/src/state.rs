use std::sync::Arc;

use crate::config::Config;
use crate::repo::{AssigneeRepo, SettingsRepo, WorkItemRepo};
use crate::sync::SyncEngine;
use crate::upstream::UpstreamClient;

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub work_items: WorkItemRepo,
    pub assignees: AssigneeRepo,
    pub settings: SettingsRepo,
    pub upstream: Arc<UpstreamClient>,
    pub sync: Arc<SyncEngine>,
}
