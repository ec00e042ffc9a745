use std::sync::Arc;

use crate::application::content::ContentService;

/// Shared context passed to job workers.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub content: Arc<ContentService>,
}
