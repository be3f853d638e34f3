use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{DashboardSummary, InsightsSummary, ScanReport};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{ReportStore, RepositoryError};
use crate::insights;
use crate::storage::image_storage::ImageStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryDeletion {
    pub reports_deleted: usize,
    pub images_deleted: usize,
}

/// Read and bulk-delete paths over one owner's reports.
#[derive(Clone)]
pub struct ScanHistory {
    reports: Arc<dyn ReportStore>,
    images: ImageStorage,
}

impl ScanHistory {
    pub fn new(reports: Arc<dyn ReportStore>, images: ImageStorage) -> Self {
        Self { reports, images }
    }

    pub async fn list(
        &self,
        owner_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<ScanReport>, RepositoryError> {
        self.reports.list_by_owner(owner_id, limit).await
    }

    pub async fn insights(&self, owner_id: Uuid) -> Result<InsightsSummary, RepositoryError> {
        let reports = self.reports.list_by_owner(owner_id, None).await?;
        Ok(insights::summarize(&reports))
    }

    pub async fn dashboard(
        &self,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<DashboardSummary, RepositoryError> {
        let reports = self.reports.list_by_owner(owner_id, None).await?;
        Ok(insights::dashboard(&reports, now))
    }

    /// Deletes every report of the owner, then their stored images. Image
    /// cleanup failures are logged and do not fail the call.
    pub async fn delete_all(&self, owner_id: Uuid) -> Result<HistoryDeletion, RepositoryError> {
        let reports_deleted = self.reports.delete_all_by_owner(owner_id).await?;
        log::info!("Deleted {} reports for user {}", reports_deleted, owner_id);

        let images_deleted = match self.images.purge_owner(owner_id).await {
            Ok(count) => count,
            Err(e) => {
                log::error!("Failed to delete stored images for user {}: {}", owner_id, e);
                0
            }
        };

        Ok(HistoryDeletion {
            reports_deleted,
            images_deleted,
        })
    }
}
