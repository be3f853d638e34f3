pub mod dynamodb_repository;
pub mod memory_repository;
pub mod models;

use async_trait::async_trait;
use shared::ScanReport;
use uuid::Uuid;

use models::User;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Item not found")]
    NotFound,
    #[error("Invalid data format: {0}")]
    InvalidData(String),
    #[error("Deleted {deleted} of {total} items: {reason}")]
    PartialDelete {
        deleted: usize,
        total: usize,
        reason: String,
    },
}

/// Owner-scoped report collection. Every read and write is keyed by the
/// owner id, so there is no path to another user's reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Writes one fully formed report and returns its id.
    async fn save(&self, report: &ScanReport) -> Result<Uuid, RepositoryError>;

    /// Newest first. `limit` bounds the result to the most recent N reports.
    /// Each call runs a fresh query.
    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<ScanReport>, RepositoryError>;

    /// Best effort, not transactional. Returns the number of reports removed.
    async fn delete_all_by_owner(&self, owner_id: Uuid) -> Result<usize, RepositoryError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<(), RepositoryError>;

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, RepositoryError>;

    async fn get_user_by_cognito_sub(
        &self,
        cognito_sub: &str,
    ) -> Result<Option<User>, RepositoryError>;

    async fn update_user(&self, user: &User) -> Result<(), RepositoryError>;

    async fn delete_user(&self, user_id: Uuid) -> Result<(), RepositoryError>;

    async fn get_user(&self, user_id: Uuid) -> Result<User, RepositoryError> {
        self.get_user_by_id(user_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }
}
