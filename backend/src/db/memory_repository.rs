use async_trait::async_trait;
use shared::ScanReport;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::models::User;
use super::{ReportStore, RepositoryError, UserStore};

/// Process-local store used with `REPORT_STORE=memory`. Reports are
/// partitioned by owner id the same way the DynamoDB table is.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    reports: Arc<Mutex<HashMap<Uuid, Vec<ScanReport>>>>,
    users: Arc<Mutex<HashMap<Uuid, User>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::StoreUnavailable("memory store lock poisoned".to_string()))
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryRepository {
    async fn save(&self, report: &ScanReport) -> Result<Uuid, RepositoryError> {
        let mut reports = lock(&self.reports)?;
        let partition = reports.entry(report.owner_id).or_default();
        if partition.iter().any(|existing| existing.id == report.id) {
            return Err(RepositoryError::InvalidData(format!(
                "Report {} already exists",
                report.id
            )));
        }
        partition.push(report.clone());
        Ok(report.id)
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<ScanReport>, RepositoryError> {
        let reports = lock(&self.reports)?;
        let mut owned = reports.get(&owner_id).cloned().unwrap_or_default();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            owned.truncate(limit);
        }
        Ok(owned)
    }

    async fn delete_all_by_owner(&self, owner_id: Uuid) -> Result<usize, RepositoryError> {
        let mut reports = lock(&self.reports)?;
        Ok(reports.remove(&owner_id).map(|r| r.len()).unwrap_or(0))
    }
}

#[async_trait]
impl UserStore for MemoryRepository {
    async fn create_user(&self, user: &User) -> Result<(), RepositoryError> {
        lock(&self.users)?.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(lock(&self.users)?.get(&user_id).cloned())
    }

    async fn get_user_by_cognito_sub(
        &self,
        cognito_sub: &str,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(lock(&self.users)?
            .values()
            .find(|user| user.cognito_sub == cognito_sub)
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = lock(&self.users)?;
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        lock(&self.users)?.remove(&user_id);
        Ok(())
    }
}
