//! In-memory project directory and project token store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ProjectDirectory;
use super::tokens::ProjectTokenStore;
use crate::auth::AuthError;
use crate::models::auth::{Project, ProjectAccessTokenRecord, ProjectRole};

#[derive(Default)]
struct DirectoryState {
    projects: HashMap<Uuid, Project>,
    members: HashMap<(Uuid, Uuid), ProjectRole>,
}

#[derive(Default)]
pub struct MemoryProjectDirectory {
    state: Mutex<DirectoryState>,
}

impl MemoryProjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectDirectory for MemoryProjectDirectory {
    async fn create_project(&self, key: &str, name: &str, owner: Uuid) -> Result<Project, AuthError> {
        let mut state = self.state.lock().await;
        if state.projects.values().any(|p| p.key == key) {
            return Err(AuthError::Conflict(format!("Project key {key} already exists")));
        }
        let project = Project {
            id: Uuid::now_v7(),
            key: key.to_string(),
            name: name.to_string(),
        };
        state.projects.insert(project.id, project.clone());
        state.members.insert((project.id, owner), ProjectRole::Owner);
        Ok(project)
    }

    async fn set_member(
        &self,
        project_id: Uuid,
        principal_id: Uuid,
        role: ProjectRole,
    ) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        if !state.projects.contains_key(&project_id) {
            return Err(AuthError::NotFound("Project not found".into()));
        }
        state.members.insert((project_id, principal_id), role);
        Ok(())
    }

    async fn find_project_by_key(&self, key: &str) -> Result<Option<Project>, AuthError> {
        Ok(self
            .state
            .lock()
            .await
            .projects
            .values()
            .find(|p| p.key == key)
            .cloned())
    }

    async fn member_role(
        &self,
        project_id: Uuid,
        principal_id: Uuid,
    ) -> Result<Option<ProjectRole>, AuthError> {
        Ok(self
            .state
            .lock()
            .await
            .members
            .get(&(project_id, principal_id))
            .copied())
    }
}

/// Project token records keyed by id. Single-record flag flips go through
/// the map's per-shard locks.
#[derive(Default)]
pub struct MemoryProjectTokenStore {
    records: DashMap<Uuid, ProjectAccessTokenRecord>,
}

impl MemoryProjectTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn newest_first(mut records: Vec<ProjectAccessTokenRecord>) -> Vec<ProjectAccessTokenRecord> {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records
    }
}

#[async_trait]
impl ProjectTokenStore for MemoryProjectTokenStore {
    async fn save(&self, record: &ProjectAccessTokenRecord) -> Result<(), AuthError> {
        if self.records.contains_key(&record.id) {
            return Err(AuthError::Conflict("token already stored".into()));
        }
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ProjectAccessTokenRecord>, AuthError> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ProjectAccessTokenRecord>, AuthError> {
        Ok(self
            .records
            .iter()
            .find(|r| r.token_hash == token_hash)
            .map(|r| r.value().clone()))
    }

    async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<ProjectAccessTokenRecord>, AuthError> {
        Ok(Self::newest_first(
            self.records
                .iter()
                .filter(|r| r.project_id == project_id && !r.revoked)
                .map(|r| r.value().clone())
                .collect(),
        ))
    }

    async fn list_issued_by(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProjectAccessTokenRecord>, AuthError> {
        Ok(Self::newest_first(
            self.records
                .iter()
                .filter(|r| r.issued_by == principal_id && r.is_valid(now))
                .map(|r| r.value().clone())
                .collect(),
        ))
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, AuthError> {
        Ok(match self.records.get_mut(&id) {
            Some(mut record) if !record.revoked => {
                record.revoked = true;
                true
            }
            _ => false,
        })
    }

    async fn revoke_all_issued_by(&self, principal_id: Uuid) -> Result<u64, AuthError> {
        let mut count = 0;
        for mut record in self.records.iter_mut() {
            if record.issued_by == principal_id && !record.revoked {
                record.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }
}
