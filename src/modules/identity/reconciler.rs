//
// Copyright (c) 2025 The Warden Identity Management Project contributors
//
// This file is part of the Warden Identity Management Project
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::modules::database::Repository;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::identity::directory::DirectoryUser;
use crate::modules::identity::document::{DocumentStore, ProfileDocument};
use crate::{raise_error, utc_now};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub created: usize,
    pub repaired: usize,
    pub failed: usize,
}

/// Keeps the directory record and the profile document of one user in step.
/// The directory is authoritative; documents are materialized on first read.
pub struct ProfileReconciler {
    users: Arc<dyn Repository<DirectoryUser>>,
    documents: Arc<dyn DocumentStore>,
}

impl ProfileReconciler {
    pub fn new(
        users: Arc<dyn Repository<DirectoryUser>>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self { users, documents }
    }

    pub fn users(&self) -> &Arc<dyn Repository<DirectoryUser>> {
        &self.users
    }

    pub async fn load_directory(&self, uid: &str) -> WardenResult<DirectoryUser> {
        self.users.find(uid).await?.ok_or_else(|| {
            raise_error!(
                format!("User '{}' not found.", uid),
                ErrorCode::ResourceNotFound
            )
        })
    }

    /// Document of `uid`, materialized from the directory when missing.
    pub async fn load_or_create_document(&self, uid: &str) -> WardenResult<ProfileDocument> {
        if let Some(document) = self.documents.find(uid).await? {
            return Ok(document);
        }
        let user = self.load_directory(uid).await?;
        self.materialize(&user).await
    }

    /// Same as `load_or_create_document` for an already loaded record.
    pub async fn find_or_create_document(
        &self,
        user: &DirectoryUser,
    ) -> WardenResult<ProfileDocument> {
        if let Some(document) = self.documents.find(&user.uid).await? {
            return Ok(document);
        }
        self.materialize(user).await
    }

    async fn materialize(&self, user: &DirectoryUser) -> WardenResult<ProfileDocument> {
        // another request may have created it since the miss
        if let Some(document) = self.documents.find(&user.uid).await? {
            return Ok(document);
        }
        let document = ProfileDocument::from_directory(user, utc_now!());
        match self.documents.insert(document.clone()).await {
            Ok(document) => {
                info!("Materialized profile document for '{}'", user.uid);
                Ok(document)
            }
            Err(e) if e.is_already_exists() => match self.documents.find(&user.uid).await? {
                Some(existing) => Ok(existing),
                None => Ok(document),
            },
            Err(e) => {
                // the directory answer still stands; the next read retries
                error!(
                    "Failed to persist profile document for '{}': {:#?}",
                    user.uid, e
                );
                Ok(document)
            }
        }
    }

    /// Applies `mutate` to the directory record, saves it, then mirrors the
    /// result into the document. A failing document write is returned as an
    /// error but the directory write is kept.
    pub async fn write_through<F>(
        &self,
        uid: &str,
        mutate: F,
    ) -> WardenResult<(DirectoryUser, ProfileDocument)>
    where
        F: FnOnce(&mut DirectoryUser) -> WardenResult<()>,
    {
        let mut user = self.load_directory(uid).await?;
        mutate(&mut user)?;
        user.updated_at = utc_now!();
        let user = self.users.save(user).await?;

        let now = utc_now!();
        let document = match self.documents.find(uid).await? {
            Some(mut document) => {
                document.mirror(&user);
                document.updated_at = now;
                document
            }
            None => ProfileDocument::from_directory(&user, now),
        };
        match self.documents.save(document).await {
            Ok(document) => Ok((user, document)),
            Err(e) => {
                error!(
                    "Directory record of '{}' updated but its document was not: {:#?}",
                    uid, e
                );
                Err(e)
            }
        }
    }

    /// Creates both records for a new user, directory first.
    pub async fn create(&self, user: DirectoryUser) -> WardenResult<(DirectoryUser, ProfileDocument)> {
        let user = self.users.insert(user).await?;
        let document = ProfileDocument::from_directory(&user, user.created_at);
        let document = self.documents.save(document).await?;
        Ok((user, document))
    }

    /// Deletes the directory record, then the document. Returns whether the
    /// directory record existed.
    pub async fn delete(&self, uid: &str) -> WardenResult<bool> {
        let existed = self.users.delete(uid).await?;
        self.documents.delete(uid).await?;
        Ok(existed)
    }

    /// Materializes missing documents and rewrites drifted ones.
    pub async fn reconcile_all(&self) -> WardenResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for user in self.users.find_all().await? {
            report.scanned += 1;
            match self.reconcile_one(&user).await {
                Ok(Some(true)) => report.created += 1,
                Ok(Some(false)) => report.repaired += 1,
                Ok(None) => {}
                Err(e) => {
                    error!("Reconciliation of '{}' failed: {:#?}", user.uid, e);
                    report.failed += 1;
                }
            }
        }
        info!(
            "Profile reconciliation: scanned {}, created {}, repaired {}, failed {}",
            report.scanned, report.created, report.repaired, report.failed
        );
        Ok(report)
    }

    /// `Some(true)` created, `Some(false)` repaired, `None` already in step.
    async fn reconcile_one(&self, user: &DirectoryUser) -> WardenResult<Option<bool>> {
        match self.documents.find(&user.uid).await? {
            None => {
                let document = ProfileDocument::from_directory(user, utc_now!());
                match self.documents.insert(document).await {
                    Ok(_) => Ok(Some(true)),
                    Err(e) if e.is_already_exists() => Ok(None),
                    Err(e) => Err(e),
                }
            }
            Some(mut document) => {
                if document.mirror(user) {
                    document.updated_at = utc_now!();
                    self.documents.save(document).await?;
                    Ok(Some(false))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::{directory_user, reconciler};

    #[tokio::test]
    async fn missing_everywhere_is_not_found() -> WardenResult<()> {
        let (reconciler, _) = reconciler()?;
        let err = reconciler
            .load_or_create_document("nobody")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn directory_only_user_is_materialized() -> WardenResult<()> {
        let (reconciler, stores) = reconciler()?;
        stores.users.insert(directory_user("dora")).await?;

        let document = reconciler.load_or_create_document("dora").await?;
        assert_eq!(document.uid, "dora");
        assert!(stores.documents.exists("dora").await?);

        let again = reconciler.load_or_create_document("dora").await?;
        assert_eq!(again, document);
        Ok(())
    }

    #[tokio::test]
    async fn reconcile_all_creates_and_repairs() -> WardenResult<()> {
        let (reconciler, stores) = reconciler()?;
        stores.users.insert(directory_user("ann")).await?;
        stores.users.insert(directory_user("ben")).await?;
        reconciler.load_or_create_document("ben").await?;

        let mut drifted = stores.users.find("ben").await?.unwrap();
        drifted.email = Some("new-ben@example.org".into());
        stores.users.save(drifted).await?;

        let report = reconciler.reconcile_all().await?;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.repaired, 1);
        assert_eq!(report.failed, 0);

        let ben = stores.documents.find("ben").await?.unwrap();
        assert_eq!(ben.email.as_deref(), Some("new-ben@example.org"));

        let second = reconciler.reconcile_all().await?;
        assert_eq!(second.created + second.repaired, 0);
        Ok(())
    }
}
