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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::modules::acl::engine::AclEngine;
use crate::modules::acl::AclRecord;
use crate::modules::auth::Authentication;
use crate::modules::context::{Stores, Warden};
use crate::modules::database::{Filter, Repository};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::identity::directory::DirectoryUser;
use crate::modules::identity::document::{DocumentStore, ProfileDocument};
use crate::modules::identity::payload::ProfileCreateRequest;
use crate::modules::identity::reconciler::ProfileReconciler;
use crate::modules::settings::WardenConfig;
use crate::raise_error;

pub fn acl_engine() -> WardenResult<(AclEngine, Arc<dyn Repository<AclRecord>>)> {
    let stores = Stores::in_memory()?;
    let engine = AclEngine::new(stores.acls.clone(), Arc::new(WardenConfig::default()));
    Ok((engine, stores.acls))
}

pub fn reconciler() -> WardenResult<(ProfileReconciler, Stores)> {
    let stores = Stores::in_memory()?;
    let reconciler = ProfileReconciler::new(stores.users.clone(), stores.documents.clone());
    Ok((reconciler, stores))
}

pub fn directory_user(uid: &str) -> DirectoryUser {
    DirectoryUser {
        uid: uid.to_string(),
        display_name: format!("{} Example", uid),
        first_name: Some(uid.to_string()),
        last_name: Some("Example".into()),
        email: Some(format!("{}@example.org", uid)),
        created_at: 1,
        updated_at: 1,
        ..Default::default()
    }
}

/// Initialized in-memory instance with the default configuration.
pub async fn warden() -> WardenResult<(Warden, Stores)> {
    warden_with(Stores::in_memory()?, WardenConfig::default()).await
}

pub async fn warden_with(stores: Stores, config: WardenConfig) -> WardenResult<(Warden, Stores)> {
    let warden = Warden::new(stores.clone(), Arc::new(config));
    warden.initialize().await?;
    Ok((warden, stores))
}

pub fn admin() -> Authentication {
    Authentication::new("root", ["ROLE_ADMIN", "ROLE_USER"])
}

pub fn acl_admin() -> Authentication {
    Authentication::new("keeper", ["ROLE_ACL_ADMIN", "ROLE_USER"])
}

/// Authentication of `uid` carrying its current role memberships.
pub async fn login(warden: &Warden, uid: &str) -> WardenResult<Authentication> {
    warden.roles.authentication_for(uid).await
}

pub fn profile_request(uid: &str) -> ProfileCreateRequest {
    ProfileCreateRequest {
        uid: uid.to_string(),
        display_name: None,
        first_name: Some(uid.to_string()),
        last_name: Some("Example".into()),
        email: Some(format!("{}@example.org", uid)),
        mobile: None,
        password: "correct-horse".into(),
        language: None,
        time_zone: None,
    }
}

/// Creates `uid` as administrator and returns its own authentication.
pub async fn register(warden: &Warden, uid: &str) -> WardenResult<Authentication> {
    warden.profiles.create(&admin(), profile_request(uid)).await?;
    login(warden, uid).await
}

/// Document store whose writes can be switched off.
pub struct FailingDocuments {
    inner: Arc<dyn DocumentStore>,
    failing: AtomicBool,
}

impl FailingDocuments {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> WardenResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(raise_error!(
                "Document store unavailable.".into(),
                ErrorCode::StoreUnavailable
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository<ProfileDocument> for FailingDocuments {
    async fn find(&self, key: &str) -> WardenResult<Option<ProfileDocument>> {
        self.inner.find(key).await
    }

    async fn find_all(&self) -> WardenResult<Vec<ProfileDocument>> {
        self.inner.find_all().await
    }

    async fn find_by(&self, filter: Filter<ProfileDocument>) -> WardenResult<Vec<ProfileDocument>> {
        self.inner.find_by(filter).await
    }

    async fn insert(&self, item: ProfileDocument) -> WardenResult<ProfileDocument> {
        self.check()?;
        self.inner.insert(item).await
    }

    async fn save(&self, item: ProfileDocument) -> WardenResult<ProfileDocument> {
        self.check()?;
        self.inner.save(item).await
    }

    async fn compare_and_save(
        &self,
        expected: ProfileDocument,
        updated: ProfileDocument,
    ) -> WardenResult<bool> {
        self.check()?;
        self.inner.compare_and_save(expected, updated).await
    }

    async fn delete(&self, key: &str) -> WardenResult<bool> {
        self.check()?;
        self.inner.delete(key).await
    }
}

#[async_trait]
impl DocumentStore for FailingDocuments {
    async fn search_pattern(&self, pattern: &str) -> WardenResult<Vec<ProfileDocument>> {
        self.inner.search_pattern(pattern).await
    }
}
