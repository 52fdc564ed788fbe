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

use crate::modules::acl::policy::{Authorizer, Operation};
use crate::modules::acl::{EntityType, ObjectIdentity, Permission, SubAttribute};
use crate::modules::allocator::domain::SambaDomainService;
use crate::modules::allocator::IdentifierAllocator;
use crate::modules::auth::{Authentication, SystemContext};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::groups::GroupService;
use crate::modules::identity::directory::DirectoryUser;
use crate::modules::identity::reconciler::ProfileReconciler;
use crate::modules::settings::WardenConfig;
use crate::raise_error;

pub mod mail;
pub mod organisation;
pub mod posix;
pub mod samba;


/// Gatekeeper for the optional settings blocks of a profile. Each block has
/// its own ACL, separate from the profile's.
pub struct AttributeService {
    reconciler: Arc<ProfileReconciler>,
    groups: Arc<GroupService>,
    allocator: Arc<IdentifierAllocator>,
    domains: Arc<SambaDomainService>,
    authorizer: Arc<Authorizer>,
    system: SystemContext,
    config: Arc<WardenConfig>,
}

impl AttributeService {
    pub fn new(
        reconciler: Arc<ProfileReconciler>,
        groups: Arc<GroupService>,
        allocator: Arc<IdentifierAllocator>,
        domains: Arc<SambaDomainService>,
        authorizer: Arc<Authorizer>,
        system: SystemContext,
        config: Arc<WardenConfig>,
    ) -> Self {
        Self {
            reconciler,
            groups,
            allocator,
            domains,
            authorizer,
            system,
            config,
        }
    }

    fn target(uid: &str, attribute: SubAttribute) -> ObjectIdentity {
        ObjectIdentity::attribute(EntityType::UserProfile, attribute, uid)
    }

    fn is_present(user: &DirectoryUser, attribute: SubAttribute) -> bool {
        match attribute {
            SubAttribute::MailSettings => user.mail.is_some(),
            SubAttribute::OrganisationSettings => user.organisation.is_some(),
            SubAttribute::PosixSettings => user.posix.is_some(),
            SubAttribute::SambaSettings => user.samba.is_some(),
        }
    }

    /// CREATE on the block, checked before anything is loaded. The block
    /// must not exist yet.
    async fn gate_apply(
        &self,
        auth: &Authentication,
        uid: &str,
        attribute: SubAttribute,
    ) -> WardenResult<DirectoryUser> {
        self.authorizer
            .authorize(auth, Operation::ApplySettings, Some(&Self::target(uid, attribute)))
            .await?;
        let user = self.reconciler.load_directory(uid).await?;
        if Self::is_present(&user, attribute) {
            return Err(raise_error!(
                format!("{} of '{}' already exist.", attribute.as_str(), uid),
                ErrorCode::AlreadyExists
            ));
        }
        Ok(user)
    }

    /// WRITE for an existing block, CREATE for a missing one.
    async fn gate_update(
        &self,
        auth: &Authentication,
        uid: &str,
        attribute: SubAttribute,
    ) -> WardenResult<DirectoryUser> {
        let target = Self::target(uid, attribute);
        let can_write = self.authorizer.permits(auth, &target, Permission::Write).await?;
        let can_create = self.authorizer.permits(auth, &target, Permission::Create).await?;
        if !can_write && !can_create {
            // reports the missing grant the usual way
            self.authorizer
                .authorize(auth, Operation::UpdateSettings, Some(&target))
                .await?;
        }

        let user = self.reconciler.load_directory(uid).await?;
        let allowed = if Self::is_present(&user, attribute) {
            can_write
        } else {
            can_create
        };
        if !allowed {
            return Err(raise_error!(
                format!(
                    "'{}' is not allowed to update {} of '{}'",
                    auth.name,
                    attribute.as_str(),
                    uid
                ),
                ErrorCode::Forbidden
            ));
        }
        Ok(user)
    }

    async fn gate_read(
        &self,
        auth: &Authentication,
        uid: &str,
        attribute: SubAttribute,
    ) -> WardenResult<DirectoryUser> {
        self.authorizer
            .authorize(auth, Operation::ReadSettings, Some(&Self::target(uid, attribute)))
            .await?;
        self.reconciler.load_directory(uid).await
    }

    async fn gate_remove(
        &self,
        auth: &Authentication,
        uid: &str,
        attribute: SubAttribute,
    ) -> WardenResult<DirectoryUser> {
        self.authorizer
            .authorize(auth, Operation::RemoveSettings, Some(&Self::target(uid, attribute)))
            .await?;
        let user = self.reconciler.load_directory(uid).await?;
        if !Self::is_present(&user, attribute) {
            return Err(raise_error!(
                format!("'{}' has no {}.", uid, attribute.as_str()),
                ErrorCode::ResourceNotFound
            ));
        }
        Ok(user)
    }

    fn missing(uid: &str, attribute: SubAttribute) -> crate::modules::error::WardenError {
        raise_error!(
            format!("'{}' has no {}.", uid, attribute.as_str()),
            ErrorCode::ResourceNotFound
        )
    }
}
