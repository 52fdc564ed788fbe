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

use tracing::info;

use crate::modules::acl::engine::AclEngine;
use crate::modules::acl::policy::{Authorizer, Operation};
use crate::modules::acl::{EntityType, ObjectIdentity, Permission, Sid};
use crate::modules::auth::{Authentication, SystemContext};
use crate::modules::clients::OAuth2Client;
use crate::modules::database::Repository;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::{WardenError, WardenResult};
use crate::modules::groups::GroupService;
use crate::modules::identity::directory::DirectoryUser;
use crate::modules::identity::document::{DocumentStore, ProfileDocument};
use crate::modules::identity::payload::{
    validate_email, validate_mobile, validate_password, ProfileCreateRequest,
    ProfileUpdateRequest, ProfileView,
};
use crate::modules::identity::reconciler::ProfileReconciler;
use crate::modules::roles::names::{ROLE_READ_ALL_PROFILES, ROLE_USER};
use crate::modules::roles::RoleService;
use crate::modules::utils::normalize;
use crate::modules::utils::password::verify_password;
use crate::{hash_password, raise_error, utc_now};

pub mod directory;
pub mod document;
pub mod payload;
pub mod reconciler;


/// What one profile needed during startup reconciliation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProfileRepair {
    pub acls_created: usize,
    pub joined_user_role: bool,
}

pub struct ProfileService {
    reconciler: Arc<ProfileReconciler>,
    users: Arc<dyn Repository<DirectoryUser>>,
    clients: Arc<dyn Repository<OAuth2Client>>,
    documents: Arc<dyn DocumentStore>,
    roles: Arc<RoleService>,
    groups: Arc<GroupService>,
    acl: Arc<AclEngine>,
    authorizer: Arc<Authorizer>,
    system: SystemContext,
}

impl ProfileService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reconciler: Arc<ProfileReconciler>,
        users: Arc<dyn Repository<DirectoryUser>>,
        clients: Arc<dyn Repository<OAuth2Client>>,
        documents: Arc<dyn DocumentStore>,
        roles: Arc<RoleService>,
        groups: Arc<GroupService>,
        acl: Arc<AclEngine>,
        authorizer: Arc<Authorizer>,
        system: SystemContext,
    ) -> Self {
        Self {
            reconciler,
            users,
            clients,
            documents,
            roles,
            groups,
            acl,
            authorizer,
            system,
        }
    }

    pub fn reconciler(&self) -> &ProfileReconciler {
        &self.reconciler
    }

    async fn view(&self, document: ProfileDocument) -> WardenResult<ProfileView> {
        let roles = self.roles.find_role_names_by_member(&document.uid).await?;
        Ok(ProfileView::new(document, roles))
    }

    async fn check_email_conflict(&self, email: &str, uid: &str) -> WardenResult<()> {
        let probe = email.to_lowercase();
        let owner = uid.to_string();
        let holders = self
            .users
            .find_by(Box::new(move |u: &DirectoryUser| {
                u.uid != owner
                    && u.email.as_deref().map(str::to_lowercase).as_deref() == Some(probe.as_str())
            }))
            .await?;
        if !holders.is_empty() {
            return Err(raise_error!(
                format!("Email '{}' is already registered.", email),
                ErrorCode::AlreadyExists
            ));
        }
        Ok(())
    }

    pub async fn create(
        &self,
        auth: &Authentication,
        request: ProfileCreateRequest,
    ) -> WardenResult<ProfileView> {
        self.authorizer
            .authorize(auth, Operation::CreateProfile, None)
            .await?;
        request.validate()?;
        if self.users.exists(&request.uid).await? {
            return Err(raise_error!(
                format!("User '{}' already exists.", request.uid),
                ErrorCode::AlreadyExists
            ));
        }
        if self.clients.exists(&request.uid).await? || self.system.is_system(&request.uid) {
            return Err(raise_error!(
                format!(
                    "Principal '{}' is already taken by an OAuth2 client or the system.",
                    request.uid
                ),
                ErrorCode::AlreadyExists
            ));
        }
        if let Some(email) = &request.email {
            self.check_email_conflict(email, &request.uid).await?;
        }

        let now = utc_now!();
        let user = DirectoryUser {
            uid: request.uid.clone(),
            display_name: request.resolved_display_name(),
            first_name: normalize(request.first_name),
            last_name: normalize(request.last_name),
            email: normalize(request.email),
            mobile: normalize(request.mobile),
            password: Some(hash_password!(&request.password)?),
            language: request.language,
            time_zone: normalize(request.time_zone),
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        let (user, document) = self.reconciler.create(user).await?;
        self.ensure_profile_acls(&user.uid).await?;

        let uid = user.uid.clone();
        self.system
            .run_as_system(auth, "profile registration", |_system| async move {
                self.roles.join(ROLE_USER, &uid).await?;
                self.roles.create_friends_role(&uid).await?;
                Ok::<(), WardenError>(())
            })
            .await?;
        info!("Created user profile '{}'", user.uid);
        self.view(document).await
    }

    /// Profile ACL owned by the user (READ and WRITE for the user, READ for
    /// `ROLE_READ_ALL_PROFILES`) plus the four settings ACLs. Returns how
    /// many ACLs were created.
    pub async fn ensure_profile_acls(&self, uid: &str) -> WardenResult<usize> {
        let profile = ObjectIdentity::profile(uid);
        let principal = Sid::principal(uid);
        let (acl, created) = self
            .acl
            .ensure_acl(&profile, Some(principal.clone()), None, false)
            .await?;
        if !acl.has_entry(&principal, Permission::Read)
            || !acl.has_entry(&principal, Permission::Write)
        {
            self.acl
                .grant(&profile, &principal, &[Permission::Read, Permission::Write])
                .await?;
        }
        let readers = Sid::authority(ROLE_READ_ALL_PROFILES);
        if !acl.has_entry(&readers, Permission::Read) {
            self.acl.grant(&profile, &readers, &[Permission::Read]).await?;
        }
        let attributes = self
            .acl
            .ensure_attribute_acls(EntityType::UserProfile, uid, uid)
            .await?;
        Ok(attributes + usize::from(created))
    }

    pub async fn read(&self, auth: &Authentication, uid: &str) -> WardenResult<ProfileView> {
        self.authorizer
            .authorize(auth, Operation::ReadProfile, Some(&ObjectIdentity::profile(uid)))
            .await?;
        let document = self.reconciler.load_or_create_document(uid).await?;
        self.view(document).await
    }

    pub async fn update(
        &self,
        auth: &Authentication,
        uid: &str,
        request: ProfileUpdateRequest,
    ) -> WardenResult<ProfileView> {
        self.authorizer
            .authorize(auth, Operation::UpdateProfile, Some(&ObjectIdentity::profile(uid)))
            .await?;
        request.validate()?;
        let (_, document) = self
            .reconciler
            .write_through(uid, |user| {
                request.apply(user);
                Ok(())
            })
            .await?;
        self.view(document).await
    }

    pub async fn change_email(
        &self,
        auth: &Authentication,
        uid: &str,
        email: &str,
    ) -> WardenResult<ProfileView> {
        self.authorizer
            .authorize(auth, Operation::UpdateProfile, Some(&ObjectIdentity::profile(uid)))
            .await?;
        let email = email.trim().to_string();
        validate_email(&email)?;
        self.check_email_conflict(&email, uid).await?;
        let (_, document) = self
            .reconciler
            .write_through(uid, |user| {
                user.email = Some(email);
                Ok(())
            })
            .await?;
        self.view(document).await
    }

    /// `None` clears the number.
    pub async fn change_mobile(
        &self,
        auth: &Authentication,
        uid: &str,
        mobile: Option<&str>,
    ) -> WardenResult<ProfileView> {
        self.authorizer
            .authorize(auth, Operation::UpdateProfile, Some(&ObjectIdentity::profile(uid)))
            .await?;
        let mobile = normalize(mobile.map(str::to_string));
        if let Some(mobile) = &mobile {
            validate_mobile(mobile)?;
        }
        let (_, document) = self
            .reconciler
            .write_through(uid, |user| {
                user.mobile = mobile;
                Ok(())
            })
            .await?;
        self.view(document).await
    }

    /// Users changing their own password must present the current one.
    pub async fn change_password(
        &self,
        auth: &Authentication,
        uid: &str,
        current: Option<&str>,
        new_password: &str,
    ) -> WardenResult<()> {
        self.authorizer
            .authorize(auth, Operation::ChangePassword, Some(&ObjectIdentity::profile(uid)))
            .await?;
        validate_password(new_password)?;
        let hashed = hash_password!(new_password)?;
        let own_change = auth.name == uid;
        let current = current.map(str::to_string);
        self.reconciler
            .write_through(uid, move |user| {
                if own_change {
                    let stored = user.password.as_deref().unwrap_or_default();
                    let matches = current
                        .as_deref()
                        .map(|c| verify_password(c, stored))
                        .unwrap_or(false);
                    if !matches {
                        return Err(raise_error!(
                            "Current password is incorrect.".into(),
                            ErrorCode::InvalidParameter
                        ));
                    }
                }
                user.password = Some(hashed);
                if let Some(samba) = user.samba.as_mut() {
                    samba.pwd_last_set = utc_now!() / 1000;
                }
                Ok(())
            })
            .await?;
        info!("Password of '{}' changed by '{}'", uid, auth.name);
        Ok(())
    }

    pub async fn verify_password(&self, uid: &str, plain: &str) -> WardenResult<bool> {
        Ok(self
            .users
            .find(uid)
            .await?
            .and_then(|u| u.password)
            .map(|stored| verify_password(plain, &stored))
            .unwrap_or(false))
    }

    /// Deletes both records, every ACL of the profile, the user's personal
    /// roles and groups, and all memberships.
    pub async fn delete(&self, auth: &Authentication, uid: &str) -> WardenResult<()> {
        let profile = ObjectIdentity::profile(uid);
        self.authorizer
            .authorize(auth, Operation::DeleteProfile, Some(&profile))
            .await?;
        self.reconciler.load_directory(uid).await?;

        self.reconciler.delete(uid).await?;
        self.acl.delete_acls(&profile, true).await?;
        self.roles.delete_personal_roles(uid).await?;
        self.roles.leave_all(uid).await?;
        self.groups.forget_user(uid).await?;
        info!("Deleted user profile '{}'", uid);
        Ok(())
    }

    /// Free-text search restricted to profiles the caller may read.
    pub async fn search(&self, auth: &Authentication, query: &str) -> WardenResult<Vec<ProfileView>> {
        self.authorizer
            .authorize(auth, Operation::ListProfiles, None)
            .await?;
        let hits = self.documents.search_text(query).await?;
        self.readable(auth, hits).await
    }

    pub async fn search_pattern(
        &self,
        auth: &Authentication,
        pattern: &str,
    ) -> WardenResult<Vec<ProfileView>> {
        self.authorizer
            .authorize(auth, Operation::ListProfiles, None)
            .await?;
        let hits = self.documents.search_pattern(pattern).await?;
        self.readable(auth, hits).await
    }

    async fn readable(
        &self,
        auth: &Authentication,
        documents: Vec<ProfileDocument>,
    ) -> WardenResult<Vec<ProfileView>> {
        let mut views = Vec::new();
        for document in documents {
            if self
                .authorizer
                .permits(auth, &ObjectIdentity::profile(&document.uid), Permission::Read)
                .await?
            {
                views.push(self.view(document).await?);
            }
        }
        Ok(views)
    }

    /// Startup repair of one directory user: ACLs, `ROLE_USER` membership
    /// and the friends role.
    pub async fn repair(&self, uid: &str) -> WardenResult<ProfileRepair> {
        let acls_created = self.ensure_profile_acls(uid).await?;
        let memberships = self.roles.find_role_names_by_member(uid).await?;
        let joined_user_role = !memberships.iter().any(|r| r == ROLE_USER);
        if joined_user_role {
            self.roles.join(ROLE_USER, uid).await?;
        }
        self.roles.create_friends_role(uid).await?;
        Ok(ProfileRepair {
            acls_created,
            joined_user_role,
        })
    }

    pub async fn list_uids(&self) -> WardenResult<Vec<String>> {
        Ok(self
            .users
            .find_all()
            .await?
            .into_iter()
            .map(|u| u.uid)
            .collect())
    }
}
