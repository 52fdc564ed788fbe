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

use std::collections::BTreeSet;
use std::sync::Arc;

use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::modules::acl::engine::AclEngine;
use crate::modules::acl::policy::{Authorizer, Operation};
use crate::modules::acl::{EntityType, ObjectIdentity, Permission, Securable, Sid};
use crate::modules::auth::{Authentication, SystemContext};
use crate::modules::database::{Keyed, Repository};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::roles::names::{is_default_role, RoleNames, DEFAULT_ROLES};
use crate::modules::roles::payload::{RoleCreateRequest, RoleUpdateRequest};
use crate::modules::settings::WardenConfig;
use crate::{raise_error, utc_now};

pub mod names;
pub mod payload;

#[cfg(test)]
mod roles_tests;

/// Custom role candidates tried before giving up.
const MAX_CUSTOM_NAME_ATTEMPTS: usize = 32;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct RoleModel {
    #[primary_key]
    pub name: String,
    pub description: Option<String>,
    pub members: BTreeSet<String>,
    /// Principal that self-administers a friends or custom role.
    pub owner: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Keyed for RoleModel {
    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

impl Securable for RoleModel {
    fn object_identity(&self) -> ObjectIdentity {
        ObjectIdentity::of(EntityType::Role, &self.name)
    }
}

pub struct RoleService {
    roles: Arc<dyn Repository<RoleModel>>,
    acl: Arc<AclEngine>,
    authorizer: Arc<Authorizer>,
    system: SystemContext,
    names: Arc<dyn RoleNames>,
    config: Arc<WardenConfig>,
}

impl RoleService {
    pub fn new(
        roles: Arc<dyn Repository<RoleModel>>,
        acl: Arc<AclEngine>,
        authorizer: Arc<Authorizer>,
        system: SystemContext,
        names: Arc<dyn RoleNames>,
        config: Arc<WardenConfig>,
    ) -> Self {
        Self {
            roles,
            acl,
            authorizer,
            system,
            names,
            config,
        }
    }

    pub fn names(&self) -> &dyn RoleNames {
        self.names.as_ref()
    }

    pub async fn find_by_name(&self, name: &str) -> WardenResult<Option<RoleModel>> {
        self.roles.find(name).await
    }

    pub async fn exists_by_name(&self, name: &str) -> WardenResult<bool> {
        self.roles.exists(name).await
    }

    async fn get(&self, name: &str) -> WardenResult<RoleModel> {
        self.roles.find(name).await?.ok_or_else(|| {
            raise_error!(
                format!("Role '{}' not found.", name),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn read(&self, auth: &Authentication, name: &str) -> WardenResult<RoleModel> {
        self.authorizer
            .authorize(auth, Operation::ReadRole, Some(&ObjectIdentity::role(name)))
            .await?;
        self.get(name).await
    }

    pub async fn create(
        &self,
        auth: &Authentication,
        request: RoleCreateRequest,
    ) -> WardenResult<RoleModel> {
        self.authorizer
            .authorize(auth, Operation::CreateRole, None)
            .await?;
        request.validate()?;
        self.insert_role(request.name.trim(), request.description, request.members, None)
            .await
    }

    /// Persists a role plus its ACL. `owner` makes the role self-administered.
    async fn insert_role(
        &self,
        name: &str,
        description: Option<String>,
        members: BTreeSet<String>,
        owner: Option<&str>,
    ) -> WardenResult<RoleModel> {
        if self.roles.exists(name).await? {
            return Err(raise_error!(
                format!("Role '{}' already exists.", name),
                ErrorCode::AlreadyExists
            ));
        }
        let now = utc_now!();
        let role = self
            .roles
            .insert(RoleModel {
                name: name.to_string(),
                description,
                members,
                owner: owner.map(str::to_string),
                created_at: now,
                updated_at: now,
            })
            .await?;
        self.acl
            .ensure_acl(&role, owner.map(Sid::principal), None, false)
            .await?;
        info!("Created role '{}'", role.name);
        Ok(role)
    }

    pub async fn update(
        &self,
        auth: &Authentication,
        name: &str,
        request: RoleUpdateRequest,
    ) -> WardenResult<RoleModel> {
        self.authorizer
            .authorize(auth, Operation::UpdateRole, Some(&ObjectIdentity::role(name)))
            .await?;
        request.validate()?;
        let mut role = self.get(name).await?;
        if let Some(description) = request.description {
            role.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(members) = request.members {
            role.members = members;
        }
        role.updated_at = utc_now!();
        self.roles.save(role).await
    }

    /// Deletes a role with all ACLs under it. Default and system roles are
    /// permanent.
    pub async fn delete(&self, auth: &Authentication, name: &str) -> WardenResult<()> {
        let oid = ObjectIdentity::role(name);
        self.authorizer
            .authorize(auth, Operation::DeleteRole, Some(&oid))
            .await?;
        self.remove_role(name).await
    }

    async fn remove_role(&self, name: &str) -> WardenResult<()> {
        if is_default_role(name) || self.config.privileged_roles().iter().any(|r| r == name) {
            return Err(raise_error!(
                format!("System role '{}' cannot be deleted.", name),
                ErrorCode::Forbidden
            ));
        }
        if !self.roles.delete(name).await? {
            return Err(raise_error!(
                format!("Role '{}' not found.", name),
                ErrorCode::ResourceNotFound
            ));
        }
        self.acl
            .delete_acls(&ObjectIdentity::role(name), true)
            .await?;
        info!("Deleted role '{}'", name);
        Ok(())
    }

    /// Roles the caller may read. Every role is given an ACL on the way.
    pub async fn list(&self, auth: &Authentication) -> WardenResult<Vec<RoleModel>> {
        self.authorizer
            .authorize(auth, Operation::ListRoles, None)
            .await?;
        let roles = self.roles.find_all().await?;
        self.heal_acls(&roles).await?;
        let mut visible = Vec::with_capacity(roles.len());
        for role in roles {
            if self
                .authorizer
                .permits(auth, &role.object_identity(), Permission::Read)
                .await?
            {
                visible.push(role);
            }
        }
        Ok(visible)
    }

    /// Returns how many ACLs had to be created.
    async fn heal_acls(&self, roles: &[RoleModel]) -> WardenResult<usize> {
        let mut healed = 0;
        for role in roles {
            let owner = role.owner.as_deref().map(Sid::principal);
            let (_, created) = self.acl.ensure_acl(role, owner, None, false).await?;
            if created {
                healed += 1;
            }
        }
        Ok(healed)
    }

    pub async fn add_members(
        &self,
        auth: &Authentication,
        name: &str,
        members: &[String],
    ) -> WardenResult<RoleModel> {
        self.authorize_members(auth, name).await?;
        self.modify_members(name, |set| set.extend(members.iter().cloned()))
            .await
    }

    pub async fn remove_members(
        &self,
        auth: &Authentication,
        name: &str,
        members: &[String],
    ) -> WardenResult<RoleModel> {
        self.authorize_members(auth, name).await?;
        self.modify_members(name, |set| {
            for member in members {
                set.remove(member);
            }
        })
        .await
    }

    /// Full replacement of the member set.
    pub async fn update_members(
        &self,
        auth: &Authentication,
        name: &str,
        members: &[String],
    ) -> WardenResult<RoleModel> {
        self.authorize_members(auth, name).await?;
        self.modify_members(name, |set| {
            set.clear();
            set.extend(members.iter().cloned());
        })
        .await
    }

    async fn authorize_members(&self, auth: &Authentication, name: &str) -> WardenResult<()> {
        self.authorizer
            .authorize(
                auth,
                Operation::ManageRoleMembers,
                Some(&ObjectIdentity::role(name)),
            )
            .await
    }

    // Read-modify-write over the whole set: concurrent edits of one role are
    // last-write-wins.
    async fn modify_members<F>(&self, name: &str, change: F) -> WardenResult<RoleModel>
    where
        F: FnOnce(&mut BTreeSet<String>),
    {
        let mut role = self.get(name).await?;
        change(&mut role.members);
        role.updated_at = utc_now!();
        self.roles.save(role).await
    }

    pub async fn find_role_names_by_member(&self, principal: &str) -> WardenResult<Vec<String>> {
        let member = principal.to_string();
        let roles = self
            .roles
            .find_by(Box::new(move |r: &RoleModel| r.members.contains(&member)))
            .await?;
        Ok(roles.into_iter().map(|r| r.name).collect())
    }

    pub async fn find_role_names_by_member_and_prefix(
        &self,
        principal: &str,
        prefix: &str,
    ) -> WardenResult<Vec<String>> {
        Ok(self
            .find_role_names_by_member(principal)
            .await?
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect())
    }

    /// The identity an outer layer would attach to `principal`'s requests.
    pub async fn authentication_for(&self, principal: &str) -> WardenResult<Authentication> {
        Ok(Authentication::new(
            principal,
            self.find_role_names_by_member(principal).await?,
        ))
    }

    /// Membership changes made by the services themselves, e.g. joining
    /// `ROLE_USER` on registration. Missing roles are a configuration error.
    pub async fn join(&self, name: &str, principal: &str) -> WardenResult<RoleModel> {
        self.modify_members(name, |set| {
            set.insert(principal.to_string());
        })
        .await
    }

    pub async fn leave(&self, name: &str, principal: &str) -> WardenResult<RoleModel> {
        self.modify_members(name, |set| {
            set.remove(principal);
        })
        .await
    }

    /// Drops `principal` from every role; returns how many roles changed.
    pub async fn leave_all(&self, principal: &str) -> WardenResult<usize> {
        let names = self.find_role_names_by_member(principal).await?;
        for name in &names {
            self.modify_members(name, |set| {
                set.remove(principal);
            })
            .await?;
        }
        Ok(names.len())
    }

    /// Creates a role administered by its creator under a fresh unique name.
    pub async fn create_custom_role(
        &self,
        auth: &Authentication,
        description: Option<String>,
    ) -> WardenResult<RoleModel> {
        self.authorizer
            .authorize(auth, Operation::CreateCustomRole, None)
            .await?;

        let mut candidate = self.names.custom_role(&auth.name);
        let mut attempts = 1;
        while self.roles.exists(&candidate).await? {
            if attempts >= MAX_CUSTOM_NAME_ATTEMPTS {
                return Err(raise_error!(
                    format!("Could not find a free custom role name for '{}'", auth.name),
                    ErrorCode::InternalError
                ));
            }
            candidate = self.names.custom_role(&auth.name);
            attempts += 1;
        }

        let role = self
            .insert_role(&candidate, description, BTreeSet::new(), Some(&auth.name))
            .await?;
        self.acl
            .grant(
                &role,
                &Sid::principal(&auth.name),
                &[
                    Permission::Administration,
                    Permission::Read,
                    Permission::Write,
                    Permission::Delete,
                ],
            )
            .await?;
        Ok(role)
    }

    pub async fn list_custom_roles(&self, auth: &Authentication) -> WardenResult<Vec<RoleModel>> {
        self.authorizer
            .authorize(auth, Operation::ListRoles, None)
            .await?;
        let prefix = self.names.custom_role_prefix(&auth.name);
        let owner = auth.name.clone();
        self.roles
            .find_by(Box::new(move |r: &RoleModel| {
                r.owner.as_deref() == Some(owner.as_str()) && r.name.starts_with(&prefix)
            }))
            .await
    }

    /// Ensures `principal`'s friends role. Its members may read the
    /// principal's profile; the principal administers it.
    pub async fn create_friends_role(&self, principal: &str) -> WardenResult<RoleModel> {
        let name = self.names.friends_role(principal);
        let role = match self.roles.find(&name).await? {
            Some(role) => role,
            None => {
                match self
                    .insert_role(
                        &name,
                        Some(format!("Friends of {}", principal)),
                        BTreeSet::new(),
                        Some(principal),
                    )
                    .await
                {
                    Ok(role) => role,
                    Err(e) if e.is_already_exists() => self.get(&name).await?,
                    Err(e) => return Err(e),
                }
            }
        };

        self.acl
            .grant(
                &role,
                &Sid::principal(principal),
                &[Permission::Administration, Permission::Create, Permission::Read],
            )
            .await?;
        let profile = ObjectIdentity::profile(principal);
        if self.acl.find_acl(&profile).await?.is_some() {
            self.acl
                .grant(&profile, &Sid::authority(&name), &[Permission::Read])
                .await?;
        } else {
            warn!(
                "Profile ACL of '{}' missing, friends role '{}' grants nothing yet",
                principal, name
            );
        }
        Ok(role)
    }

    /// Removes the friends role and all custom roles owned by `principal`.
    pub async fn delete_personal_roles(&self, principal: &str) -> WardenResult<usize> {
        let friends = self.names.friends_role(principal);
        let owner = principal.to_string();
        let owned = self
            .roles
            .find_by(Box::new(move |r: &RoleModel| r.owner.as_deref() == Some(owner.as_str())))
            .await?;
        let mut removed = 0;
        for role in owned {
            self.remove_role(&role.name).await?;
            removed += 1;
        }
        if self.roles.exists(&friends).await? {
            self.remove_role(&friends).await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Seeds the default and configured roles and heals missing role ACLs.
    /// Returns `(seeded, healed)`.
    pub async fn initialize(&self) -> WardenResult<(usize, usize)> {
        let caller = self.system.system_authentication();
        let seeded = self
            .system
            .run_as_system(&caller, "role seeding", |system| async move {
                self.seed_roles(&system).await
            })
            .await?;
        let roles = self.roles.find_all().await?;
        let healed = self.heal_acls(&roles).await?;
        if seeded > 0 || healed > 0 {
            info!("Role initialization: {} seeded, {} ACLs healed", seeded, healed);
        }
        Ok((seeded, healed))
    }

    async fn seed_roles(&self, system: &Authentication) -> WardenResult<usize> {
        let mut wanted: Vec<(String, Option<String>)> = DEFAULT_ROLES
            .iter()
            .map(|(name, description)| (name.to_string(), Some(description.to_string())))
            .collect();
        for role in self
            .config
            .privileged_roles()
            .into_iter()
            .chain(self.config.extra_roles.iter().cloned())
        {
            if !wanted.iter().any(|(name, _)| *name == role) {
                wanted.push((role, None));
            }
        }

        let mut seeded = 0;
        for (name, description) in wanted {
            if self.roles.exists(&name).await? {
                continue;
            }
            let request = RoleCreateRequest {
                name,
                description,
                members: BTreeSet::new(),
            };
            match self.create(system, request).await {
                Ok(_) => seeded += 1,
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(seeded)
    }
}
