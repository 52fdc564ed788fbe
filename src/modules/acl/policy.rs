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

use tracing::warn;

use crate::modules::acl::evaluator::{AclEvaluator, Decision};
use crate::modules::acl::{ObjectIdentity, Permission};
use crate::modules::auth::Authentication;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::roles::names::{ROLE_ACL_ADMIN, ROLE_USER};
use crate::modules::settings::WardenConfig;
use crate::raise_error;

/// Every guarded service operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateProfile,
    ReadProfile,
    UpdateProfile,
    ChangePassword,
    DeleteProfile,
    ListProfiles,

    CreateRole,
    ReadRole,
    UpdateRole,
    DeleteRole,
    ManageRoleMembers,
    CreateCustomRole,
    ListRoles,

    CreateGroup,
    ReadGroup,
    UpdateGroup,
    DeleteGroup,
    ManageGroupMembers,
    ListGroups,

    CreateDomain,
    ReadDomain,
    UpdateDomain,
    DeleteDomain,
    ListDomains,

    CreateClient,
    ReadClient,
    UpdateClient,
    DeleteClient,
    ListClients,

    ApplySettings,
    UpdateSettings,
    ReadSettings,
    RemoveSettings,

    ReadAcl,
    ManageAcl,
}

/// Named authority sets resolved against the configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorityGroup {
    /// Admin and system roles.
    Administrators,
    /// `ROLE_ACL_ADMIN` and system roles.
    AclAdministrators,
    /// `ROLE_USER` plus administrators.
    Users,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Authority(AuthorityGroup),
    Permission(Permission),
    AuthorityOrPermission(AuthorityGroup, Permission),
}

/// The authorization policy table.
pub fn requirement(operation: Operation) -> Requirement {
    use AuthorityGroup::*;
    use Operation::*;

    match operation {
        CreateProfile | CreateRole | CreateGroup | CreateDomain | CreateClient => {
            Requirement::Authority(Administrators)
        }
        CreateCustomRole => Requirement::Authority(Users),
        ListProfiles | ListRoles | ListGroups | ListDomains | ListClients => {
            Requirement::Authenticated
        }

        ReadProfile | ReadRole | ReadGroup | ReadDomain | ReadClient | ReadSettings => {
            Requirement::Permission(Permission::Read)
        }
        UpdateProfile | ChangePassword | UpdateRole | UpdateGroup | UpdateDomain
        | UpdateClient | UpdateSettings => Requirement::Permission(Permission::Write),
        DeleteProfile | DeleteRole | DeleteGroup | DeleteDomain | DeleteClient
        | RemoveSettings => Requirement::Permission(Permission::Delete),
        ManageRoleMembers | ManageGroupMembers => {
            Requirement::Permission(Permission::Administration)
        }
        ApplySettings => Requirement::Permission(Permission::Create),

        ReadAcl => Requirement::AuthorityOrPermission(AclAdministrators, Permission::Read),
        ManageAcl => {
            Requirement::AuthorityOrPermission(AclAdministrators, Permission::Administration)
        }
    }
}

/// Single gate consulted at the start of each service operation.
pub struct Authorizer {
    evaluator: Arc<AclEvaluator>,
    config: Arc<WardenConfig>,
}

impl Authorizer {
    pub fn new(evaluator: Arc<AclEvaluator>, config: Arc<WardenConfig>) -> Self {
        Self { evaluator, config }
    }

    pub fn evaluator(&self) -> &AclEvaluator {
        &self.evaluator
    }

    pub fn authorities(&self, group: AuthorityGroup) -> Vec<String> {
        match group {
            AuthorityGroup::Administrators => self.config.privileged_roles(),
            AuthorityGroup::AclAdministrators => {
                let mut roles = vec![ROLE_ACL_ADMIN.to_string()];
                roles.extend(self.config.system_roles.iter().cloned());
                roles
            }
            AuthorityGroup::Users => {
                let mut roles = vec![ROLE_USER.to_string()];
                roles.extend(self.config.privileged_roles());
                roles
            }
        }
    }

    pub fn in_group(&self, auth: &Authentication, group: AuthorityGroup) -> bool {
        auth.has_any_authority(&self.authorities(group))
    }

    pub fn is_administrator(&self, auth: &Authentication) -> bool {
        self.in_group(auth, AuthorityGroup::Administrators)
    }

    /// Fails with `PermissionDenied` for an anonymous caller and `Forbidden`
    /// for a missing grant. A target without ACL is also `Forbidden`.
    pub async fn authorize(
        &self,
        auth: &Authentication,
        operation: Operation,
        target: Option<&ObjectIdentity>,
    ) -> WardenResult<()> {
        if auth.name.trim().is_empty() {
            return Err(raise_error!(
                "Authentication required".into(),
                ErrorCode::PermissionDenied
            ));
        }

        match requirement(operation) {
            Requirement::Authenticated => Ok(()),
            Requirement::Authority(group) => {
                if self.in_group(auth, group) {
                    Ok(())
                } else {
                    Err(self.forbidden(auth, operation, target))
                }
            }
            Requirement::Permission(permission) => {
                self.check_permission(auth, operation, target, permission)
                    .await
            }
            Requirement::AuthorityOrPermission(group, permission) => {
                if self.in_group(auth, group) {
                    return Ok(());
                }
                self.check_permission(auth, operation, target, permission)
                    .await
            }
        }
    }

    /// Plain ACL check without error mapping, for composite gates.
    pub async fn permits(
        &self,
        auth: &Authentication,
        target: &ObjectIdentity,
        permission: Permission,
    ) -> WardenResult<bool> {
        self.evaluator.has_permission(auth, target, permission).await
    }

    async fn check_permission(
        &self,
        auth: &Authentication,
        operation: Operation,
        target: Option<&ObjectIdentity>,
        permission: Permission,
    ) -> WardenResult<()> {
        let Some(target) = target else {
            return Err(raise_error!(
                format!("{:?} needs a target object", operation),
                ErrorCode::InternalError
            ));
        };
        match self.evaluator.evaluate(auth, target, permission).await? {
            Decision::Granted => Ok(()),
            Decision::Denied => Err(self.forbidden(auth, operation, Some(target))),
            Decision::NoAcl => {
                warn!(
                    "Denying {:?} on {}: no ACL exists (caller '{}')",
                    operation, target, auth.name
                );
                Err(self.forbidden(auth, operation, Some(target)))
            }
        }
    }

    fn forbidden(
        &self,
        auth: &Authentication,
        operation: Operation,
        target: Option<&ObjectIdentity>,
    ) -> crate::modules::error::WardenError {
        let message = match target {
            Some(target) => format!(
                "'{}' is not allowed to perform {:?} on {}",
                auth.name, operation, target
            ),
            None => format!("'{}' is not allowed to perform {:?}", auth.name, operation),
        };
        raise_error!(message, ErrorCode::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::acl::Sid;
    use crate::modules::testing::acl_engine;

    fn authorizer(
        acls: Arc<dyn crate::modules::database::Repository<crate::modules::acl::AclRecord>>,
    ) -> Authorizer {
        Authorizer::new(
            Arc::new(AclEvaluator::new(acls)),
            Arc::new(WardenConfig::default()),
        )
    }

    #[test]
    fn table_maps_settings_operations_to_permissions() {
        assert_eq!(
            requirement(Operation::ApplySettings),
            Requirement::Permission(Permission::Create)
        );
        assert_eq!(
            requirement(Operation::RemoveSettings),
            Requirement::Permission(Permission::Delete)
        );
        assert_eq!(
            requirement(Operation::CreateRole),
            Requirement::Authority(AuthorityGroup::Administrators)
        );
        assert_eq!(
            requirement(Operation::ManageRoleMembers),
            Requirement::Permission(Permission::Administration)
        );
    }

    #[tokio::test]
    async fn anonymous_is_permission_denied() -> WardenResult<()> {
        let (_, acls) = acl_engine()?;
        let gate = authorizer(acls);
        let err = gate
            .authorize(
                &Authentication::new("", Vec::<String>::new()),
                Operation::ListRoles,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        Ok(())
    }

    #[tokio::test]
    async fn missing_acl_is_forbidden() -> WardenResult<()> {
        let (_, acls) = acl_engine()?;
        let gate = authorizer(acls);
        let admin = Authentication::new("root", ["ROLE_ADMIN"]);
        let err = gate
            .authorize(&admin, Operation::ReadGroup, Some(&ObjectIdentity::group("none")))
            .await
            .unwrap_err();
        assert!(err.is_forbidden());
        Ok(())
    }

    #[tokio::test]
    async fn acl_admin_bypasses_acl_for_management() -> WardenResult<()> {
        let (engine, acls) = acl_engine()?;
        let oid = ObjectIdentity::role("ROLE_X");
        engine
            .init_acl(&oid, Some(Sid::principal("owner")), None, true)
            .await?;
        let gate = authorizer(acls);

        let acl_admin = Authentication::new("sec", [ROLE_ACL_ADMIN]);
        gate.authorize(&acl_admin, Operation::ManageAcl, Some(&oid)).await?;

        let user = Authentication::new("joe", [ROLE_USER]);
        assert!(gate
            .authorize(&user, Operation::ManageAcl, Some(&oid))
            .await
            .unwrap_err()
            .is_forbidden());
        gate.authorize(&user, Operation::CreateCustomRole, None).await?;
        assert!(gate
            .authorize(&user, Operation::CreateRole, None)
            .await
            .is_err());
        Ok(())
    }
}
