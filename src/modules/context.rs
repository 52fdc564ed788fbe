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

use crate::modules::acl::engine::AclEngine;
use crate::modules::acl::evaluator::AclEvaluator;
use crate::modules::acl::policy::Authorizer;
use crate::modules::acl::AclRecord;
use crate::modules::allocator::domain::{SambaDomain, SambaDomainService};
use crate::modules::allocator::IdentifierAllocator;
use crate::modules::attributes::AttributeService;
use crate::modules::auth::SystemContext;
use crate::modules::clients::{ClientService, OAuth2Client};
use crate::modules::database::manager::DatabaseManager;
use crate::modules::database::{NativeRepository, Repository};
use crate::modules::error::WardenResult;
use crate::modules::groups::{GroupService, UserGroup};
use crate::modules::identity::directory::DirectoryUser;
use crate::modules::identity::document::{DocumentStore, ProfileDocument};
use crate::modules::identity::reconciler::ProfileReconciler;
use crate::modules::identity::ProfileService;
use crate::modules::roles::names::PrefixedRoleNames;
use crate::modules::roles::{RoleModel, RoleService};
use crate::modules::settings::WardenConfig;

/// Repositories of every stored entity. The first five live in the
/// directory database, documents and ACLs in the document database.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn Repository<DirectoryUser>>,
    pub groups: Arc<dyn Repository<UserGroup>>,
    pub roles: Arc<dyn Repository<RoleModel>>,
    pub domains: Arc<dyn Repository<SambaDomain>>,
    pub clients: Arc<dyn Repository<OAuth2Client>>,
    pub documents: Arc<dyn DocumentStore>,
    pub acls: Arc<dyn Repository<AclRecord>>,
}

impl Stores {
    pub fn native(manager: &DatabaseManager) -> Self {
        let directory = manager.directory_db();
        let document = manager.document_db();
        Self {
            users: Arc::new(NativeRepository::<DirectoryUser>::new(directory.clone())),
            groups: Arc::new(NativeRepository::<UserGroup>::new(directory.clone())),
            roles: Arc::new(NativeRepository::<RoleModel>::new(directory.clone())),
            domains: Arc::new(NativeRepository::<SambaDomain>::new(directory.clone())),
            clients: Arc::new(NativeRepository::<OAuth2Client>::new(directory.clone())),
            documents: Arc::new(NativeRepository::<ProfileDocument>::new(document.clone())),
            acls: Arc::new(NativeRepository::<AclRecord>::new(document.clone())),
        }
    }

    pub fn in_memory() -> WardenResult<Self> {
        Ok(Self::native(&DatabaseManager::in_memory()?))
    }
}

/// Outcome of the startup pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupReport {
    pub seeded_roles: usize,
    pub healed_acls: usize,
    pub documents_created: usize,
    pub documents_repaired: usize,
    pub profiles_repaired: usize,
    pub failures: usize,
}

/// Every service, wired once over a set of stores.
pub struct Warden {
    pub config: Arc<WardenConfig>,
    pub system: SystemContext,
    pub acl: Arc<AclEngine>,
    pub evaluator: Arc<AclEvaluator>,
    pub authorizer: Arc<Authorizer>,
    pub roles: Arc<RoleService>,
    pub domains: Arc<SambaDomainService>,
    pub allocator: Arc<IdentifierAllocator>,
    pub groups: Arc<GroupService>,
    pub clients: Arc<ClientService>,
    pub reconciler: Arc<ProfileReconciler>,
    pub profiles: Arc<ProfileService>,
    pub attributes: Arc<AttributeService>,
}

impl Warden {
    pub fn new(stores: Stores, config: Arc<WardenConfig>) -> Self {
        let system = SystemContext::new(config.clone());
        let acl = Arc::new(AclEngine::new(stores.acls.clone(), config.clone()));
        let evaluator = Arc::new(AclEvaluator::new(stores.acls.clone()));
        let authorizer = Arc::new(Authorizer::new(evaluator.clone(), config.clone()));

        let names = Arc::new(PrefixedRoleNames::new(
            config.friends_role_prefix.clone(),
            config.custom_role_prefix.clone(),
        ));
        let roles = Arc::new(RoleService::new(
            stores.roles.clone(),
            acl.clone(),
            authorizer.clone(),
            system.clone(),
            names,
            config.clone(),
        ));
        let domains = Arc::new(SambaDomainService::new(
            stores.domains.clone(),
            acl.clone(),
            authorizer.clone(),
            config.clone(),
        ));
        let allocator = Arc::new(IdentifierAllocator::new(
            domains.clone(),
            stores.users.clone(),
            stores.groups.clone(),
            config.clone(),
        ));
        let groups = Arc::new(GroupService::new(
            stores.groups.clone(),
            stores.users.clone(),
            allocator.clone(),
            domains.clone(),
            acl.clone(),
            authorizer.clone(),
        ));
        let clients = Arc::new(ClientService::new(
            stores.clients.clone(),
            stores.users.clone(),
            roles.clone(),
            acl.clone(),
            authorizer.clone(),
            system.clone(),
        ));
        let reconciler = Arc::new(ProfileReconciler::new(
            stores.users.clone(),
            stores.documents.clone(),
        ));
        let profiles = Arc::new(ProfileService::new(
            reconciler.clone(),
            stores.users.clone(),
            stores.clients.clone(),
            stores.documents.clone(),
            roles.clone(),
            groups.clone(),
            acl.clone(),
            authorizer.clone(),
            system.clone(),
        ));
        let attributes = Arc::new(AttributeService::new(
            reconciler.clone(),
            groups.clone(),
            allocator.clone(),
            domains.clone(),
            authorizer.clone(),
            system.clone(),
            config.clone(),
        ));

        Self {
            config,
            system,
            acl,
            evaluator,
            authorizer,
            roles,
            domains,
            allocator,
            groups,
            clients,
            reconciler,
            profiles,
            attributes,
        }
    }

    /// Seeds the default roles and heals missing ACLs. With
    /// `reconcile_on_startup` every directory user also gets its document,
    /// ACLs and default memberships back.
    pub async fn initialize(&self) -> WardenResult<StartupReport> {
        let mut report = StartupReport::default();

        let (seeded, healed) = self.roles.initialize().await?;
        report.seeded_roles = seeded;
        report.healed_acls = healed;
        report.healed_acls += self.domains.heal_acls().await?;
        report.healed_acls += self.groups.heal_acls().await?;
        report.healed_acls += self.clients.heal_acls().await?;

        if self.config.reconcile_on_startup {
            let reconciled = self.reconciler.reconcile_all().await?;
            report.documents_created = reconciled.created;
            report.documents_repaired = reconciled.repaired;
            report.failures = reconciled.failed;

            for uid in self.profiles.list_uids().await? {
                match self.profiles.repair(&uid).await {
                    Ok(repair) => {
                        report.healed_acls += repair.acls_created;
                        if repair.acls_created > 0 || repair.joined_user_role {
                            report.profiles_repaired += 1;
                        }
                    }
                    Err(e) => {
                        error!("Startup repair of '{}' failed: {:#?}", uid, e);
                        report.failures += 1;
                    }
                }
            }
        }

        info!(
            "Startup: {} roles seeded, {} ACLs healed, {} documents created, {} repaired, {} profiles repaired, {} failures",
            report.seeded_roles,
            report.healed_acls,
            report.documents_created,
            report.documents_repaired,
            report.profiles_repaired,
            report.failures
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::error::code::ErrorCode;
    use crate::modules::testing::{admin, profile_request};
    use crate::raise_error;

    #[tokio::test]
    async fn state_survives_a_restart() -> WardenResult<()> {
        let dir = tempfile::tempdir()?;
        let config = Arc::new(WardenConfig {
            root_dir: dir.path().to_path_buf(),
            ..WardenConfig::default()
        });

        {
            let databases = DatabaseManager::open(&config)?;
            let warden = Warden::new(Stores::native(&databases), config.clone());
            let first = warden.initialize().await?;
            assert!(first.seeded_roles > 0);
            warden.profiles.create(&admin(), profile_request("alice")).await?;
        }

        let databases = DatabaseManager::open(&config)?;
        let warden = Warden::new(Stores::native(&databases), config);
        let second = warden.initialize().await?;
        assert_eq!(second.seeded_roles, 0);
        assert_eq!(second.healed_acls, 0);
        assert_eq!(warden.profiles.read(&admin(), "alice").await?.uid, "alice");

        let json = serde_json::to_value(second)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        assert_eq!(json["seeded_roles"], 0);
        Ok(())
    }
}
