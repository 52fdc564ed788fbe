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
use std::sync::{Arc, LazyLock};

use native_db::*;
use native_model::{native_model, Model};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::modules::acl::engine::AclEngine;
use crate::modules::acl::policy::{Authorizer, Operation};
use crate::modules::acl::{EntityType, ObjectIdentity, Permission, Securable};
use crate::modules::auth::{Authentication, SystemContext};
use crate::modules::database::{Keyed, Repository};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::{WardenError, WardenResult};
use crate::modules::identity::directory::DirectoryUser;
use crate::modules::roles::names::ROLE_OAUTH2_CLIENT;
use crate::modules::roles::RoleService;
use crate::modules::utils::password::verify_password;
use crate::{hash_password, raise_error, utc_now};

#[cfg(test)]
mod clients_tests;

const MIN_SECRET_LEN: usize = 8;

static CLIENT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]{2,63}$").expect("valid client id regex")
});

fn allowed_grant_types() -> BTreeSet<&'static str> {
    [
        "authorization_code",
        "client_credentials",
        "implicit",
        "password",
        "refresh_token",
    ]
    .into_iter()
    .collect()
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 5, version = 1)]
#[native_db]
pub struct OAuth2Client {
    #[primary_key]
    pub client_id: String,
    pub client_secret: String,
    pub display_name: Option<String>,
    pub scopes: BTreeSet<String>,
    pub redirect_uris: BTreeSet<String>,
    pub grant_types: BTreeSet<String>,
    pub access_token_validity_secs: Option<u64>,
    pub auto_approve: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Keyed for OAuth2Client {
    fn natural_key(&self) -> String {
        self.client_id.clone()
    }
}

impl Securable for OAuth2Client {
    fn object_identity(&self) -> ObjectIdentity {
        ObjectIdentity::of(EntityType::OAuth2Client, &self.client_id)
    }
}

/// A client together with the roles it is a member of.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClientView {
    pub client_id: String,
    pub display_name: Option<String>,
    pub scopes: BTreeSet<String>,
    pub redirect_uris: BTreeSet<String>,
    pub grant_types: BTreeSet<String>,
    pub access_token_validity_secs: Option<u64>,
    pub auto_approve: bool,
    pub roles: BTreeSet<String>,
}

impl ClientView {
    fn new(client: OAuth2Client, roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            client_id: client.client_id,
            display_name: client.display_name,
            scopes: client.scopes,
            redirect_uris: client.redirect_uris,
            grant_types: client.grant_types,
            access_token_validity_secs: client.access_token_validity_secs,
            auto_approve: client.auto_approve,
            roles: roles.into_iter().collect(),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ClientCreateRequest {
    pub client_id: String,
    pub client_secret: String,
    pub display_name: Option<String>,
    pub scopes: BTreeSet<String>,
    pub redirect_uris: BTreeSet<String>,
    pub grant_types: BTreeSet<String>,
    pub roles: BTreeSet<String>,
    pub access_token_validity_secs: Option<u64>,
    pub auto_approve: bool,
}

impl ClientCreateRequest {
    pub fn validate(&self) -> WardenResult<()> {
        if !CLIENT_ID.is_match(&self.client_id) {
            return Err(raise_error!(
                format!("Invalid client id '{}'.", self.client_id),
                ErrorCode::InvalidParameter
            ));
        }
        validate_secret(&self.client_secret)?;
        validate_grants(&self.grant_types, &self.redirect_uris)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ClientUpdateRequest {
    pub client_secret: Option<String>,
    pub display_name: Option<String>,
    pub scopes: Option<BTreeSet<String>>,
    pub redirect_uris: Option<BTreeSet<String>>,
    pub grant_types: Option<BTreeSet<String>>,
    pub roles: Option<BTreeSet<String>>,
    pub access_token_validity_secs: Option<u64>,
    pub auto_approve: Option<bool>,
}

fn validate_secret(secret: &str) -> WardenResult<()> {
    if secret.chars().count() < MIN_SECRET_LEN {
        return Err(raise_error!(
            format!("Client secret must have at least {} characters.", MIN_SECRET_LEN),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

fn validate_grants(grant_types: &BTreeSet<String>, redirect_uris: &BTreeSet<String>) -> WardenResult<()> {
    if grant_types.is_empty() {
        return Err(raise_error!(
            "At least one grant type is required.".into(),
            ErrorCode::InvalidParameter
        ));
    }
    let allowed = allowed_grant_types();
    for grant in grant_types {
        if !allowed.contains(grant.as_str()) {
            return Err(raise_error!(
                format!("Unsupported grant type '{}'.", grant),
                ErrorCode::InvalidParameter
            ));
        }
    }
    for uri in redirect_uris {
        let parsed = Url::parse(uri).map_err(|e| {
            raise_error!(
                format!("Invalid redirect URI '{}': {}", uri, e),
                ErrorCode::InvalidParameter
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.fragment().is_some() {
            return Err(raise_error!(
                format!("Redirect URI '{}' must be http(s) without fragment.", uri),
                ErrorCode::InvalidParameter
            ));
        }
    }
    let needs_redirect = grant_types
        .iter()
        .any(|g| g == "authorization_code" || g == "implicit");
    if needs_redirect && redirect_uris.is_empty() {
        return Err(raise_error!(
            "Redirect-based grant types need at least one redirect URI.".into(),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

pub struct ClientService {
    clients: Arc<dyn Repository<OAuth2Client>>,
    users: Arc<dyn Repository<DirectoryUser>>,
    roles: Arc<RoleService>,
    acl: Arc<AclEngine>,
    authorizer: Arc<Authorizer>,
    system: SystemContext,
}

impl ClientService {
    pub fn new(
        clients: Arc<dyn Repository<OAuth2Client>>,
        users: Arc<dyn Repository<DirectoryUser>>,
        roles: Arc<RoleService>,
        acl: Arc<AclEngine>,
        authorizer: Arc<Authorizer>,
        system: SystemContext,
    ) -> Self {
        Self {
            clients,
            users,
            roles,
            acl,
            authorizer,
            system,
        }
    }

    async fn get(&self, client_id: &str) -> WardenResult<OAuth2Client> {
        self.clients.find(client_id).await?.ok_or_else(|| {
            raise_error!(
                format!("OAuth2 client '{}' not found.", client_id),
                ErrorCode::ResourceNotFound
            )
        })
    }

    async fn view(&self, client: OAuth2Client) -> WardenResult<ClientView> {
        let roles = self.roles.find_role_names_by_member(&client.client_id).await?;
        Ok(ClientView::new(client, roles))
    }

    async fn ensure_roles_exist(&self, roles: &BTreeSet<String>) -> WardenResult<()> {
        for role in roles {
            if !self.roles.exists_by_name(role).await? {
                return Err(raise_error!(
                    format!("Role '{}' not found.", role),
                    ErrorCode::ResourceNotFound
                ));
            }
        }
        Ok(())
    }

    pub async fn create(
        &self,
        auth: &Authentication,
        request: ClientCreateRequest,
    ) -> WardenResult<ClientView> {
        self.authorizer
            .authorize(auth, Operation::CreateClient, None)
            .await?;
        request.validate()?;
        if self.clients.exists(&request.client_id).await? {
            return Err(raise_error!(
                format!("OAuth2 client '{}' already exists.", request.client_id),
                ErrorCode::AlreadyExists
            ));
        }
        // client ids and uids are both principal names
        if self.users.exists(&request.client_id).await?
            || self.system.is_system(&request.client_id)
        {
            return Err(raise_error!(
                format!(
                    "Principal '{}' is already taken by a user.",
                    request.client_id
                ),
                ErrorCode::AlreadyExists
            ));
        }
        self.ensure_roles_exist(&request.roles).await?;

        let now = utc_now!();
        let client = self
            .clients
            .insert(OAuth2Client {
                client_id: request.client_id,
                client_secret: hash_password!(&request.client_secret)?,
                display_name: request.display_name,
                scopes: request.scopes,
                redirect_uris: request.redirect_uris,
                grant_types: request.grant_types,
                access_token_validity_secs: request.access_token_validity_secs,
                auto_approve: request.auto_approve,
                created_at: now,
                updated_at: now,
            })
            .await?;
        self.acl.ensure_acl(&client, None, None, false).await?;

        let client_id = client.client_id.clone();
        let roles = request.roles;
        self.system
            .run_as_system(auth, "client role assignment", |_system| async move {
                self.roles.join(ROLE_OAUTH2_CLIENT, &client_id).await?;
                for role in &roles {
                    self.roles.join(role, &client_id).await?;
                }
                Ok::<(), WardenError>(())
            })
            .await?;
        info!("Created OAuth2 client '{}'", client.client_id);
        self.view(client).await
    }

    pub async fn read(&self, auth: &Authentication, client_id: &str) -> WardenResult<ClientView> {
        self.authorizer
            .authorize(auth, Operation::ReadClient, Some(&ObjectIdentity::client(client_id)))
            .await?;
        let client = self.get(client_id).await?;
        self.view(client).await
    }

    pub async fn update(
        &self,
        auth: &Authentication,
        client_id: &str,
        request: ClientUpdateRequest,
    ) -> WardenResult<ClientView> {
        self.authorizer
            .authorize(auth, Operation::UpdateClient, Some(&ObjectIdentity::client(client_id)))
            .await?;
        let mut client = self.get(client_id).await?;

        if let Some(secret) = &request.client_secret {
            validate_secret(secret)?;
            client.client_secret = hash_password!(secret)?;
        }
        let grant_types = request.grant_types.unwrap_or(client.grant_types.clone());
        let redirect_uris = request.redirect_uris.unwrap_or(client.redirect_uris.clone());
        validate_grants(&grant_types, &redirect_uris)?;
        client.grant_types = grant_types;
        client.redirect_uris = redirect_uris;
        if let Some(scopes) = request.scopes {
            client.scopes = scopes;
        }
        if request.display_name.is_some() {
            client.display_name = request.display_name;
        }
        if request.access_token_validity_secs.is_some() {
            client.access_token_validity_secs = request.access_token_validity_secs;
        }
        if let Some(auto_approve) = request.auto_approve {
            client.auto_approve = auto_approve;
        }
        if let Some(roles) = &request.roles {
            self.ensure_roles_exist(roles).await?;
        }

        client.updated_at = utc_now!();
        let client = self.clients.save(client).await?;

        if let Some(wanted) = request.roles {
            let current = self.roles.find_role_names_by_member(client_id).await?;
            for role in &current {
                if role != ROLE_OAUTH2_CLIENT && !wanted.contains(role) {
                    self.roles.leave(role, client_id).await?;
                }
            }
            for role in &wanted {
                if !current.contains(role) {
                    self.roles.join(role, client_id).await?;
                }
            }
        }
        self.view(client).await
    }

    pub async fn delete(&self, auth: &Authentication, client_id: &str) -> WardenResult<()> {
        let oid = ObjectIdentity::client(client_id);
        self.authorizer
            .authorize(auth, Operation::DeleteClient, Some(&oid))
            .await?;
        if !self.clients.delete(client_id).await? {
            return Err(raise_error!(
                format!("OAuth2 client '{}' not found.", client_id),
                ErrorCode::ResourceNotFound
            ));
        }
        self.acl.delete_acls(&oid, true).await?;
        self.roles.leave_all(client_id).await?;
        info!("Deleted OAuth2 client '{}'", client_id);
        Ok(())
    }

    pub async fn list(&self, auth: &Authentication) -> WardenResult<Vec<ClientView>> {
        self.authorizer
            .authorize(auth, Operation::ListClients, None)
            .await?;
        let mut views = Vec::new();
        for client in self.clients.find_all().await? {
            self.acl.ensure_acl(&client, None, None, false).await?;
            if self
                .authorizer
                .permits(auth, &client.object_identity(), Permission::Read)
                .await?
            {
                views.push(self.view(client).await?);
            }
        }
        Ok(views)
    }

    pub async fn verify_secret(&self, client_id: &str, secret: &str) -> WardenResult<bool> {
        Ok(self
            .clients
            .find(client_id)
            .await?
            .map(|c| verify_password(secret, &c.client_secret))
            .unwrap_or(false))
    }

    pub async fn heal_acls(&self) -> WardenResult<usize> {
        let mut healed = 0;
        for client in self.clients.find_all().await? {
            if self.acl.ensure_acl(&client, None, None, false).await?.1 {
                healed += 1;
            }
        }
        Ok(healed)
    }
}
