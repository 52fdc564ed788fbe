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

use std::sync::{Arc, LazyLock};

use native_db::*;
use native_model::{native_model, Model};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::modules::acl::engine::AclEngine;
use crate::modules::acl::policy::{Authorizer, Operation};
use crate::modules::acl::{EntityType, ObjectIdentity, Permission, Securable};
use crate::modules::auth::Authentication;
use crate::modules::database::{Keyed, Repository};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::settings::WardenConfig;
use crate::{raise_error, utc_now};

/// Name used for the in-memory domain when nothing is configured.
pub const TRANSIENT_DOMAIN_NAME: &str = "WARDEN";

static DOMAIN_SID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S-1-\d+(-\d+)+$").expect("valid domain sid regex"));

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 4, version = 1)]
#[native_db]
pub struct SambaDomain {
    #[primary_key]
    pub name: String,
    #[secondary_key(unique)]
    pub sid: String,
    pub rid_base: u32,
    pub next_uid: u32,
    pub next_gid: u32,
    pub is_default: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Keyed for SambaDomain {
    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

impl Securable for SambaDomain {
    fn object_identity(&self) -> ObjectIdentity {
        ObjectIdentity::of(EntityType::SambaDomain, &self.name)
    }
}

/// The domain counters are drawn from. `transient` domains have no record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedDomain {
    pub domain: SambaDomain,
    pub transient: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct DomainCreateRequest {
    pub name: String,
    pub sid: String,
    pub rid_base: Option<u32>,
    pub next_uid: Option<u32>,
    pub next_gid: Option<u32>,
    pub is_default: bool,
}

impl DomainCreateRequest {
    pub fn validate(&self) -> WardenResult<()> {
        if self.name.trim().is_empty() {
            return Err(raise_error!(
                "Domain name cannot be empty.".into(),
                ErrorCode::InvalidParameter
            ));
        }
        validate_domain_sid(&self.sid)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct DomainUpdateRequest {
    pub rid_base: Option<u32>,
    pub next_uid: Option<u32>,
    pub next_gid: Option<u32>,
    pub is_default: Option<bool>,
}

pub fn validate_domain_sid(sid: &str) -> WardenResult<()> {
    if !DOMAIN_SID.is_match(sid.trim()) {
        return Err(raise_error!(
            format!("Invalid domain SID '{}'.", sid),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

pub struct SambaDomainService {
    domains: Arc<dyn Repository<SambaDomain>>,
    acl: Arc<AclEngine>,
    authorizer: Arc<Authorizer>,
    config: Arc<WardenConfig>,
    transient: SambaDomain,
}

impl SambaDomainService {
    pub fn new(
        domains: Arc<dyn Repository<SambaDomain>>,
        acl: Arc<AclEngine>,
        authorizer: Arc<Authorizer>,
        config: Arc<WardenConfig>,
    ) -> Self {
        let seed = transient_seed(utc_now!() / 1000);
        let transient = SambaDomain {
            name: config
                .samba_domain
                .clone()
                .unwrap_or_else(|| TRANSIENT_DOMAIN_NAME.to_string()),
            sid: config.samba_sid_prefix.clone(),
            rid_base: config.samba_rid_base,
            next_uid: seed,
            next_gid: seed,
            is_default: true,
            created_at: 0,
            updated_at: 0,
        };
        Self {
            domains,
            acl,
            authorizer,
            config,
            transient,
        }
    }

    pub fn repository(&self) -> &Arc<dyn Repository<SambaDomain>> {
        &self.domains
    }

    pub async fn find(&self, name: &str) -> WardenResult<Option<SambaDomain>> {
        self.domains.find(name).await
    }

    /// Looks a domain up by name first, then by SID.
    pub async fn find_by_name_or_sid(&self, key: &str) -> WardenResult<Option<SambaDomain>> {
        if let Some(domain) = self.domains.find(key).await? {
            return Ok(Some(domain));
        }
        let sid = key.to_string();
        Ok(self
            .domains
            .find_by(Box::new(move |d: &SambaDomain| d.sid == sid))
            .await?
            .into_iter()
            .next())
    }

    async fn get(&self, name: &str) -> WardenResult<SambaDomain> {
        self.domains.find(name).await?.ok_or_else(|| {
            raise_error!(
                format!("Samba domain '{}' not found.", name),
                ErrorCode::ResourceNotFound
            )
        })
    }

    /// Flagged default, else the configured name, else the only domain,
    /// else the transient in-memory domain.
    pub async fn default_domain(&self) -> WardenResult<ResolvedDomain> {
        let all = self.domains.find_all().await?;
        if let Some(domain) = all.iter().find(|d| d.is_default) {
            return Ok(ResolvedDomain {
                domain: domain.clone(),
                transient: false,
            });
        }
        if let Some(name) = &self.config.samba_domain {
            if let Some(domain) = all.iter().find(|d| &d.name == name) {
                return Ok(ResolvedDomain {
                    domain: domain.clone(),
                    transient: false,
                });
            }
        }
        if all.len() == 1 {
            return Ok(ResolvedDomain {
                domain: all[0].clone(),
                transient: false,
            });
        }
        warn!(
            "No default Samba domain among {} domain(s), using transient domain '{}'",
            all.len(),
            self.transient.name
        );
        Ok(ResolvedDomain {
            domain: self.transient.clone(),
            transient: true,
        })
    }

    pub async fn read(&self, auth: &Authentication, name: &str) -> WardenResult<SambaDomain> {
        self.authorizer
            .authorize(auth, Operation::ReadDomain, Some(&ObjectIdentity::domain(name)))
            .await?;
        self.get(name).await
    }

    pub async fn create(
        &self,
        auth: &Authentication,
        request: DomainCreateRequest,
    ) -> WardenResult<SambaDomain> {
        self.authorizer
            .authorize(auth, Operation::CreateDomain, None)
            .await?;
        request.validate()?;

        let name = request.name.trim().to_string();
        let sid = request.sid.trim().to_string();
        if self.domains.exists(&name).await? {
            return Err(raise_error!(
                format!("Samba domain '{}' already exists.", name),
                ErrorCode::AlreadyExists
            ));
        }
        if let Some(other) = self.find_by_name_or_sid(&sid).await? {
            return Err(raise_error!(
                format!("SID '{}' is already used by domain '{}'.", sid, other.name),
                ErrorCode::AlreadyExists
            ));
        }

        let seed = transient_seed(utc_now!() / 1000);
        let now = utc_now!();
        let domain = self
            .domains
            .insert(SambaDomain {
                name,
                sid,
                rid_base: request.rid_base.unwrap_or(self.config.samba_rid_base),
                next_uid: request.next_uid.unwrap_or(seed),
                next_gid: request.next_gid.unwrap_or(seed),
                is_default: request.is_default,
                created_at: now,
                updated_at: now,
            })
            .await?;
        self.acl.ensure_acl(&domain, None, None, false).await?;
        if domain.is_default {
            self.clear_other_defaults(&domain.name).await?;
        }
        info!("Created Samba domain '{}' ({})", domain.name, domain.sid);
        Ok(domain)
    }

    pub async fn update(
        &self,
        auth: &Authentication,
        name: &str,
        request: DomainUpdateRequest,
    ) -> WardenResult<SambaDomain> {
        self.authorizer
            .authorize(auth, Operation::UpdateDomain, Some(&ObjectIdentity::domain(name)))
            .await?;
        let domain = self
            .modify(name, |domain| {
                if let Some(rid_base) = request.rid_base {
                    domain.rid_base = rid_base;
                }
                if let Some(next_uid) = request.next_uid {
                    domain.next_uid = next_uid;
                }
                if let Some(next_gid) = request.next_gid {
                    domain.next_gid = next_gid;
                }
                if let Some(is_default) = request.is_default {
                    domain.is_default = is_default;
                }
            })
            .await?;
        if domain.is_default {
            self.clear_other_defaults(&domain.name).await?;
        }
        Ok(domain)
    }

    /// Applies `change` to a fresh copy of the domain and stores it with a
    /// compare-and-save. Counters drawn in between are never written back
    /// with a stale value.
    async fn modify<F>(&self, name: &str, change: F) -> WardenResult<SambaDomain>
    where
        F: Fn(&mut SambaDomain),
    {
        let mut conflicts: u16 = 0;
        loop {
            let current = self.get(name).await?;
            let mut updated = current.clone();
            change(&mut updated);
            updated.updated_at = utc_now!();
            if self
                .domains
                .compare_and_save(current, updated.clone())
                .await?
            {
                return Ok(updated);
            }
            conflicts += 1;
            if conflicts >= self.config.allocation_retries {
                return Err(raise_error!(
                    format!(
                        "Gave up updating Samba domain '{}' after {} conflicts",
                        name, conflicts
                    ),
                    ErrorCode::InternalError
                ));
            }
            debug!("Samba domain '{}' changed concurrently, retry {}", name, conflicts);
        }
    }

    async fn clear_other_defaults(&self, keep: &str) -> WardenResult<()> {
        let keep = keep.to_string();
        let flagged = self
            .domains
            .find_by(Box::new(move |d: &SambaDomain| d.is_default && d.name != keep))
            .await?;
        for domain in flagged {
            self.modify(&domain.name, |d| d.is_default = false).await?;
            info!("Samba domain '{}' is no longer the default", domain.name);
        }
        Ok(())
    }

    pub async fn delete(&self, auth: &Authentication, name: &str) -> WardenResult<()> {
        let oid = ObjectIdentity::domain(name);
        self.authorizer
            .authorize(auth, Operation::DeleteDomain, Some(&oid))
            .await?;
        if !self.domains.delete(name).await? {
            return Err(raise_error!(
                format!("Samba domain '{}' not found.", name),
                ErrorCode::ResourceNotFound
            ));
        }
        self.acl.delete_acls(&oid, true).await?;
        info!("Deleted Samba domain '{}'", name);
        Ok(())
    }

    pub async fn list(&self, auth: &Authentication) -> WardenResult<Vec<SambaDomain>> {
        self.authorizer
            .authorize(auth, Operation::ListDomains, None)
            .await?;
        let domains = self.domains.find_all().await?;
        self.heal(&domains).await?;
        let mut visible = Vec::new();
        for domain in domains {
            if self
                .authorizer
                .permits(auth, &domain.object_identity(), Permission::Read)
                .await?
            {
                visible.push(domain);
            }
        }
        Ok(visible)
    }

    async fn heal(&self, domains: &[SambaDomain]) -> WardenResult<usize> {
        let mut healed = 0;
        for domain in domains {
            if self.acl.ensure_acl(domain, None, None, false).await?.1 {
                healed += 1;
            }
        }
        Ok(healed)
    }

    /// Startup pass: gives every stored domain an ACL.
    pub async fn heal_acls(&self) -> WardenResult<usize> {
        let domains = self.domains.find_all().await?;
        self.heal(&domains).await
    }
}

/// Counter start for domains created without explicit counters.
pub fn transient_seed(epoch_secs: i64) -> u32 {
    10_000 + epoch_secs.rem_euclid(1_000_000) as u32
}
