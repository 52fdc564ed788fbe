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

use std::path::PathBuf;

use crate::modules::settings::cli::Settings;

pub mod cli;

/// Resolved runtime configuration shared by the services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WardenConfig {
    pub root_dir: PathBuf,
    pub directory_cache_size: usize,
    pub document_cache_size: usize,
    pub system_principal: String,
    pub admin_roles: Vec<String>,
    pub system_roles: Vec<String>,
    pub extra_roles: Vec<String>,
    pub friends_role_prefix: String,
    pub custom_role_prefix: String,
    pub samba_domain: Option<String>,
    pub samba_sid_prefix: String,
    pub samba_rid_base: u32,
    pub home_directory_base: String,
    pub login_shell: String,
    pub allocation_retries: u16,
    pub reconcile_on_startup: bool,
}

impl WardenConfig {
    /// Admin roles followed by system roles, without duplicates.
    pub fn privileged_roles(&self) -> Vec<String> {
        let mut roles = self.admin_roles.clone();
        for role in &self.system_roles {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }
        roles
    }

    pub fn directory_db_path(&self) -> PathBuf {
        self.root_dir.join("directory.db")
    }

    pub fn document_db_path(&self) -> PathBuf {
        self.root_dir.join("document.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root_dir.join("logs")
    }
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/tmp/warden"),
            directory_cache_size: 67108864,
            document_cache_size: 67108864,
            system_principal: "system".into(),
            admin_roles: vec!["ROLE_ADMIN".into(), "ROLE_ACL_ADMIN".into()],
            system_roles: vec!["ROLE_SYSTEM".into()],
            extra_roles: vec![],
            friends_role_prefix: "ROLE_FRIENDS_".into(),
            custom_role_prefix: "ROLE_CUSTOM_".into(),
            samba_domain: None,
            samba_sid_prefix: "S-1-5-21-0-0-0".into(),
            samba_rid_base: 1000,
            home_directory_base: "/home".into(),
            login_shell: "/bin/bash".into(),
            allocation_retries: 16,
            reconcile_on_startup: false,
        }
    }
}

impl From<&Settings> for WardenConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            root_dir: PathBuf::from(&settings.warden_root_dir),
            // native_db refuses tiny caches
            directory_cache_size: settings
                .warden_directory_cache_size
                .unwrap_or(67108864)
                .max(8388608),
            document_cache_size: settings
                .warden_document_cache_size
                .unwrap_or(67108864)
                .max(8388608),
            system_principal: settings.warden_system_principal.clone(),
            admin_roles: settings.warden_admin_roles.iter().cloned().collect(),
            system_roles: settings.warden_system_roles.iter().cloned().collect(),
            extra_roles: settings.warden_extra_roles.iter().cloned().collect(),
            friends_role_prefix: settings.warden_friends_role_prefix.clone(),
            custom_role_prefix: settings.warden_custom_role_prefix.clone(),
            samba_domain: settings
                .warden_samba_domain
                .clone()
                .filter(|d| !d.trim().is_empty()),
            samba_sid_prefix: settings.warden_samba_sid_prefix.clone(),
            samba_rid_base: settings.warden_samba_rid_base,
            home_directory_base: settings
                .warden_home_directory_base
                .trim_end_matches('/')
                .to_string(),
            login_shell: settings.warden_login_shell.clone(),
            allocation_retries: settings.warden_allocation_retries,
            reconcile_on_startup: settings.warden_reconcile_on_startup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::settings::cli::SETTINGS;

    #[test]
    fn config_from_test_settings_matches_defaults() {
        let config = WardenConfig::from(&*SETTINGS);
        let defaults = WardenConfig::default();
        let mut admin_roles = defaults.admin_roles.clone();
        admin_roles.sort();
        assert_eq!(config.admin_roles, admin_roles);
        assert_eq!(config.system_roles, defaults.system_roles);
        assert_eq!(config.friends_role_prefix, defaults.friends_role_prefix);
        assert_eq!(config.samba_rid_base, 1000);
        assert_eq!(config.directory_db_path(), config.root_dir.join("directory.db"));
    }

    #[test]
    fn privileged_roles_deduplicate() {
        let config = WardenConfig {
            admin_roles: vec!["ROLE_ADMIN".into(), "ROLE_SYSTEM".into()],
            system_roles: vec!["ROLE_SYSTEM".into()],
            ..Default::default()
        };
        assert_eq!(
            config.privileged_roles(),
            vec!["ROLE_ADMIN".to_string(), "ROLE_SYSTEM".to_string()]
        );
    }
}
