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

use clap::{builder::ValueParser, Parser};
use std::{collections::BTreeSet, path::PathBuf, sync::LazyLock};

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(|| {
    let root_dir =
        std::env::var("WARDEN_ROOT_DIR").unwrap_or_else(|_| "/tmp/warden_test".to_string());
    std::fs::create_dir_all(&root_dir).ok();

    Settings {
        warden_log_level: "info".to_string(),
        warden_ansi_logs: true,
        warden_log_to_file: false,
        warden_json_logs: false,
        warden_max_server_log_files: 5,
        warden_root_dir: root_dir,
        warden_directory_cache_size: Some(67108864),
        warden_document_cache_size: Some(67108864),
        warden_system_principal: "system".to_string(),
        warden_admin_roles: BTreeSet::from(["ROLE_ADMIN".into(), "ROLE_ACL_ADMIN".into()]),
        warden_system_roles: BTreeSet::from(["ROLE_SYSTEM".into()]),
        warden_extra_roles: BTreeSet::new(),
        warden_friends_role_prefix: "ROLE_FRIENDS_".to_string(),
        warden_custom_role_prefix: "ROLE_CUSTOM_".to_string(),
        warden_samba_domain: None,
        warden_samba_sid_prefix: "S-1-5-21-0-0-0".to_string(),
        warden_samba_rid_base: 1000,
        warden_home_directory_base: "/home".to_string(),
        warden_login_shell: "/bin/bash".to_string(),
        warden_allocation_retries: 16,
        warden_reconcile_on_startup: false,
    }
});

fn parse_role_list(s: &str) -> Result<BTreeSet<String>, String> {
    let mut roles = BTreeSet::new();
    for role in s.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        if role.chars().any(char::is_whitespace) {
            return Err(format!("Role name '{}' must not contain whitespace", role));
        }
        roles.insert(role.to_string());
    }
    Ok(roles)
}

#[derive(Debug, Parser)]
#[clap(
    name = "warden",
    about = "Identity, role and ACL backend reconciling a directory store with a document store",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// warden log level (default: "info")
    #[clap(long, default_value = "info", env, help = "Set the log level for warden")]
    pub warden_log_level: String,

    /// Enable ANSI logs (default: true)
    #[clap(long, default_value = "true", env, help = "Enable ANSI formatted logs")]
    pub warden_ansi_logs: bool,

    /// If false, logs will be printed to stdout
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable log file output (otherwise logs go to stdout)"
    )]
    pub warden_log_to_file: bool,

    #[clap(long, default_value = "false", env, help = "Enable JSON formatted logs")]
    pub warden_json_logs: bool,

    #[clap(
        long,
        default_value = "5",
        env,
        help = "Set the maximum number of server log files"
    )]
    pub warden_max_server_log_files: usize,

    #[clap(
        long,
        env,
        help = "Set the directory holding the warden databases and logs",
        value_parser = ValueParser::new(|s: &str| {
            let path = PathBuf::from(s);
            if !path.is_absolute() {
                return Err("Path must be an absolute directory path".to_string());
            }
            if !path.exists() {
                return Err(format!("Path {:?} does not exist", path));
            }
            if !path.is_dir() {
                return Err(format!("Path {:?} is not a directory", path));
            }
            Ok(s.to_string())
        })
    )]
    pub warden_root_dir: String,

    #[clap(
        long,
        env,
        default_value = "67108864",
        help = "Set the cache size for the directory database in bytes"
    )]
    pub warden_directory_cache_size: Option<usize>,

    #[clap(
        long,
        env,
        default_value = "67108864",
        help = "Set the cache size for the document database in bytes"
    )]
    pub warden_document_cache_size: Option<usize>,

    /// Principal that owns entities created without an explicit owner.
    #[clap(long, default_value = "system", env, help = "Name of the system principal")]
    pub warden_system_principal: String,

    /// Roles granted full control on every new ACL.
    #[clap(
        long,
        env,
        default_value = "ROLE_ADMIN,ROLE_ACL_ADMIN",
        help = "Comma-separated administrator roles",
        value_parser = ValueParser::new(parse_role_list)
    )]
    pub warden_admin_roles: BTreeSet<String>,

    #[clap(
        long,
        env,
        default_value = "ROLE_SYSTEM",
        help = "Comma-separated system roles",
        value_parser = ValueParser::new(parse_role_list)
    )]
    pub warden_system_roles: BTreeSet<String>,

    #[clap(
        long,
        env,
        default_value = "",
        help = "Comma-separated roles seeded at startup besides the built-in ones",
        value_parser = ValueParser::new(parse_role_list)
    )]
    pub warden_extra_roles: BTreeSet<String>,

    #[clap(long, default_value = "ROLE_FRIENDS_", env, help = "Prefix of per-user friends roles")]
    pub warden_friends_role_prefix: String,

    #[clap(long, default_value = "ROLE_CUSTOM_", env, help = "Prefix of per-user custom roles")]
    pub warden_custom_role_prefix: String,

    /// Name of the Samba domain used for identifier allocation when no
    /// domain is flagged as default.
    #[clap(long, env, help = "Default Samba domain name")]
    pub warden_samba_domain: Option<String>,

    #[clap(
        long,
        default_value = "S-1-5-21-0-0-0",
        env,
        help = "SID prefix used when a Samba domain cannot be resolved"
    )]
    pub warden_samba_sid_prefix: String,

    #[clap(
        long,
        default_value = "1000",
        env,
        help = "RID base used when a Samba domain cannot be resolved"
    )]
    pub warden_samba_rid_base: u32,

    #[clap(long, default_value = "/home", env, help = "Base of generated home directories")]
    pub warden_home_directory_base: String,

    #[clap(long, default_value = "/bin/bash", env, help = "Default POSIX login shell")]
    pub warden_login_shell: String,

    #[clap(
        long,
        default_value = "16",
        env,
        help = "How often an identifier allocation is retried after a concurrent update",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub warden_allocation_retries: u16,

    /// Materializes every missing profile document and ACL at startup.
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Run the full directory/document reconciliation at startup"
    )]
    pub warden_reconcile_on_startup: bool,
}
