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

use async_trait::async_trait;
use native_db::*;
use native_model::{native_model, Model};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::modules::database::{Keyed, NativeRepository, Repository};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::WardenResult;
use crate::modules::identity::directory::DirectoryUser;
use crate::raise_error;

/// Read-optimized projection of a `DirectoryUser`. Holds no credentials and
/// no POSIX or Samba data.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 20, version = 1)]
#[native_db]
pub struct ProfileDocument {
    #[primary_key]
    pub uid: String,
    pub display_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub language: Option<String>,
    pub time_zone: Option<String>,
    pub organisation: Option<String>,
    pub department: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProfileDocument {
    pub fn from_directory(user: &DirectoryUser, now: i64) -> Self {
        let mut document = Self {
            uid: user.uid.clone(),
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        document.mirror(user);
        document
    }

    /// Copies the mirrored fields; returns whether anything changed.
    pub fn mirror(&mut self, user: &DirectoryUser) -> bool {
        let before = self.clone();
        self.display_name = user.display_name.clone();
        self.first_name = user.first_name.clone();
        self.last_name = user.last_name.clone();
        self.email = user.email.clone();
        self.mobile = user.mobile.clone();
        self.language = user.language.clone();
        self.time_zone = user.time_zone.clone();
        self.organisation = user
            .organisation
            .as_ref()
            .and_then(|o| o.organisation.clone());
        self.department = user
            .organisation
            .as_ref()
            .and_then(|o| o.department.clone());
        *self != before
    }

    pub fn matches_directory(&self, user: &DirectoryUser) -> bool {
        let mut probe = self.clone();
        !probe.mirror(user) && self.uid == user.uid
    }

    fn searchable(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.uid.as_str()),
            Some(self.display_name.as_str()),
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.email.as_deref(),
            self.organisation.as_deref(),
            self.department.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    pub fn matches(&self, pattern: &Regex) -> bool {
        self.searchable().any(|field| pattern.is_match(field))
    }
}

impl Keyed for ProfileDocument {
    fn natural_key(&self) -> String {
        self.uid.clone()
    }
}

/// Document store contract: the repository operations plus querying.
#[async_trait]
pub trait DocumentStore: Repository<ProfileDocument> {
    /// Case-insensitive substring match over the searchable fields.
    async fn search_text(&self, query: &str) -> WardenResult<Vec<ProfileDocument>> {
        self.search_pattern(&format!("(?i){}", regex::escape(query.trim())))
            .await
    }

    /// Regular-expression match over the searchable fields.
    async fn search_pattern(&self, pattern: &str) -> WardenResult<Vec<ProfileDocument>>;
}

pub fn compile_pattern(pattern: &str) -> WardenResult<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(1 << 20)
        .build()
        .map_err(|e| {
            raise_error!(
                format!("Invalid search pattern '{}': {}", pattern, e),
                ErrorCode::InvalidParameter
            )
        })
}

#[async_trait]
impl DocumentStore for NativeRepository<ProfileDocument> {
    async fn search_pattern(&self, pattern: &str) -> WardenResult<Vec<ProfileDocument>> {
        let regex = compile_pattern(pattern)?;
        self.find_by(Box::new(move |doc: &ProfileDocument| doc.matches(&regex)))
            .await
    }
}
