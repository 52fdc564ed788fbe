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

use crate::modules::database::{DIRECTORY_MODELS, DOCUMENT_MODELS};
use crate::modules::error::{code::ErrorCode, WardenError, WardenResult};
use crate::modules::settings::WardenConfig;
use crate::raise_error;
use native_db::{Builder, Database, Models};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The two backing stores: the authoritative directory and the document
/// projection (profile documents and ACL records).
#[derive(Clone)]
pub struct DatabaseManager {
    directory_db: Arc<Database<'static>>,
    document_db: Arc<Database<'static>>,
}

impl DatabaseManager {
    pub fn open(config: &WardenConfig) -> WardenResult<Self> {
        let directory_db = Self::init_database(
            &DIRECTORY_MODELS,
            &config.directory_db_path(),
            config.directory_cache_size,
        )?;
        let document_db = Self::init_database(
            &DOCUMENT_MODELS,
            &config.document_db_path(),
            config.document_cache_size,
        )?;
        Ok(Self {
            directory_db,
            document_db,
        })
    }

    pub fn in_memory() -> WardenResult<Self> {
        let directory_db = Builder::new()
            .create_in_memory(&DIRECTORY_MODELS)
            .map_err(Self::handle_database_error)?;
        let document_db = Builder::new()
            .create_in_memory(&DOCUMENT_MODELS)
            .map_err(Self::handle_database_error)?;
        Ok(Self {
            directory_db: Arc::new(directory_db),
            document_db: Arc::new(document_db),
        })
    }

    pub fn directory_db(&self) -> &Arc<Database<'static>> {
        &self.directory_db
    }

    pub fn document_db(&self) -> &Arc<Database<'static>> {
        &self.document_db
    }

    fn init_database(
        models: &'static Models,
        path: &Path,
        cache_size: usize,
    ) -> WardenResult<Arc<Database<'static>>> {
        info!("Initializing database at: {:?}", path);
        let mut database = Builder::new()
            .set_cache_size(cache_size)
            .create(models, path)
            .map_err(Self::handle_database_error)?;

        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Arc::new(database))
    }

    fn handle_database_error(error: native_db::db_type::Error) -> WardenError {
        raise_error!(
            format!("Failed to create database: {:?}", error),
            ErrorCode::InternalError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_both_databases_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = WardenConfig {
            root_dir: dir.path().to_path_buf(),
            ..WardenConfig::default()
        };
        let manager = DatabaseManager::open(&config).unwrap();
        assert!(config.directory_db_path().exists());
        assert!(config.document_db_path().exists());
        drop(manager);
    }
}
