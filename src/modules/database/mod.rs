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

use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use itertools::Itertools;
use native_db::*;
use transaction::RwTransaction;

use crate::modules::acl::AclRecord;
use crate::modules::allocator::domain::SambaDomain;
use crate::modules::clients::OAuth2Client;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::{WardenError, WardenResult};
use crate::modules::groups::UserGroup;
use crate::modules::identity::directory::DirectoryUser;
use crate::modules::identity::document::ProfileDocument;
use crate::modules::roles::RoleModel;
use crate::raise_error;

pub mod manager;

pub static DIRECTORY_MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut adapter = ModelsAdapter::new();
    adapter.register_directory_models();
    adapter.models
});

pub static DOCUMENT_MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut adapter = ModelsAdapter::new();
    adapter.register_document_models();
    adapter.models
});

pub struct ModelsAdapter {
    pub models: Models,
}

impl ModelsAdapter {
    pub fn new() -> Self {
        ModelsAdapter {
            models: Models::new(),
        }
    }

    pub fn register_model<T: ToInput>(&mut self) {
        self.models.define::<T>().expect("failed to define model ");
    }

    /// Authoritative identity entities.
    pub fn register_directory_models(&mut self) {
        self.register_model::<DirectoryUser>();
        self.register_model::<UserGroup>();
        self.register_model::<RoleModel>();
        self.register_model::<SambaDomain>();
        self.register_model::<OAuth2Client>();
    }

    pub fn register_document_models(&mut self) {
        self.register_model::<ProfileDocument>();
        self.register_model::<AclRecord>();
    }
}

/// Natural key of a stored entity (uid, role name, group name, ...).
pub trait Keyed {
    fn natural_key(&self) -> String;
}

pub type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Collaborator contract both the directory and the document store fulfil.
///
/// `insert` fails with `AlreadyExists` when the natural key is taken, which is
/// what the create-if-missing paths rely on instead of locking. `save` is an
/// upsert. `compare_and_save` only writes when the stored value still equals
/// `expected`.
#[async_trait]
pub trait Repository<T>: Send + Sync {
    async fn find(&self, key: &str) -> WardenResult<Option<T>>;

    async fn exists(&self, key: &str) -> WardenResult<bool> {
        Ok(self.find(key).await?.is_some())
    }

    async fn find_all(&self) -> WardenResult<Vec<T>>;

    async fn find_by(&self, filter: Filter<T>) -> WardenResult<Vec<T>>;

    async fn insert(&self, item: T) -> WardenResult<T>;

    async fn save(&self, item: T) -> WardenResult<T>;

    async fn compare_and_save(&self, expected: T, updated: T) -> WardenResult<bool>;

    /// Returns whether something was removed.
    async fn delete(&self, key: &str) -> WardenResult<bool>;
}

/// `Repository` over one `native_db` database.
pub struct NativeRepository<T> {
    database: Arc<Database<'static>>,
    _model: PhantomData<fn() -> T>,
}

impl<T> NativeRepository<T> {
    pub fn new(database: Arc<Database<'static>>) -> Self {
        Self {
            database,
            _model: PhantomData,
        }
    }
}

#[async_trait]
impl<T> Repository<T> for NativeRepository<T>
where
    T: ToInput + Keyed + Clone + PartialEq + Send + Sync + 'static,
{
    async fn find(&self, key: &str) -> WardenResult<Option<T>> {
        async_find_impl(&self.database, key.to_string()).await
    }

    async fn find_all(&self) -> WardenResult<Vec<T>> {
        list_all_impl(&self.database).await
    }

    async fn find_by(&self, filter: Filter<T>) -> WardenResult<Vec<T>> {
        let all = list_all_impl::<T>(&self.database).await?;
        Ok(all.into_iter().filter(|item| filter(item)).collect())
    }

    async fn insert(&self, item: T) -> WardenResult<T> {
        insert_unique_impl(&self.database, item.clone()).await?;
        Ok(item)
    }

    async fn save(&self, item: T) -> WardenResult<T> {
        upsert_impl(&self.database, item.clone()).await?;
        Ok(item)
    }

    async fn compare_and_save(&self, expected: T, updated: T) -> WardenResult<bool> {
        compare_and_swap_impl(&self.database, expected, updated).await
    }

    async fn delete(&self, key: &str) -> WardenResult<bool> {
        delete_by_key_impl::<T>(&self.database, key.to_string()).await
    }
}

/// Unique-key violations become `AlreadyExists`, everything else is internal.
pub fn map_db_error(error: db_type::Error) -> WardenError {
    match error {
        db_type::Error::DuplicateKey { .. } => {
            raise_error!(format!("{:#?}", error), ErrorCode::AlreadyExists)
        }
        other => raise_error!(format!("{:#?}", other), ErrorCode::InternalError),
    }
}

fn join_error(e: tokio::task::JoinError) -> WardenError {
    raise_error!(format!("{:#?}", e), ErrorCode::InternalError)
}

pub async fn insert_unique_impl<T: ToInput + Keyed + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    item: T,
) -> WardenResult<()> {
    let db = database.clone();
    tokio::task::spawn_blocking(move || {
        let rw = db.rw_transaction().map_err(map_db_error)?;
        let key = item.natural_key();
        let existing: Option<T> = rw.get().primary(key.clone()).map_err(map_db_error)?;
        if existing.is_some() {
            return Err(raise_error!(
                format!("An entry with key '{}' already exists.", key),
                ErrorCode::AlreadyExists
            ));
        }
        rw.insert(item).map_err(map_db_error)?;
        rw.commit().map_err(map_db_error)?;
        Ok(())
    })
    .await
    .map_err(join_error)?
}

pub async fn upsert_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    item: T,
) -> WardenResult<()> {
    let db = database.clone();
    tokio::task::spawn_blocking(move || {
        let rw = db.rw_transaction().map_err(map_db_error)?;
        rw.upsert(item).map_err(map_db_error)?;
        rw.commit().map_err(map_db_error)?;
        Ok(())
    })
    .await
    .map_err(join_error)?
}

pub async fn compare_and_swap_impl<T: ToInput + Keyed + Clone + PartialEq + Send + 'static>(
    database: &Arc<Database<'static>>,
    expected: T,
    updated: T,
) -> WardenResult<bool> {
    let db = database.clone();
    tokio::task::spawn_blocking(move || {
        let rw = db.rw_transaction().map_err(map_db_error)?;
        let current: Option<T> = rw
            .get()
            .primary(expected.natural_key())
            .map_err(map_db_error)?;
        match current {
            Some(current) if current == expected => {
                rw.update(current, updated).map_err(map_db_error)?;
                rw.commit().map_err(map_db_error)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    })
    .await
    .map_err(join_error)?
}

pub async fn async_find_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    key: impl ToKey + Send + 'static,
) -> WardenResult<Option<T>> {
    let db = database.clone();
    tokio::task::spawn_blocking(move || {
        let r_transaction = db.r_transaction().map_err(map_db_error)?;
        let entity: Option<T> = r_transaction.get().primary(key).map_err(map_db_error)?;
        Ok(entity)
    })
    .await
    .map_err(join_error)?
}

pub async fn delete_by_key_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    key: String,
) -> WardenResult<bool> {
    with_transaction(database, move |rw| {
        let existing: Option<T> = rw.get().primary(key).map_err(map_db_error)?;
        match existing {
            Some(item) => {
                rw.remove(item).map_err(map_db_error)?;
                Ok(true)
            }
            None => Ok(false),
        }
    })
    .await
}

pub async fn list_all_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
) -> WardenResult<Vec<T>> {
    let db = database.clone();
    tokio::task::spawn_blocking(move || {
        let r_transaction = db.r_transaction().map_err(map_db_error)?;
        let entities: Vec<T> = r_transaction
            .scan()
            .primary()
            .map_err(map_db_error)?
            .all()
            .map_err(map_db_error)?
            .try_collect()
            .map_err(map_db_error)?;
        Ok(entities)
    })
    .await
    .map_err(join_error)?
}

pub async fn with_transaction<R: Send + 'static>(
    database: &Arc<Database<'static>>,
    f: impl FnOnce(&RwTransaction) -> WardenResult<R> + Send + 'static,
) -> WardenResult<R> {
    let db = database.clone();
    tokio::task::spawn_blocking(move || {
        let rw_transaction = db.rw_transaction().map_err(map_db_error)?;
        let result = f(&rw_transaction)?;
        rw_transaction.commit().map_err(map_db_error)?;
        Ok(result)
    })
    .await
    .map_err(join_error)?
}
