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

use mimalloc::MiMalloc;
use tracing::{error, info};
use warden::modules::{
    context::{Stores, Warden},
    database::manager::DatabaseManager,
    error::WardenResult,
    logger,
    settings::{cli::SETTINGS, WardenConfig},
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static LOGO: &str = r#"
                         _
__      ____ _ _ __ __| | ___ _ __
\ \ /\ / / _` | '__/ _` |/ _ \ '_ \
 \ V  V / (_| | | | (_| |  __/ | | |
  \_/\_/ \__,_|_|  \__,_|\___|_| |_|
"#;

#[cfg(not(test))]
#[tokio::main]
async fn main() -> WardenResult<()> {
    let _guard = logger::initialize_logging();
    info!("{}", LOGO);
    info!("Starting warden");
    info!("Version:  {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = initialize().await {
        error!("Startup failed: {:?}", e);
        eprintln!("{:?}", e);
        return Err(e);
    }
    Ok(())
}

/// Opens both stores, seeds the built-in roles and heals missing ACLs.
/// With reconciliation enabled, every directory user gets its document,
/// ACLs and default roles.
async fn initialize() -> WardenResult<()> {
    let config = Arc::new(WardenConfig::from(&*SETTINGS));
    info!("Data directory: {}", config.root_dir.display());

    let databases = DatabaseManager::open(&config)?;
    let warden = Warden::new(Stores::native(&databases), config);
    let report = warden.initialize().await?;

    match serde_json::to_string(&report) {
        Ok(json) => info!("Startup finished: {}", json),
        Err(e) => error!("Failed to serialize the startup report: {:?}", e),
    }
    Ok(())
}
