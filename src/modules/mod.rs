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

pub mod acl;
pub mod allocator;
pub mod attributes;
pub mod auth;
pub mod clients;
pub mod context;
pub mod database;
pub mod error;
pub mod groups;
pub mod identity;
pub mod logger;
pub mod roles;
pub mod settings;
pub mod utils;

#[cfg(test)]
pub mod testing;
