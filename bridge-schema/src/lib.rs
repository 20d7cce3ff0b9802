// Copyright (c) Skybridge Labs
// SPDX-License-Identifier: Apache-2.0

pub mod models;
pub mod schema;

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
