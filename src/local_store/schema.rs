//! Database schema for the local store.
//!
//! Defines versioned schema migrations for downloads, search history and
//! settings tables.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const DOWNLOADS_TABLE_V1: Table = Table {
    name: "downloads",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("format", &SqlType::Text, non_null = true),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("platform", &SqlType::Text, non_null = true),
        sqlite_column!("thumbnail", &SqlType::Text),
        sqlite_column!("size_bytes", &SqlType::Integer),
    ],
    indices: &[
        ("idx_downloads_timestamp", "timestamp"),
        ("idx_downloads_status", "status"),
    ],
};

const SEARCH_HISTORY_TABLE_V1: Table = Table {
    name: "search_history",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("query", &SqlType::Text, non_null = true),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("thumbnail", &SqlType::Text),
    ],
    indices: &[("idx_search_history_timestamp", "timestamp")],
};

const SETTINGS_TABLE_V1: Table = Table {
    name: "settings",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

/// All schema versions for the local store database, oldest first.
pub const LOCAL_STORE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        DOWNLOADS_TABLE_V1,
        SEARCH_HISTORY_TABLE_V1,
        SETTINGS_TABLE_V1,
    ],
    migration: None,
}];
