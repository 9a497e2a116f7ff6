//! SQL schema for the KIR SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS households (
    id                TEXT PRIMARY KEY,
    env               TEXT NOT NULL,
    no_kp_normalized  TEXT,            -- NULL when no usable national ID
    fields_json       TEXT NOT NULL,   -- scalar attributes, keyed by stored name
    sets_json         TEXT NOT NULL,   -- set-valued attributes
    created_at        TEXT,            -- RFC 3339 UTC; may be missing
    updated_at        TEXT,
    merge_history     TEXT NOT NULL DEFAULT '[]'
);

-- One table for every dependent collection. `kir_id` is not a foreign key.
CREATE TABLE IF NOT EXISTS related_documents (
    id          TEXT PRIMARY KEY,
    collection  TEXT NOT NULL,         -- RelatedCollection storage name
    kir_id      TEXT NOT NULL,
    data_json   TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT,
    merge_note  TEXT
);

CREATE TABLE IF NOT EXISTS index_nokp (
    id                TEXT PRIMARY KEY,
    env               TEXT NOT NULL,
    no_kp_normalized  TEXT NOT NULL,
    kir_id            TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    UNIQUE (env, no_kp_normalized)
);

CREATE INDEX IF NOT EXISTS households_env_key_idx ON households(env, no_kp_normalized);
CREATE INDEX IF NOT EXISTS related_kir_idx        ON related_documents(collection, kir_id);
CREATE INDEX IF NOT EXISTS index_nokp_kir_idx     ON index_nokp(kir_id);

PRAGMA user_version = 1;
";
