//! SQL schema for the trialgraph SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// There are no foreign keys: folding one entity into another rewrites edge
/// keys in several statements, and edges may briefly point at a node that
/// is about to be written.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS companies (
    company_id          TEXT PRIMARY KEY,
    canonical_name      TEXT NOT NULL,
    aliases             TEXT NOT NULL DEFAULT '[]',
    org_type            TEXT NOT NULL,   -- 'industry' | 'academic' | ...
    org_type_provenance TEXT NOT NULL,   -- 'inferred' | 'user_confirmed'
    country             TEXT NOT NULL,   -- JSON Tracked<Option<String>>
    tickers             TEXT NOT NULL,   -- JSON Tracked<Set<String>>
    evidence            TEXT NOT NULL DEFAULT '[]'
);

-- Every tracked field is a JSON {value, provenance} object.
CREATE TABLE IF NOT EXISTS assets (
    asset_id        TEXT PRIMARY KEY,
    canonical_name  TEXT NOT NULL,
    synonyms        TEXT NOT NULL DEFAULT '[]',
    modality        TEXT NOT NULL,
    targets         TEXT NOT NULL,
    indications     TEXT NOT NULL,
    stage           TEXT NOT NULL,
    approved        TEXT NOT NULL,
    evidence        TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS trials (
    trial_id        TEXT PRIMARY KEY,
    title           TEXT,
    phase           TEXT,
    status          TEXT,
    enrollment      INTEGER,
    sponsors        TEXT NOT NULL DEFAULT '[]',
    interventions   TEXT NOT NULL DEFAULT '[]',
    conditions      TEXT NOT NULL DEFAULT '[]',
    source_urls     TEXT NOT NULL DEFAULT '[]',
    evidence        TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS relationships (
    company_id  TEXT NOT NULL,
    asset_id    TEXT NOT NULL,
    relation    TEXT NOT NULL,   -- 'owns' | 'licenses' | 'uses_as_comparator'
    confidence  REAL NOT NULL,
    provenance  TEXT NOT NULL,
    trial_ids   TEXT NOT NULL DEFAULT '[]',
    evidence    TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (company_id, asset_id, relation)
);

CREATE TABLE IF NOT EXISTS sponsor_links (
    company_id  TEXT NOT NULL,
    trial_id    TEXT NOT NULL,
    role        TEXT NOT NULL,   -- 'lead_sponsor' | 'collaborator'
    evidence    TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (company_id, trial_id)
);

CREATE TABLE IF NOT EXISTS asset_links (
    asset_id         TEXT NOT NULL,
    trial_id         TEXT NOT NULL,
    raw_names        TEXT NOT NULL DEFAULT '[]',
    combination_with TEXT NOT NULL DEFAULT '[]',
    evidence         TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (asset_id, trial_id)
);

CREATE INDEX IF NOT EXISTS relationships_asset_idx ON relationships(asset_id);
CREATE INDEX IF NOT EXISTS sponsor_links_trial_idx ON sponsor_links(trial_id);
CREATE INDEX IF NOT EXISTS asset_links_trial_idx   ON asset_links(trial_id);

PRAGMA user_version = 1;
";
