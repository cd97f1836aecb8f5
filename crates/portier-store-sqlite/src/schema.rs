//! SQL schema for the Portier SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! the `PRAGMA user_version` number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS companies (
    company_id  TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS locations (
    location_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS gates (
    gate_id     TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    hardware_id INTEGER NOT NULL UNIQUE,  -- the id reader firmware reports
    location_id TEXT NOT NULL REFERENCES locations(location_id),
    kind        TEXT NOT NULL,            -- 'physical' | 'portable'
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS accounts (
    account_id   TEXT PRIMARY KEY,
    card_uid     TEXT UNIQUE,             -- NULL while no card is assigned
    display_name TEXT NOT NULL,
    kind         TEXT NOT NULL,           -- 'employee' | 'intern' | 'guest'
    company_id   TEXT NOT NULL REFERENCES companies(company_id),
    active       INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL
);

-- Grant source (a): static employee-gate assignment.
CREATE TABLE IF NOT EXISTS employee_gates (
    account_id TEXT NOT NULL REFERENCES accounts(account_id),
    gate_id    TEXT NOT NULL REFERENCES gates(gate_id),
    PRIMARY KEY (account_id, gate_id)
);

CREATE TABLE IF NOT EXISTS visits (
    visit_id    TEXT PRIMARY KEY,
    company_id  TEXT NOT NULL REFERENCES companies(company_id),
    purpose     TEXT,
    visit_date  TEXT NOT NULL,
    valid_until TEXT NOT NULL
);

-- Grant source (b): gates a visit opens to all of its guests.
CREATE TABLE IF NOT EXISTS visit_gates (
    visit_id TEXT NOT NULL REFERENCES visits(visit_id),
    gate_id  TEXT NOT NULL REFERENCES gates(gate_id),
    PRIMARY KEY (visit_id, gate_id)
);

CREATE TABLE IF NOT EXISTS visit_guests (
    visit_id   TEXT NOT NULL REFERENCES visits(visit_id),
    account_id TEXT NOT NULL REFERENCES accounts(account_id),
    PRIMARY KEY (visit_id, account_id)
);

-- Grant source (c): gates granted to one specific guest of a visit.
CREATE TABLE IF NOT EXISTS visit_guest_gates (
    visit_id   TEXT NOT NULL REFERENCES visits(visit_id),
    account_id TEXT NOT NULL REFERENCES accounts(account_id),
    gate_id    TEXT NOT NULL REFERENCES gates(gate_id),
    PRIMARY KEY (visit_id, account_id, gate_id)
);

-- The only mutable, short-lived table: at most one row per account, created
-- on entry and deleted on exit or card unassignment. Name columns are a
-- snapshot frozen at entry time.
CREATE TABLE IF NOT EXISTS occupancy (
    account_id   TEXT PRIMARY KEY REFERENCES accounts(account_id),
    gate_id      TEXT NOT NULL REFERENCES gates(gate_id),
    account_name TEXT NOT NULL,
    gate_name    TEXT NOT NULL,
    company_name TEXT NOT NULL,
    card_uid     TEXT NOT NULL,
    entered_at   TEXT NOT NULL
);

-- History is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS history (
    history_id   TEXT PRIMARY KEY,
    event_id     TEXT UNIQUE,             -- reader-assigned idempotency key
    account_id   TEXT,                    -- NULL for unresolved cards
    gate_id      TEXT,
    card_uid     TEXT NOT NULL,
    account_name TEXT,
    gate_name    TEXT,
    company_name TEXT,
    status       TEXT NOT NULL,           -- 'success' | 'denied'
    message      TEXT NOT NULL,
    tapped_at    TEXT NOT NULL,           -- reader clock
    synced_at    TEXT NOT NULL            -- server clock, write time
);

-- Violations are append-only; the running balance is the latest row's
-- balance_after.
CREATE TABLE IF NOT EXISTS violations (
    violation_id    TEXT PRIMARY KEY,
    account_id      TEXT NOT NULL REFERENCES accounts(account_id),
    balance_before  INTEGER NOT NULL,
    points_deducted INTEGER NOT NULL,
    balance_after   INTEGER NOT NULL,
    description     TEXT NOT NULL,
    violated_at     TEXT NOT NULL,
    scanned_at      TEXT
);

CREATE INDEX IF NOT EXISTS history_tapped_idx     ON history(tapped_at);
CREATE INDEX IF NOT EXISTS history_account_idx    ON history(account_id);
CREATE INDEX IF NOT EXISTS violations_account_idx ON violations(account_id, violated_at);

PRAGMA user_version = 1;
";
