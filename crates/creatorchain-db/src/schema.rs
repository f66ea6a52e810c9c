//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Projects & contributors (written by onboarding)
-- ============================================================

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    creator TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
        CHECK (status IN ('active', 'inactive', 'completed')),
    total_revenue INTEGER NOT NULL DEFAULT 0 CHECK (total_revenue >= 0),
    total_distributed INTEGER NOT NULL DEFAULT 0 CHECK (total_distributed >= 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK (total_distributed <= total_revenue)
);

CREATE TABLE IF NOT EXISTS contributors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    wallet TEXT NOT NULL,
    share_bps INTEGER NOT NULL CHECK (share_bps > 0 AND share_bps <= 10000),
    role TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'confirmed', 'declined')),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_contributors_project ON contributors(project_id, status);

-- ============================================================
-- Revenue pools & payouts (written by the settlement engine)
-- ============================================================

CREATE TABLE IF NOT EXISTS revenue_pools (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id),
    source TEXT NOT NULL CHECK (source IN ('marketplace', 'direct', 'other')),
    token TEXT NOT NULL,
    total_amount INTEGER NOT NULL CHECK (total_amount > 0),
    distributed_amount INTEGER NOT NULL DEFAULT 0 CHECK (distributed_amount >= 0),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'distributing', 'completed', 'failed')),
    fee_bps INTEGER,
    platform_fee INTEGER,
    source_metadata TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK (distributed_amount <= total_amount)
);

CREATE INDEX IF NOT EXISTS idx_pools_project ON revenue_pools(project_id);

CREATE TRIGGER IF NOT EXISTS trg_pool_total_immutable
BEFORE UPDATE OF total_amount ON revenue_pools
WHEN NEW.total_amount != OLD.total_amount
BEGIN
    SELECT RAISE(ABORT, 'revenue_pools.total_amount is immutable');
END;

CREATE TRIGGER IF NOT EXISTS trg_pool_distributed_monotonic
BEFORE UPDATE OF distributed_amount ON revenue_pools
WHEN NEW.distributed_amount < OLD.distributed_amount
BEGIN
    SELECT RAISE(ABORT, 'revenue_pools.distributed_amount cannot decrease');
END;

CREATE TABLE IF NOT EXISTS payouts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pool_id INTEGER NOT NULL REFERENCES revenue_pools(id),
    contributor_id INTEGER NOT NULL REFERENCES contributors(id),
    amount INTEGER NOT NULL CHECK (amount >= 0),
    attempt INTEGER NOT NULL CHECK (attempt >= 1),
    reference TEXT,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'processing', 'completed', 'failed', 'ambiguous')),
    failure_reason TEXT,
    confirmations INTEGER,
    block_number INTEGER,
    timestamp INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (pool_id, contributor_id, attempt)
);

-- Idempotency key: at most one pending/processing payout per pair.
CREATE UNIQUE INDEX IF NOT EXISTS idx_payouts_active
    ON payouts(pool_id, contributor_id)
    WHERE status IN ('pending', 'processing');

CREATE INDEX IF NOT EXISTS idx_payouts_pool ON payouts(pool_id, id);
"#;
