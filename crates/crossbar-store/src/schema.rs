//! Schema migrations
//!
//! Migrations are idempotent and tracked by name in `_migrations`; each
//! applies inside its own transaction.

use jiff::Timestamp;

/// Ordered migration list; never reorder or edit an applied entry
const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_schema", SCHEMA_SQL),
    ("0002_seed", SEED_SQL),
];

const SCHEMA_SQL: &str = "
    CREATE TABLE models (
        id                        TEXT PRIMARY KEY,
        display_name              TEXT NOT NULL,
        provider                  TEXT NOT NULL,
        location                  TEXT NOT NULL,
        endpoint                  TEXT NOT NULL,
        wire_format               TEXT NOT NULL DEFAULT 'openai',
        api_key_env               TEXT,
        quality_score             INTEGER NOT NULL DEFAULT 0,
        context_window            INTEGER NOT NULL DEFAULT 8192,
        max_output_tokens         INTEGER NOT NULL DEFAULT 1024,
        supports_tools            INTEGER NOT NULL DEFAULT 0,
        supports_vision           INTEGER NOT NULL DEFAULT 0,
        supports_reasoning        INTEGER NOT NULL DEFAULT 0,
        price_in_per_mtok         REAL NOT NULL DEFAULT 0,
        price_out_per_mtok        REAL NOT NULL DEFAULT 0,
        price_cache_read_per_mtok  REAL NOT NULL DEFAULT 0,
        price_cache_write_per_mtok REAL NOT NULL DEFAULT 0,
        latency_p50_ms            REAL,
        latency_p95_ms            REAL,
        hardware                  TEXT,
        enabled                   INTEGER NOT NULL DEFAULT 1,
        is_healthy                INTEGER NOT NULL DEFAULT 1,
        last_health_check         INTEGER,
        last_used_at              INTEGER
    );

    CREATE TABLE model_capabilities (
        model_id   TEXT NOT NULL REFERENCES models(id) ON DELETE CASCADE,
        capability TEXT NOT NULL,
        PRIMARY KEY (model_id, capability)
    );

    CREATE TABLE routing_rules (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        priority        INTEGER NOT NULL,
        source          TEXT,
        channel         TEXT,
        pattern         TEXT,
        token_max       INTEGER,
        has_media       INTEGER,
        target_model_id TEXT,
        action          TEXT NOT NULL DEFAULT 'route',
        enabled         INTEGER NOT NULL DEFAULT 1
    );
    CREATE INDEX idx_rules_priority ON routing_rules(priority);

    CREATE TABLE routing_policy (
        id                   INTEGER PRIMARY KEY CHECK (id = 1),
        min_quality_score    INTEGER NOT NULL DEFAULT 0,
        max_cost_per_million REAL NOT NULL DEFAULT 0,
        max_latency_ms       INTEGER NOT NULL DEFAULT 0,
        preferred_locations  TEXT NOT NULL DEFAULT 'colocated,lan,cloud',
        quality_tolerance    INTEGER NOT NULL DEFAULT 15,
        daily_budget_usd     REAL NOT NULL DEFAULT 0,
        monthly_budget_usd   REAL NOT NULL DEFAULT 0,
        fallback_model_id    TEXT,
        router_model_id      TEXT,
        self_model_id        TEXT
    );

    CREATE TABLE complexity_floors (
        complexity    TEXT PRIMARY KEY,
        quality_floor INTEGER NOT NULL
    );

    CREATE TABLE task_capabilities (
        task_type  TEXT PRIMARY KEY,
        capability TEXT NOT NULL
    );

    CREATE TABLE budget_spend (
        period_type     TEXT NOT NULL,
        period_key      TEXT NOT NULL,
        total_spend_usd REAL NOT NULL DEFAULT 0,
        input_tokens    INTEGER NOT NULL DEFAULT 0,
        output_tokens   INTEGER NOT NULL DEFAULT 0,
        request_count   INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (period_type, period_key)
    );

    CREATE TABLE provider_rate_limits (
        provider      TEXT PRIMARY KEY,
        is_limited    INTEGER NOT NULL DEFAULT 0,
        limited_since INTEGER,
        retry_after   INTEGER,
        rpm_used      INTEGER,
        tpm_used      INTEGER
    );

    CREATE TABLE health_log (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        model_id             TEXT NOT NULL,
        timestamp            INTEGER NOT NULL,
        is_healthy           INTEGER NOT NULL,
        latency_ms           REAL,
        error                TEXT,
        consecutive_failures INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX idx_health_log_model ON health_log(model_id, timestamp);

    CREATE TABLE request_log (
        id             TEXT PRIMARY KEY,
        timestamp      INTEGER NOT NULL,
        tier           INTEGER NOT NULL,
        rule_id        INTEGER,
        classification TEXT,
        selected_model TEXT NOT NULL,
        input_tokens   INTEGER NOT NULL DEFAULT 0,
        output_tokens  INTEGER NOT NULL DEFAULT 0,
        cost_usd       REAL NOT NULL DEFAULT 0,
        latency_ms     INTEGER NOT NULL DEFAULT 0,
        success        INTEGER NOT NULL DEFAULT 1,
        preview        TEXT
    );
    CREATE INDEX idx_request_log_time ON request_log(timestamp);
";

const SEED_SQL: &str = r"
    INSERT INTO complexity_floors (complexity, quality_floor) VALUES
        ('simple', 0),
        ('medium', 40),
        ('complex', 65),
        ('reasoning', 80);

    INSERT INTO task_capabilities (task_type, capability) VALUES
        ('coding', 'coding'),
        ('math', 'math'),
        ('reasoning', 'complex_logic'),
        ('tool_use', 'tool_calling'),
        ('summarization', 'summarization'),
        ('extraction', 'extraction'),
        ('simple_qa', 'simple_qa'),
        ('conversation', 'conversation'),
        ('classification', 'classification'),
        ('analysis', 'analysis'),
        ('writing', 'writing'),
        ('multi_step', 'multi_step');

    INSERT INTO models (id, display_name, provider, location, endpoint,
                        wire_format, quality_score, context_window,
                        max_output_tokens)
    VALUES ('local/llama3.2:3b', 'Llama 3.2 3B (local)', 'local',
            'colocated', 'http://127.0.0.1:11434/v1', 'openai', 35, 8192,
            1024);

    INSERT INTO model_capabilities (model_id, capability) VALUES
        ('local/llama3.2:3b', 'conversation'),
        ('local/llama3.2:3b', 'simple_qa'),
        ('local/llama3.2:3b', 'summarization'),
        ('local/llama3.2:3b', 'classification');

    INSERT INTO routing_policy (id, preferred_locations, quality_tolerance,
                                daily_budget_usd, monthly_budget_usd,
                                fallback_model_id, router_model_id,
                                self_model_id)
    VALUES (1, 'colocated,lan,cloud', 15, 5.0, 50.0,
            'local/llama3.2:3b', 'local/llama3.2:3b', 'local/llama3.2:3b');

    INSERT INTO routing_rules (priority, source, action)
        VALUES (10, 'heartbeat', 'route_self');
    INSERT INTO routing_rules (priority, source, action)
        VALUES (20, 'cron', 'route_self');
    INSERT INTO routing_rules (priority, pattern, token_max, action)
        VALUES (40, '^(hi|hello|hey|yo|ping|thanks|thank you)[[:space:].!?]*$',
                200, 'route_self');
    INSERT INTO routing_rules (priority, action)
        VALUES (100, 'classify');
";

/// Apply all pending migrations
pub fn apply_migrations(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name       TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM _migrations WHERE name = ?1)",
            rusqlite::params![name],
            |row| row.get(0),
        )?;
        if applied {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO _migrations (name, applied_at) VALUES (?1, ?2)",
            rusqlite::params![name, Timestamp::now().as_second()],
        )?;
        tx.commit()?;

        tracing::info!(migration = name, "applied migration");
    }

    Ok(())
}
