/// Full schema, applied idempotently on open.
///
/// Decimal money columns (total_cost, cost, the five prices) are TEXT holding
/// fixed-point decimal strings; summing thousands of micro-dollar amounts in
/// REAL would drift.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    path TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    title TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    pinned INTEGER NOT NULL DEFAULT 0,
    parent_session_id TEXT,
    session_type TEXT NOT NULL DEFAULT 'main',
    mtime TEXT,
    last_offset INTEGER NOT NULL DEFAULT 0,
    last_line_num INTEGER NOT NULL DEFAULT 0,
    message_count INTEGER NOT NULL DEFAULT 0,
    total_cost TEXT,
    context_usage INTEGER,
    compute_version INTEGER NOT NULL DEFAULT 0,
    jsonl_git_branch TEXT,
    git_directory TEXT,
    git_branch TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id)
);

CREATE TABLE IF NOT EXISTS session_items (
    session_id TEXT NOT NULL,
    line_num INTEGER NOT NULL,
    content TEXT NOT NULL,
    kind TEXT NOT NULL,
    display_level TEXT NOT NULL,
    group_head INTEGER,
    group_tail INTEGER,
    message_id TEXT,
    cost TEXT,
    context_usage INTEGER,
    git_directory TEXT,
    git_branch TEXT,
    timestamp TEXT,
    PRIMARY KEY (session_id, line_num),
    FOREIGN KEY (session_id) REFERENCES sessions(id)
);

CREATE TABLE IF NOT EXISTS tool_result_links (
    session_id TEXT NOT NULL,
    tool_use_line_num INTEGER NOT NULL,
    tool_result_line_num INTEGER NOT NULL,
    tool_use_id TEXT NOT NULL,
    PRIMARY KEY (session_id, tool_use_id, tool_result_line_num)
);

CREATE TABLE IF NOT EXISTS agent_links (
    session_id TEXT NOT NULL,
    tool_use_line_num INTEGER NOT NULL,
    tool_use_id TEXT NOT NULL,
    prompt TEXT,
    agent_id TEXT,
    PRIMARY KEY (session_id, tool_use_id)
);

CREATE TABLE IF NOT EXISTS model_prices (
    model_id TEXT NOT NULL,
    effective_date TEXT NOT NULL,
    input TEXT NOT NULL,
    output TEXT NOT NULL,
    cache_read TEXT NOT NULL,
    cache_write_5m TEXT NOT NULL,
    cache_write_1h TEXT NOT NULL,
    PRIMARY KEY (model_id, effective_date)
);

CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id);
CREATE INDEX IF NOT EXISTS idx_items_message ON session_items(session_id, message_id);
CREATE INDEX IF NOT EXISTS idx_tool_links_use ON tool_result_links(session_id, tool_use_line_num, tool_use_id);
CREATE INDEX IF NOT EXISTS idx_agent_links_agent ON agent_links(agent_id);
CREATE INDEX IF NOT EXISTS idx_prices_lookup ON model_prices(model_id, effective_date DESC);
"#;
