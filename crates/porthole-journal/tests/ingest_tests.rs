use porthole_index::{queries, Database, ModelPriceRecord};
use porthole_journal::{recompute_session, sync_session, SyncJob};
use porthole_testing::{
    assistant_text_with_tool_use_line, assistant_usage_line, system_init_line, task_line,
    tool_result_line, tool_use_line, user_text_line, JournalWorld,
};
use porthole_types::{DisplayLevel, ItemKind};
use serde_json::json;

fn job(world: &JournalWorld, project: &str, session: &str) -> SyncJob {
    SyncJob {
        project_id: project.to_string(),
        session_id: session.to_string(),
        path: world.journal_path(project, session),
    }
}

fn seed_opus_prices(db: &Database) {
    queries::price::insert(
        db.conn(),
        &ModelPriceRecord {
            model_id: "claude-opus-4-5".into(),
            effective_date: "2025-11-01".into(),
            input: "5".parse().unwrap(),
            output: "25".parse().unwrap(),
            cache_read: "0.5".parse().unwrap(),
            cache_write_5m: "6.25".parse().unwrap(),
            cache_write_1h: "10".parse().unwrap(),
        },
    )
    .unwrap();
}

#[test]
fn first_sync_creates_session_and_learns_project_path() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();

    world
        .append(
            "p1",
            "s1",
            &[
                system_init_line("s1"),
                json!({
                    "type": "user",
                    "message": {"role": "user", "content": "hello"},
                    "timestamp": "2026-01-22T10:00:00Z",
                    "cwd": "/home/u/repo",
                })
                .to_string(),
            ],
        )
        .unwrap();

    let outcome = sync_session(&mut db, &job(&world, "p1", "s1"))
        .unwrap()
        .unwrap();

    assert!(outcome.session_created);
    assert_eq!(outcome.items.len(), 2);
    assert_eq!(outcome.items[0].kind, ItemKind::SystemInit);
    assert_eq!(outcome.items[1].kind, ItemKind::UserMessage);
    assert_eq!(outcome.session.message_count, 1);
    assert_eq!(outcome.session.last_line_num, 2);

    let project = queries::project::get(db.conn(), "p1").unwrap().unwrap();
    assert_eq!(project.path.as_deref(), Some("/home/u/repo"));
}

#[test]
fn cost_and_context_usage_with_message_id_dedup() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();
    seed_opus_prices(&db);

    world
        .append(
            "p1",
            "s1",
            &[assistant_usage_line(
                "msg_A",
                "claude-opus-4-5-20251101",
                2,
                150,
                25378,
                679,
                "2026-01-22T10:53:42.927Z",
            )],
        )
        .unwrap();
    world.backdate("p1", "s1", 100).unwrap();

    let first = sync_session(&mut db, &job(&world, "p1", "s1"))
        .unwrap()
        .unwrap();
    assert_eq!(first.items[0].context_usage, Some(26209));
    assert_eq!(first.items[0].cost, Some("0.020693".parse().unwrap()));
    assert_eq!(first.session.context_usage, Some(26209));
    let total_after_first = first.session.total_cost.unwrap();

    // A second line with the same message id carries usage but no cost.
    world
        .append(
            "p1",
            "s1",
            &[assistant_usage_line(
                "msg_A",
                "claude-opus-4-5-20251101",
                4,
                60,
                26100,
                0,
                "2026-01-22T10:53:50.000Z",
            )],
        )
        .unwrap();
    world.backdate("p1", "s1", 50).unwrap();

    let second = sync_session(&mut db, &job(&world, "p1", "s1"))
        .unwrap()
        .unwrap();
    assert_eq!(second.items[0].cost, None);
    assert_eq!(second.items[0].context_usage, Some(26164));
    assert_eq!(second.session.context_usage, Some(26164));
    assert_eq!(second.session.total_cost.unwrap(), total_after_first);
}

#[test]
fn suffix_group_amendment_reaches_the_broadcast_payload() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();

    // Line 1: assistant text trailing into a tool_use (suffix shape).
    world
        .append(
            "p1",
            "s1",
            &[assistant_text_with_tool_use_line(
                "msg_1",
                "let me look",
                "toolu_1",
                "Bash",
                json!({"command": "ls"}),
            )],
        )
        .unwrap();
    world.backdate("p1", "s1", 100).unwrap();

    let first = sync_session(&mut db, &job(&world, "p1", "s1"))
        .unwrap()
        .unwrap();
    assert_eq!(first.items[0].group_head, Some(1));
    assert_eq!(first.items[0].group_tail, None);
    assert!(first.amended.is_empty());

    // Line 2: the tool result joins; line 1's tail is amended.
    world
        .append("p1", "s1", &[tool_result_line("toolu_1", "src lib tests")])
        .unwrap();
    world.backdate("p1", "s1", 50).unwrap();

    let second = sync_session(&mut db, &job(&world, "p1", "s1"))
        .unwrap()
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].group_head, Some(1));
    assert_eq!(second.items[0].group_tail, Some(2));
    assert_eq!(second.amended.len(), 1);
    assert_eq!(second.amended[0].line_num, 1);
    assert_eq!(second.amended[0].group_tail, Some(2));

    // Links landed too.
    let links = queries::link::tool_result_links(db.conn(), "s1").unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].tool_use_line_num, 1);
    assert_eq!(links[0].tool_result_line_num, 2);
}

#[test]
fn malformed_lines_become_debug_items_without_aborting() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();

    world
        .append(
            "p1",
            "s1",
            &[
                "{this is not json".to_string(),
                user_text_line("still here", "2026-01-22T10:00:00Z"),
            ],
        )
        .unwrap();

    let outcome = sync_session(&mut db, &job(&world, "p1", "s1"))
        .unwrap()
        .unwrap();

    assert_eq!(outcome.items.len(), 2);
    assert_eq!(outcome.items[0].kind, ItemKind::Unknown);
    assert_eq!(outcome.items[0].display_level, DisplayLevel::DebugOnly);
    assert_eq!(outcome.items[1].kind, ItemKind::UserMessage);
}

#[test]
fn cursor_is_monotone_across_syncs() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();

    let mut offsets = Vec::new();
    let mut line_nums = Vec::new();

    for (i, backdate) in [(0u64, 300u64), (1, 200), (2, 100)] {
        world
            .append(
                "p1",
                "s1",
                &[user_text_line(&format!("message {i}"), "2026-01-22T10:00:00Z")],
            )
            .unwrap();
        world.backdate("p1", "s1", backdate).unwrap();

        sync_session(&mut db, &job(&world, "p1", "s1")).unwrap();
        let session = queries::session::get(db.conn(), "s1").unwrap().unwrap();
        offsets.push(session.last_offset);
        line_nums.push(session.last_line_num);
    }

    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(line_nums, vec![1, 2, 3]);
}

#[test]
fn unchanged_mtime_short_circuits() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();

    world
        .append("p1", "s1", &[user_text_line("hi", "2026-01-22T10:00:00Z")])
        .unwrap();

    assert!(sync_session(&mut db, &job(&world, "p1", "s1"))
        .unwrap()
        .is_some());
    // Nothing changed on disk: same mtime, no work.
    assert!(sync_session(&mut db, &job(&world, "p1", "s1"))
        .unwrap()
        .is_none());
}

#[test]
fn batch_recompute_matches_live_ingestion() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();
    seed_opus_prices(&db);

    let lines = vec![
        system_init_line("s1"),
        user_text_line("please inspect", "2026-01-22T10:00:00Z"),
        assistant_text_with_tool_use_line(
            "msg_1",
            "inspecting",
            "toolu_1",
            "Bash",
            json!({"command": "ls"}),
        ),
        tool_result_line("toolu_1", "ok"),
        tool_use_line("msg_2", "toolu_2", "Grep", json!({"pattern": "x", "path": "/tmp"})),
        tool_result_line("toolu_2", "no matches"),
        assistant_usage_line(
            "msg_3",
            "claude-opus-4-5-20251101",
            10,
            200,
            1000,
            50,
            "2026-01-22T10:05:00Z",
        ),
        "not even json".to_string(),
        user_text_line("thanks", "2026-01-22T10:06:00Z"),
    ];

    // Live: one line per sync pass.
    for (i, line) in lines.iter().enumerate() {
        world.append("p1", "s1", &[line.clone()]).unwrap();
        world
            .backdate("p1", "s1", (lines.len() - i) as u64 * 10)
            .unwrap();
        sync_session(&mut db, &job(&world, "p1", "s1")).unwrap();
    }

    let live_items = queries::item::list(db.conn(), "s1", None).unwrap();
    let live_session = queries::session::get(db.conn(), "s1").unwrap().unwrap();
    let live_links = queries::link::tool_result_links(db.conn(), "s1").unwrap();

    // Batch: recompute the same session from a clean slate.
    recompute_session(&mut db, "s1").unwrap().unwrap();

    let batch_items = queries::item::list(db.conn(), "s1", None).unwrap();
    let batch_session = queries::session::get(db.conn(), "s1").unwrap().unwrap();
    let batch_links = queries::link::tool_result_links(db.conn(), "s1").unwrap();

    assert_eq!(live_items.len(), batch_items.len());
    for (live, batch) in live_items.iter().zip(batch_items.iter()) {
        assert_eq!(live.kind, batch.kind, "line {}", live.line_num);
        assert_eq!(live.display_level, batch.display_level, "line {}", live.line_num);
        assert_eq!(live.group_head, batch.group_head, "line {}", live.line_num);
        assert_eq!(live.group_tail, batch.group_tail, "line {}", live.line_num);
        assert_eq!(live.message_id, batch.message_id, "line {}", live.line_num);
        assert_eq!(live.cost, batch.cost, "line {}", live.line_num);
        assert_eq!(live.context_usage, batch.context_usage, "line {}", live.line_num);
    }

    assert_eq!(live_session.message_count, batch_session.message_count);
    assert_eq!(live_session.total_cost, batch_session.total_cost);
    assert_eq!(live_session.context_usage, batch_session.context_usage);
    assert_eq!(live_links, batch_links);
}

#[test]
fn group_tail_contiguity_holds_after_interleaved_debug_lines() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();

    world
        .append(
            "p1",
            "s1",
            &[
                tool_use_line("msg_1", "toolu_1", "Bash", json!({"command": "ls"})),
                system_init_line("s1"),
                tool_result_line("toolu_1", "ok"),
                tool_use_line("msg_2", "toolu_2", "Bash", json!({"command": "pwd"})),
            ],
        )
        .unwrap();

    sync_session(&mut db, &job(&world, "p1", "s1")).unwrap();

    let items = queries::item::list(db.conn(), "s1", None).unwrap();
    // Every non-debug line between the head and the tail shares the head.
    for item in &items {
        if item.display_level == DisplayLevel::DebugOnly {
            assert_eq!(item.group_head, None);
            continue;
        }
        assert_eq!(item.group_head, Some(1));
        assert_eq!(item.group_tail, Some(4));
    }
}

#[test]
fn contiguity_holds_across_varied_group_shapes() {
    // A scripted gauntlet of group shapes: plain runs, suffix starters,
    // prefix enders, debug interruptions, back-to-back groups. After ingest,
    // every span between a head and its tail must agree on the head.
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();

    world
        .append(
            "p1",
            "s1",
            &[
                user_text_line("start", "2026-01-22T10:00:00Z"),
                assistant_text_with_tool_use_line(
                    "msg_1",
                    "looking",
                    "toolu_a",
                    "Bash",
                    json!({"command": "ls"}),
                ),
                tool_result_line("toolu_a", "ok"),
                system_init_line("s1"),
                tool_use_line("msg_2", "toolu_b", "Grep", json!({"pattern": "x", "path": "/t"})),
                tool_result_line("toolu_b", "none"),
                json!({
                    "type": "user",
                    "message": {"role": "user", "content": [
                        {"type": "tool_result", "tool_use_id": "toolu_b", "content": "extra"},
                        {"type": "text", "text": "interesting"},
                    ]},
                })
                .to_string(),
                tool_use_line("msg_3", "toolu_c", "Bash", json!({"command": "pwd"})),
                user_text_line("done", "2026-01-22T10:10:00Z"),
            ],
        )
        .unwrap();

    sync_session(&mut db, &job(&world, "p1", "s1")).unwrap();

    let items = queries::item::list(db.conn(), "s1", None).unwrap();
    for item in &items {
        let Some(head) = item.group_head else { continue };
        let Some(tail) = item.group_tail else { continue };
        for other in &items {
            if other.line_num < head || other.line_num > tail {
                continue;
            }
            if other.display_level == DisplayLevel::DebugOnly {
                assert_eq!(other.group_head, None, "line {}", other.line_num);
            } else {
                assert_eq!(other.group_head, Some(head), "line {}", other.line_num);
            }
        }
    }

    // One group spans lines 2-7: the suffix starter opens it, the debug line
    // in the middle does not close it, and the prefix ender at line 7 seals
    // it. Line 8's tool_use then starts a fresh group of its own.
    let heads: Vec<Option<i64>> = items.iter().map(|i| i.group_head).collect();
    assert_eq!(
        heads,
        vec![
            None,
            Some(2),
            Some(2),
            None,
            Some(2),
            Some(2),
            Some(2),
            Some(8),
            None,
        ]
    );
    let tails: Vec<Option<i64>> = items.iter().map(|i| i.group_tail).collect();
    assert_eq!(
        tails,
        vec![
            None,
            Some(7),
            Some(7),
            None,
            Some(7),
            Some(7),
            Some(7),
            Some(8),
            None,
        ]
    );
}

#[test]
fn worktree_git_directory_survives_deletion_and_recompute() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();

    // Build a real worktree layout, referenced by a Read tool_use.
    let tmp = tempfile::TempDir::new().unwrap();
    let worktree = tmp.path().join("repo-wt");
    let gitdir = tmp.path().join("repo/.git/worktrees/wt");
    std::fs::create_dir_all(&worktree).unwrap();
    std::fs::create_dir_all(&gitdir).unwrap();
    std::fs::write(gitdir.join("HEAD"), "ref: refs/heads/feature/x\n").unwrap();
    std::fs::write(
        worktree.join(".git"),
        format!("gitdir: {}\n", gitdir.display()),
    )
    .unwrap();

    let file_in_worktree = worktree.join("x.py");
    world
        .append(
            "p1",
            "s1",
            &[tool_use_line(
                "msg_1",
                "toolu_1",
                "Read",
                json!({"file_path": file_in_worktree.to_str().unwrap()}),
            )],
        )
        .unwrap();

    sync_session(&mut db, &job(&world, "p1", "s1")).unwrap();

    let item = queries::item::get(db.conn(), "s1", 1).unwrap().unwrap();
    assert_eq!(item.git_directory.as_deref(), worktree.to_str());
    assert_eq!(item.git_branch.as_deref(), Some("feature/x"));

    // Delete the worktree, then force a full recompute.
    std::fs::remove_dir_all(&worktree).unwrap();
    recompute_session(&mut db, "s1").unwrap().unwrap();

    let preserved = queries::item::get(db.conn(), "s1", 1).unwrap().unwrap();
    assert_eq!(preserved.git_directory.as_deref(), worktree.to_str());
    assert_eq!(preserved.git_branch.as_deref(), Some("feature/x"));

    let session = queries::session::get(db.conn(), "s1").unwrap().unwrap();
    assert_eq!(session.git_directory.as_deref(), worktree.to_str());
    assert_eq!(session.git_branch.as_deref(), Some("feature/x"));
}

#[test]
fn sidechain_session_links_to_its_task_by_agent_id() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();

    // Parent session spawns two parallel Tasks on one line and later sees
    // the agent id for the first one.
    world
        .append(
            "p1",
            "parent",
            &[
                task_line("msg_1", "toolu_t1", "explore the repo"),
                json!({
                    "type": "user",
                    "message": {"role": "user", "content": [
                        {"type": "tool_result", "tool_use_id": "toolu_t1",
                         "content": "done", "agentId": "ag-1"},
                    ]},
                })
                .to_string(),
            ],
        )
        .unwrap();
    sync_session(&mut db, &job(&world, "p1", "parent")).unwrap();

    // The subagent's own journal: sidechain records carrying the agent id.
    world
        .append(
            "p1",
            "sub",
            &[json!({
                "type": "user",
                "isSidechain": true,
                "agentId": "ag-1",
                "message": {"role": "user", "content": "explore the repo"},
                "timestamp": "2026-01-22T10:00:00Z",
            })
            .to_string()],
        )
        .unwrap();
    sync_session(&mut db, &job(&world, "p1", "sub")).unwrap();

    let sub = queries::session::get(db.conn(), "sub").unwrap().unwrap();
    assert_eq!(sub.session_type, "subagent");
    assert_eq!(sub.parent_session_id.as_deref(), Some("parent"));

    let link = queries::link::find_by_agent_id(db.conn(), "ag-1")
        .unwrap()
        .unwrap();
    assert_eq!(link.session_id, "parent");
    assert_eq!(link.tool_use_id, "toolu_t1");
}

#[test]
fn sidechain_without_agent_id_matches_by_prompt() {
    let world = JournalWorld::new().unwrap();
    let mut db = Database::open_in_memory().unwrap();

    world
        .append(
            "p1",
            "parent",
            &[task_line("msg_1", "toolu_t1", "run the benchmark suite")],
        )
        .unwrap();
    sync_session(&mut db, &job(&world, "p1", "parent")).unwrap();

    world
        .append(
            "p1",
            "sub",
            &[json!({
                "type": "user",
                "isSidechain": true,
                "message": {"role": "user", "content": "run the benchmark suite"},
                "timestamp": "2026-01-22T10:00:00Z",
            })
            .to_string()],
        )
        .unwrap();
    sync_session(&mut db, &job(&world, "p1", "sub")).unwrap();

    let sub = queries::session::get(db.conn(), "sub").unwrap().unwrap();
    assert_eq!(sub.parent_session_id.as_deref(), Some("parent"));

    let links = queries::link::agent_links(db.conn(), "parent").unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].agent_id.as_deref(), Some("sub"));
}
