//! End-to-end flows over a temporary state tree

use bookstate::config::ChapterDefinition;
use bookstate::models::{ChapterStatus, CompletedSection, GenerationStatus};
use bookstate::state::{InitOptions, Loaded, NewDecision, RecoveryStrategy};
use bookstate::{ChapterState, CheckpointType, StateConfig, StateContext};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

async fn initialized() -> (TempDir, StateContext) {
    let temp = TempDir::new().unwrap();
    let ctx = StateContext::new(StateConfig::rooted_at(temp.path()));
    ctx.store.initialize(&InitOptions::default()).await.unwrap();
    ctx.store.stop_autosave().await;
    (temp, ctx)
}

#[tokio::test]
async fn test_save_then_load_returns_saved_status() {
    let (_temp, ctx) = initialized().await;

    let mut state = ctx.store.require().await.unwrap();
    state.status = GenerationStatus::Paused;
    ctx.store.save(&mut state).await.unwrap();

    let loaded = ctx.store.load().await.present().unwrap();
    assert_eq!(loaded.status, GenerationStatus::Paused);
    assert_eq!(loaded.generation_id, state.generation_id);
}

#[tokio::test]
async fn test_missing_completed_chapter_is_repaired() {
    let (_temp, ctx) = initialized().await;
    let mut state = ctx.store.require().await.unwrap();
    state.mark_chapter_completed("ch1");
    ctx.store.save(&mut state).await.unwrap();

    let report = ctx.consistency().validate(false).await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.problems.len(), 1);
    assert!(report.problems[0].contains("ch1"));
    assert_eq!(report.details.missing_chapter_states, vec!["ch1".to_string()]);

    ctx.consistency().validate(true).await.unwrap();
    let second = ctx.consistency().validate(false).await.unwrap();
    assert!(second.valid, "{:?}", second.problems);
    assert!(!ctx.store.require().await.unwrap().is_chapter_completed("ch1"));
}

#[tokio::test]
async fn test_completed_chapter_is_added_to_global_state() {
    let (_temp, ctx) = initialized().await;
    let mut chapter = ChapterState::new("01-overview");
    chapter.status = ChapterStatus::Completed;
    ctx.chapters.save(&chapter).await.unwrap();

    let report = ctx.consistency().validate(true).await.unwrap();
    assert!(!report.valid);

    let state = ctx.store.require().await.unwrap();
    assert!(state
        .completed_chapters
        .contains(&"01-overview".to_string()));
    assert!(ctx.consistency().validate(false).await.unwrap().valid);
}

#[tokio::test]
async fn test_orphan_output_is_recorded_as_section() {
    let (temp, ctx) = initialized().await;
    ctx.chapters.save(&ChapterState::new("ch")).await.unwrap();
    let out_dir = temp.path().join("outputs/ch");
    fs::create_dir_all(&out_dir).unwrap();
    fs::write(out_dir.join("ch__x.md"), "# X\n\nsome words here").unwrap();

    let report = ctx.outputs().validate(true).await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.details.orphan_files.len(), 1);

    let chapter = ctx.chapters.load("ch").await.present().unwrap();
    assert_eq!(chapter.completed_sections.len(), 1);
    assert_eq!(chapter.completed_sections[0].content_file(), Some("ch__x.md"));
    assert!(ctx.outputs().validate(false).await.unwrap().valid);
}

#[tokio::test]
async fn test_coverage_follows_artifact_count() {
    let (temp, ctx) = initialized().await;
    let chapters = vec![ChapterDefinition::new("ch").with_required_sections(2)];
    let out_dir = temp.path().join("outputs/ch");
    fs::create_dir_all(&out_dir).unwrap();
    fs::write(out_dir.join("a.md"), "a").unwrap();

    let report = ctx.coverage(None).validate(&chapters).await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.details.chapters[0].have, 1);
    assert_eq!(report.details.chapters[0].required, 2);

    fs::write(out_dir.join("b.md"), "b").unwrap();
    assert!(ctx.coverage(None).validate(&chapters).await.unwrap().valid);
}

#[tokio::test]
async fn test_crash_recovery_uses_latest_checkpoint() {
    let (_temp, ctx) = initialized().await;
    let mut state = ctx.store.require().await.unwrap();
    state.status = GenerationStatus::InProgress;
    ctx.store.save(&mut state).await.unwrap();
    let checkpoint_id = ctx
        .checkpoints
        .create("before crash", CheckpointType::PhaseTransition)
        .await
        .unwrap();

    fs::write(ctx.store.layout().current_state_file(), "{\"generationId\":").unwrap();
    assert!(matches!(ctx.store.load().await, Loaded::Malformed(_)));

    let report = ctx.recovery().unwrap().recover(true).await.unwrap();
    assert_eq!(report.strategy, RecoveryStrategy::Checkpoint);
    assert_eq!(report.checkpoint_id.as_deref(), Some(checkpoint_id.as_str()));

    let restored = ctx.store.require().await.unwrap();
    assert_eq!(restored.generation_id, state.generation_id);
    assert_eq!(restored.status, GenerationStatus::InProgress);
}

#[tokio::test]
async fn test_recovery_without_anything_starts_fresh() {
    let temp = TempDir::new().unwrap();
    let ctx = StateContext::new(StateConfig::rooted_at(temp.path()));

    let report = ctx.recovery().unwrap().recover(true).await.unwrap();
    ctx.store.stop_autosave().await;

    assert_eq!(report.strategy, RecoveryStrategy::FreshInit);
    let state = ctx.store.require().await.unwrap();
    assert_eq!(state.generation_id, report.generation_id);
}

#[tokio::test]
async fn test_retention_keeps_newest() {
    let temp = TempDir::new().unwrap();
    let mut config = StateConfig::rooted_at(temp.path());
    config.checkpoints_to_keep = 3;
    let ctx = StateContext::new(config);
    ctx.store.initialize(&InitOptions::default()).await.unwrap();
    ctx.store.stop_autosave().await;

    let mut created = Vec::new();
    for i in 0..5 {
        created.push(
            ctx.checkpoints
                .create(&format!("cp {}", i), CheckpointType::Auto)
                .await
                .unwrap(),
        );
    }

    assert_eq!(ctx.checkpoints.list().await.unwrap(), created[2..].to_vec());
}

#[tokio::test]
async fn test_restore_round_trip() {
    let (_temp, ctx) = initialized().await;
    let checkpoint_id = ctx
        .checkpoints
        .create("snapshot", CheckpointType::Manual)
        .await
        .unwrap();
    let snapshot = ctx.checkpoints.get(&checkpoint_id).await.unwrap();

    let mut state = ctx.store.require().await.unwrap();
    state.status = GenerationStatus::Error;
    state.mark_chapter_completed("later");
    ctx.store.save(&mut state).await.unwrap();

    let restored = ctx.checkpoints.restore(&checkpoint_id).await.unwrap();
    assert_eq!(restored, snapshot.state_snapshot.current_generation);
    assert_eq!(ctx.store.require().await.unwrap(), restored);
}

#[tokio::test]
async fn test_decision_and_section_flow() {
    let (temp, ctx) = initialized().await;
    let ledger = ctx.ledger();

    let decision = ledger
        .add_pending_decision(
            "ch1",
            NewDecision::new(
                "SEARCH_RESULTS_SELECTION",
                json!({ "results": [{ "id": "r0" }, { "id": "r1" }] }),
            ),
        )
        .await
        .unwrap();
    assert_eq!(ledger.pending_decisions().await.unwrap().len(), 1);

    ledger
        .resolve_decision("ch1", &decision.decision_id, json!({ "selected": [1] }))
        .await
        .unwrap();
    assert!(ledger.pending_decisions().await.unwrap().is_empty());
    let selection = ledger.latest_selection("ch1").await.unwrap();
    assert_eq!(selection.selected_indices, vec![1]);
    assert_eq!(selection.selected_result_ids, vec![json!("r1")]);
    assert_eq!(selection.count, 1);

    let out_dir = temp.path().join("outputs/ch1");
    fs::create_dir_all(&out_dir).unwrap();
    fs::write(out_dir.join("intro.md"), "intro").unwrap();
    ledger
        .complete_section("ch1", CompletedSection::for_file("Intro", "intro.md"))
        .await
        .unwrap();

    let (chapter, state) = ledger.complete_chapter("ch1").await.unwrap();
    assert!(chapter.is_completed());
    assert!(state.is_chapter_completed("ch1"));

    assert!(ctx.consistency().validate(false).await.unwrap().valid);
    assert!(ctx.outputs().validate(false).await.unwrap().valid);
}
