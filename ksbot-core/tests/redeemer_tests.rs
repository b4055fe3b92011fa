// File: ksbot-core/tests/redeemer_tests.rs

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ksbot_core::test_utils::helpers::{
    codes, seed_ledger, seed_results, DriverCall, FakeDriver, RecordingNotifier, StaticPlayers,
};
use ksbot_core::{
    CodeLedger, Error, Outcome, PlayerId, Code, Redeemer, RedeemerSettings, ResultStore, RunOutcome,
    RunState, StoragePaths,
};

struct Fixture {
    _dir: TempDir,
    paths: StoragePaths,
    driver: FakeDriver,
    notifier: RecordingNotifier,
    redeemer: Redeemer,
}

fn fixture(players: &[&str]) -> Result<Fixture, Error> {
    fixture_with_timeout(players, Duration::from_secs(2))
}

fn fixture_with_timeout(players: &[&str], step_timeout: Duration) -> Result<Fixture, Error> {
    let dir = tempfile::tempdir()?;
    let paths = StoragePaths::new(dir.path());
    let driver = FakeDriver::new();
    let notifier = RecordingNotifier::default();
    let redeemer = Redeemer::new(
        paths.clone(),
        Arc::new(StaticPlayers::of(players)),
        Arc::new(driver.clone()),
        Arc::new(notifier.clone()),
    )
    .with_settings(RedeemerSettings {
        step_timeout,
        settle_delay: Duration::ZERO,
    });
    Ok(Fixture {
        _dir: dir,
        paths,
        driver,
        notifier,
        redeemer,
    })
}

fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
    list.iter().map(|(p, c)| (p.to_string(), c.to_string())).collect()
}

async fn status(paths: &StoragePaths, player: &str, code: &str) -> Result<Option<Outcome>, Error> {
    let store = ResultStore::load(&paths.results).await?;
    Ok(store.current_status(&PlayerId::from(player), &Code::from(code)))
}

#[tokio::test]
async fn test_redeems_in_player_then_ledger_order() -> Result<(), Error> {
    let fx = fixture(&["p1", "p2"])?;
    seed_ledger(&fx.paths, &["AAAA1", "BBBB2"]).await?;

    let outcome = fx.redeemer.run(&codes(&["AAAA1", "BBBB2"]), &CancellationToken::new()).await?;

    assert_eq!(
        fx.driver.submissions(),
        pairs(&[("p1", "AAAA1"), ("p1", "BBBB2"), ("p2", "AAAA1"), ("p2", "BBBB2")])
    );
    let summary = match outcome {
        RunOutcome::Completed(s) => s,
        other => panic!("expected a completed run, got {other:?}"),
    };
    assert_eq!(summary.players_processed, 2);
    assert_eq!(summary.newly_settled, codes(&["AAAA1", "BBBB2"]));
    assert_eq!(fx.notifier.batches(), vec![codes(&["AAAA1", "BBBB2"])]);

    // One engine for the whole run, closed at the end.
    let calls = fx.driver.calls();
    assert_eq!(calls.iter().filter(|c| **c == DriverCall::Launch).count(), 1);
    assert_eq!(calls.last(), Some(&DriverCall::Close));
    assert!(!fx.paths.run_lock().is_held());
    assert_eq!(fx.redeemer.state(), RunState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_second_run_is_a_no_op() -> Result<(), Error> {
    let fx = fixture(&["p1", "p2"])?;
    seed_ledger(&fx.paths, &["AAAA1"]).await?;
    let cancel = CancellationToken::new();

    fx.redeemer.run(&codes(&["AAAA1"]), &cancel).await?;
    fx.driver.clear_calls();
    let rows_before = tokio::fs::read_to_string(&fx.paths.results).await?;

    let outcome = fx.redeemer.run(&codes(&["AAAA1"]), &cancel).await?;

    // Nothing pending means the engine is never even started.
    assert!(fx.driver.calls().is_empty());
    let summary = outcome.summary().cloned().unwrap_or_default();
    assert_eq!(summary.players_skipped, 2);
    assert!(summary.attempted.is_empty());
    assert_eq!(tokio::fs::read_to_string(&fx.paths.results).await?, rows_before);
    assert_eq!(fx.notifier.batches()[1], Vec::<Code>::new());
    Ok(())
}

#[tokio::test]
async fn test_expired_code_is_pruned_for_everyone() -> Result<(), Error> {
    let fx = fixture(&["p1", "p2"])?;
    seed_ledger(&fx.paths, &["OLD01", "NEW01"]).await?;
    fx.driver.respond("p1", "OLD01", "Gift code has expired.");

    fx.redeemer.run(&codes(&["OLD01", "NEW01"]), &CancellationToken::new()).await?;

    assert_eq!(
        fx.driver.submissions(),
        pairs(&[("p1", "OLD01"), ("p1", "NEW01"), ("p2", "NEW01")])
    );
    let ledger = CodeLedger::load(&fx.paths.codes).await?;
    assert_eq!(ledger.codes(), codes(&["NEW01"]).as_slice());
    assert_eq!(status(&fx.paths, "p1", "OLD01").await?, Some(Outcome::Expired));
    assert_eq!(status(&fx.paths, "p2", "OLD01").await?, None);
    assert_eq!(fx.notifier.batches(), vec![codes(&["NEW01"])]);
    Ok(())
}

#[tokio::test]
async fn test_invalid_code_is_pruned() -> Result<(), Error> {
    let fx = fixture(&["p1"])?;
    seed_ledger(&fx.paths, &["TYPO1"]).await?;
    fx.driver.set_default_response("Gift code not found");

    fx.redeemer.run(&codes(&["TYPO1"]), &CancellationToken::new()).await?;

    assert!(CodeLedger::load(&fx.paths.codes).await?.is_empty());
    assert_eq!(status(&fx.paths, "p1", "TYPO1").await?, Some(Outcome::Invalid));
    Ok(())
}

#[tokio::test]
async fn test_already_claimed_counts_as_settled() -> Result<(), Error> {
    let fx = fixture(&["p1", "p2"])?;
    seed_ledger(&fx.paths, &["GIFT7"]).await?;
    fx.driver.respond("p2", "GIFT7", "Already claimed, unable to claim again.");

    fx.redeemer.run(&codes(&["GIFT7"]), &CancellationToken::new()).await?;

    assert_eq!(status(&fx.paths, "p2", "GIFT7").await?, Some(Outcome::AlreadyClaimed));
    assert_eq!(fx.notifier.batches(), vec![codes(&["GIFT7"])]);
    assert!(CodeLedger::load(&fx.paths.codes).await?.contains(&Code::from("GIFT7")));
    Ok(())
}

#[tokio::test]
async fn test_unknown_response_stays_pending() -> Result<(), Error> {
    let fx = fixture(&["p1", "p2"])?;
    seed_ledger(&fx.paths, &["GIFT7"]).await?;
    fx.driver.respond("p2", "GIFT7", "Server busy, try later");
    let cancel = CancellationToken::new();

    fx.redeemer.run(&codes(&["GIFT7"]), &cancel).await?;
    assert_eq!(status(&fx.paths, "p2", "GIFT7").await?, Some(Outcome::Unknown));
    assert_eq!(fx.notifier.batches(), vec![Vec::<Code>::new()]);

    // Next run retries only the player that did not settle.
    fx.driver.clear_calls();
    fx.driver.respond("p2", "GIFT7", "Redeemed");
    fx.redeemer.run(&codes(&["GIFT7"]), &cancel).await?;

    assert_eq!(fx.driver.submissions(), pairs(&[("p2", "GIFT7")]));
    assert_eq!(status(&fx.paths, "p2", "GIFT7").await?, Some(Outcome::Successful));
    assert_eq!(fx.notifier.batches()[1], codes(&["GIFT7"]));
    Ok(())
}

#[tokio::test]
async fn test_submit_failure_is_recorded_as_unknown() -> Result<(), Error> {
    let fx = fixture(&["p1"])?;
    seed_ledger(&fx.paths, &["AAAA1", "BBBB2"]).await?;
    fx.driver.fail_submit("p1", "AAAA1");

    fx.redeemer.run(&codes(&["AAAA1", "BBBB2"]), &CancellationToken::new()).await?;

    assert_eq!(status(&fx.paths, "p1", "AAAA1").await?, Some(Outcome::Unknown));
    assert_eq!(status(&fx.paths, "p1", "BBBB2").await?, Some(Outcome::Successful));
    Ok(())
}

#[tokio::test]
async fn test_stalled_submit_relaunches_engine() -> Result<(), Error> {
    let fx = fixture_with_timeout(&["p1", "p2"], Duration::from_millis(200))?;
    seed_ledger(&fx.paths, &["SLOW1", "FAST2"]).await?;
    fx.driver.stall_submit("p1", "SLOW1");

    let outcome = fx.redeemer.run(&codes(&["SLOW1", "FAST2"]), &CancellationToken::new()).await?;

    let summary = outcome.summary().cloned().unwrap_or_default();
    assert_eq!(summary.players_failed, 1);
    assert_eq!(summary.players_processed, 1);
    assert_eq!(
        fx.driver.submissions(),
        pairs(&[("p1", "SLOW1"), ("p2", "SLOW1"), ("p2", "FAST2")])
    );
    // The stalled engine is closed and a fresh one serves p2.
    assert_eq!(fx.driver.launches(), 2);
    let closes = fx.driver.calls().iter().filter(|c| **c == DriverCall::Close).count();
    assert_eq!(closes, 2);

    assert_eq!(status(&fx.paths, "p1", "SLOW1").await?, Some(Outcome::Unknown));
    assert_eq!(status(&fx.paths, "p1", "FAST2").await?, None);
    assert_eq!(status(&fx.paths, "p2", "SLOW1").await?, Some(Outcome::Successful));
    assert_eq!(status(&fx.paths, "p2", "FAST2").await?, Some(Outcome::Successful));
    assert!(!fx.paths.run_lock().is_held());
    Ok(())
}

#[tokio::test]
async fn test_results_write_failure_fails_only_that_player() -> Result<(), Error> {
    let fx = fixture(&["p1", "p2"])?;
    seed_ledger(&fx.paths, &["AAAA1", "BBBB2"]).await?;

    // A directory in place of the results log makes the append fail; it is
    // taken away again before p2 logs in.
    let results = fx.paths.results.clone();
    fx.driver.on_call(move |call| match call {
        DriverCall::Submit(p, c) if p.as_str() == "p1" && c.as_str() == "AAAA1" => {
            let _ = std::fs::remove_file(&results);
            std::fs::create_dir(&results).expect("block results log");
        }
        DriverCall::Open(p) if p.as_str() == "p2" => {
            std::fs::remove_dir(&results).expect("unblock results log");
        }
        _ => {}
    });

    let outcome = fx.redeemer.run(&codes(&["AAAA1", "BBBB2"]), &CancellationToken::new()).await?;

    let summary = outcome.summary().cloned().unwrap_or_default();
    assert_eq!(summary.players_failed, 1);
    assert_eq!(summary.players_processed, 1);
    assert!(summary.newly_settled.is_empty());
    assert_eq!(
        fx.driver.submissions(),
        pairs(&[("p1", "AAAA1"), ("p2", "AAAA1"), ("p2", "BBBB2")])
    );

    assert_eq!(status(&fx.paths, "p1", "AAAA1").await?, None);
    assert_eq!(status(&fx.paths, "p1", "BBBB2").await?, None);
    assert_eq!(status(&fx.paths, "p2", "AAAA1").await?, Some(Outcome::Successful));
    assert_eq!(status(&fx.paths, "p2", "BBBB2").await?, Some(Outcome::Successful));
    assert!(!fx.paths.run_lock().is_held());
    assert_eq!(fx.redeemer.state(), RunState::Idle);
    assert_eq!(fx.notifier.batches(), vec![Vec::<Code>::new()]);
    Ok(())
}

#[tokio::test]
async fn test_dismiss_failure_does_not_stop_player() -> Result<(), Error> {
    let fx = fixture(&["p1"])?;
    seed_ledger(&fx.paths, &["AAAA1", "BBBB2"]).await?;
    fx.driver.fail_dismiss();

    fx.redeemer.run(&codes(&["AAAA1", "BBBB2"]), &CancellationToken::new()).await?;

    assert_eq!(fx.driver.submissions().len(), 2);
    assert_eq!(status(&fx.paths, "p1", "BBBB2").await?, Some(Outcome::Successful));
    Ok(())
}

#[tokio::test]
async fn test_notification_limited_to_trigger_batch() -> Result<(), Error> {
    let fx = fixture(&["p1"])?;
    seed_ledger(&fx.paths, &["AAAA1", "BBBB2"]).await?;

    let outcome = fx.redeemer.run(&codes(&["BBBB2"]), &CancellationToken::new()).await?;

    let summary = outcome.summary().cloned().unwrap_or_default();
    assert_eq!(summary.newly_settled, codes(&["AAAA1", "BBBB2"]));
    assert_eq!(summary.notified, codes(&["BBBB2"]));
    assert_eq!(fx.notifier.batches(), vec![codes(&["BBBB2"])]);
    Ok(())
}

#[tokio::test]
async fn test_code_settled_before_run_is_not_announced() -> Result<(), Error> {
    let fx = fixture(&["p1", "p2"])?;
    seed_ledger(&fx.paths, &["AAAA1", "BBBB2"]).await?;
    seed_results(
        &fx.paths,
        &[
            "p1,AAAA1,Successful,2025-03-01 10:00:00",
            "p2,AAAA1,Already claimed,2025-03-01 10:00:05",
        ],
    )
    .await?;

    fx.redeemer.run(&codes(&["AAAA1", "BBBB2"]), &CancellationToken::new()).await?;

    assert_eq!(
        fx.driver.submissions(),
        pairs(&[("p1", "BBBB2"), ("p2", "BBBB2")])
    );
    assert_eq!(fx.notifier.batches(), vec![codes(&["BBBB2"])]);
    Ok(())
}

#[tokio::test]
async fn test_resumes_after_interrupted_run() -> Result<(), Error> {
    let fx = fixture(&["p1", "p2"])?;
    seed_ledger(&fx.paths, &["AAAA1", "BBBB2"]).await?;
    // A previous run died after recording p1/AAAA1, mid-way through the next row.
    tokio::fs::write(
        &fx.paths.results,
        "PlayerID,GiftCode,Status,Timestamp\np1,AAAA1,Successful,2025-03-01 10:00:00\np1,BBB",
    )
    .await?;

    fx.redeemer.run(&codes(&["AAAA1", "BBBB2"]), &CancellationToken::new()).await?;

    assert_eq!(
        fx.driver.submissions(),
        pairs(&[("p1", "BBBB2"), ("p2", "AAAA1"), ("p2", "BBBB2")])
    );
    let store = ResultStore::load(&fx.paths.results).await?;
    let players = vec![PlayerId::from("p1"), PlayerId::from("p2")];
    assert!(store.is_fully_settled(&Code::from("AAAA1"), &players));
    assert!(store.is_fully_settled(&Code::from("BBBB2"), &players));
    Ok(())
}

#[tokio::test]
async fn test_lock_held_means_already_running() -> Result<(), Error> {
    let fx = fixture(&["p1"])?;
    seed_ledger(&fx.paths, &["AAAA1"]).await?;
    let held = fx.paths.run_lock().try_acquire()?;
    assert!(held.is_some());

    let outcome = fx.redeemer.run(&codes(&["AAAA1"]), &CancellationToken::new()).await?;

    assert_eq!(outcome, RunOutcome::AlreadyRunning);
    assert!(fx.driver.calls().is_empty());
    assert!(fx.notifier.batches().is_empty());
    assert!(fx.paths.run_lock().is_held());
    drop(held);
    assert!(!fx.paths.run_lock().is_held());
    Ok(())
}

#[tokio::test]
async fn test_engine_unavailable_aborts_run() -> Result<(), Error> {
    let fx = fixture(&["p1"])?;
    seed_ledger(&fx.paths, &["AAAA1"]).await?;
    fx.driver.fail_launch();

    let result = fx.redeemer.run(&codes(&["AAAA1"]), &CancellationToken::new()).await;

    assert!(matches!(result, Err(Error::EngineUnavailable(_))));
    assert!(!fx.paths.run_lock().is_held());
    assert!(fx.notifier.batches().is_empty());
    assert_eq!(status(&fx.paths, "p1", "AAAA1").await?, None);
    assert_eq!(fx.redeemer.state(), RunState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_session_failure_moves_on_to_next_player() -> Result<(), Error> {
    let fx = fixture(&["p1", "p2"])?;
    seed_ledger(&fx.paths, &["AAAA1"]).await?;
    fx.driver.fail_session("p1");

    let outcome = fx.redeemer.run(&codes(&["AAAA1"]), &CancellationToken::new()).await?;

    let summary = outcome.summary().cloned().unwrap_or_default();
    assert_eq!(summary.players_failed, 1);
    assert_eq!(summary.players_processed, 1);
    assert_eq!(fx.driver.opened_sessions(), vec!["p1".to_string(), "p2".to_string()]);
    assert_eq!(fx.driver.submissions(), pairs(&[("p2", "AAAA1")]));
    assert_eq!(status(&fx.paths, "p1", "AAAA1").await?, None);
    // p1 still owes the code, so nothing is announced.
    assert_eq!(fx.notifier.batches(), vec![Vec::<Code>::new()]);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_before_first_player() -> Result<(), Error> {
    let fx = fixture(&["p1", "p2"])?;
    seed_ledger(&fx.paths, &["AAAA1"]).await?;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = fx.redeemer.run(&codes(&["AAAA1"]), &cancel).await?;

    match outcome {
        RunOutcome::Cancelled(summary) => assert!(summary.attempted.is_empty()),
        other => panic!("expected a cancelled run, got {other:?}"),
    }
    assert!(fx.driver.calls().is_empty());
    assert!(!fx.paths.run_lock().is_held());
    Ok(())
}

#[tokio::test]
async fn test_no_players_or_no_codes() -> Result<(), Error> {
    let fx = fixture(&[])?;
    seed_ledger(&fx.paths, &["AAAA1"]).await?;
    let outcome = fx.redeemer.run(&codes(&["AAAA1"]), &CancellationToken::new()).await?;
    assert_eq!(outcome.summary().map(|s| s.attempted.len()), Some(0));
    assert!(fx.driver.calls().is_empty());

    let fx = fixture(&["p1"])?;
    let outcome = fx.redeemer.run(&[], &CancellationToken::new()).await?;
    assert_eq!(outcome.summary().map(|s| s.players_processed), Some(0));
    assert!(fx.driver.calls().is_empty());
    assert_eq!(fx.notifier.batches(), vec![Vec::<Code>::new()]);
    Ok(())
}

#[tokio::test]
async fn test_malformed_result_rows_are_ignored() -> Result<(), Error> {
    let fx = fixture(&["p1"])?;
    seed_ledger(&fx.paths, &["AAAA1", "BBBB2"]).await?;
    seed_results(
        &fx.paths,
        &[
            "p1,AAAA1,Successful,2025-03-01 10:00:00",
            "this is not a row",
            "p1,BBBB2,Successful,not-a-date",
        ],
    )
    .await?;

    fx.redeemer.run(&codes(&["BBBB2"]), &CancellationToken::new()).await?;

    assert_eq!(fx.driver.submissions(), pairs(&[("p1", "BBBB2")]));
    Ok(())
}

#[tokio::test]
async fn test_state_is_published_while_running() -> Result<(), Error> {
    let fx = fixture(&["p1"])?;
    seed_ledger(&fx.paths, &["AAAA1"]).await?;
    let mut rx = fx.redeemer.subscribe_state();
    assert_eq!(*rx.borrow_and_update(), RunState::Idle);

    fx.redeemer.run(&codes(&["AAAA1"]), &CancellationToken::new()).await?;

    assert!(rx.has_changed().unwrap_or(false));
    assert_eq!(*rx.borrow_and_update(), RunState::Idle);
    assert_eq!(RunState::Running.to_string(), "Redeeming");
    Ok(())
}
