//! The change feed loop over a scripted feed.

mod common;

use std::time::Duration;

use tenmin_core::status::PcState;
use tenmin_events::testing::{FeedStep, ScriptedFeed};
use tenmin_worker::watcher;

use common::*;

#[tokio::test(start_paused = true)]
async fn feed_errors_and_bad_events_do_not_stop_the_loop() {
    let h = harness();
    h.store.add_remote_pc(SERVER, Some("w1"), PcState::None).await;
    h.store.add_remote_pc(SERVER, Some("w2"), PcState::Idle).await;
    h.ctx.registry.register("w2");

    let mut drifted = paid_event(&job_row(5, "w2", 0));
    drifted.after.truncate(6);

    let mut feed = ScriptedFeed::new([
        FeedStep::Error,
        FeedStep::Event(drifted),
        FeedStep::Empty,
        FeedStep::Event(claim_event(SERVER, "w1")),
    ]);

    let ctx = h.ctx.clone();
    let handle = tokio::spawn(async move {
        watcher::run(&ctx, &mut feed).await;
        feed
    });

    h.wait_pc("w1", PcState::Idle).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    h.ctx.cancel_token().cancel();
    let feed = handle.await.unwrap();

    assert!(feed.is_closed());
    assert_eq!(feed.remaining(), 0);
    assert!(h.ctx.registry.contains("w1"));
    assert_eq!(h.store.pc_state(SERVER, "w2").await, Some(PcState::Stopped));
}

#[tokio::test(start_paused = true)]
async fn cancellation_closes_an_idle_feed() {
    let h = harness();
    let mut feed = ScriptedFeed::default();

    let ctx = h.ctx.clone();
    let handle = tokio::spawn(async move {
        watcher::run(&ctx, &mut feed).await;
        feed
    });

    tokio::time::sleep(watcher::IDLE_BACKOFF * 3).await;
    h.ctx.shutdown().await;

    assert!(handle.await.unwrap().is_closed());
}
