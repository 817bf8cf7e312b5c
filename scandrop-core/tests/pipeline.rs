//! End-to-end runs of the worker pool against scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use scandrop_core::intake::{SubmitOutcome, WorkerPool};

mod support;

use support::fakes::{DimensionIdentifier, Gate, GatedRenderer, ScriptedRenderer};
use support::{Harness, wait_for};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn code_on_second_page_after_quarter_turn_is_filed_under_the_code() {
    let harness = Harness::new();
    // Page 2 is 60x80; rotated 90° it becomes 80x60, the only size with a code.
    let renderer = ScriptedRenderer::new().document("scan1", &[(100, 50), (60, 80)]);
    let identifier = DimensionIdentifier::new().code((80, 60), "ABC123");
    let pool = WorkerPool::start(
        harness.context(Arc::new(renderer), Arc::new(identifier)),
        harness.config.pool,
    );

    let source = harness.drop_file("scan1.pdf");
    assert_eq!(pool.dispatcher().submit(source), SubmitOutcome::Accepted);

    wait_for("scan1 to finish", || !harness.finished().is_empty()).await;
    let report = pool.shutdown().await;

    assert!(report.is_clean());
    assert_eq!(harness.finished(), vec!["ABC123.pdf"]);
    assert!(harness.incoming().is_empty());
    assert!(harness.processing().is_empty());
    assert!(harness.failed().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn document_without_code_is_failed_as_no_barcode() {
    let harness = Harness::new();
    let renderer = ScriptedRenderer::new().document("scan2", &[(30, 40), (40, 40)]);
    let pool = WorkerPool::start(
        harness.context(Arc::new(renderer), Arc::new(DimensionIdentifier::new())),
        harness.config.pool,
    );

    let source = harness.drop_file("scan2.pdf");
    assert_eq!(pool.dispatcher().submit(source), SubmitOutcome::Accepted);

    wait_for("scan2 to fail", || !harness.failed().is_empty()).await;
    pool.shutdown().await;

    assert_eq!(harness.failed(), vec!["scan2_no_barcode.pdf"]);
    assert!(harness.finished().is_empty());
    assert!(harness.processing().is_empty());
    assert!(harness.incoming().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn code_of_only_unsafe_characters_is_an_empty_barcode() {
    let harness = Harness::new();
    let renderer = ScriptedRenderer::new().document("scan3", &[(20, 20)]);
    let identifier = DimensionIdentifier::new().code((20, 20), "/:*?");
    let pool = WorkerPool::start(
        harness.context(Arc::new(renderer), Arc::new(identifier)),
        harness.config.pool,
    );

    let source = harness.drop_file("scan3.pdf");
    pool.dispatcher().submit(source);

    wait_for("scan3 to fail", || !harness.failed().is_empty()).await;
    pool.shutdown().await;

    assert_eq!(harness.failed(), vec!["scan3_empty_barcode.pdf"]);
    assert!(harness.finished().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn equal_codes_get_suffixed_names() {
    let harness = Harness::new();
    let renderer = ScriptedRenderer::new()
        .document("first", &[(10, 10)])
        .document("second", &[(10, 10)])
        .document("third", &[(10, 10)]);
    let identifier = DimensionIdentifier::new().code((10, 10), "DUP");
    let pool = WorkerPool::start(
        harness.context(Arc::new(renderer), Arc::new(identifier)),
        harness.config.pool,
    );

    let dispatcher = pool.dispatcher();
    for name in ["first.pdf", "second.pdf", "third.pdf"] {
        assert_eq!(
            dispatcher.submit(harness.drop_file(name)),
            SubmitOutcome::Accepted
        );
    }

    wait_for("all three to finish", || harness.finished().len() == 3).await;
    pool.shutdown().await;

    assert_eq!(harness.finished(), vec!["DUP.pdf", "DUP_1.pdf", "DUP_2.pdf"]);
    assert!(harness.failed().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_submissions_file_the_document_once() {
    let harness = Harness::new();
    let renderer = ScriptedRenderer::new().document("twice", &[(12, 34)]);
    let identifier = DimensionIdentifier::new().code((12, 34), "ONCE");
    let pool = WorkerPool::start(
        harness.context(Arc::new(renderer), Arc::new(identifier)),
        harness.config.pool,
    );

    let source = harness.drop_file("twice.pdf");
    let dispatcher = pool.dispatcher();
    dispatcher.submit(source.clone());
    dispatcher.submit(source);

    wait_for("the document to finish", || !harness.finished().is_empty()).await;
    let report = pool.shutdown().await;

    assert!(report.is_clean());
    assert_eq!(harness.finished(), vec!["ONCE.pdf"]);
    assert!(harness.failed().is_empty());
    assert!(harness.processing().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn saturated_queue_routes_the_excess_to_failed() {
    let harness = Harness::with_config(|config| {
        config.pool.workers = 2;
        config.pool.queue_capacity = 2;
    });
    let gate = Gate::new();
    let renderer = ScriptedRenderer::new()
        .document("a", &[(1, 2)])
        .document("b", &[(1, 3)])
        .document("c", &[(1, 4)])
        .document("d", &[(1, 5)]);
    let identifier = DimensionIdentifier::new()
        .code((1, 2), "A")
        .code((1, 3), "B")
        .code((1, 4), "C")
        .code((1, 5), "D");
    let pool = WorkerPool::start(
        harness.context(
            Arc::new(GatedRenderer::new(renderer, Arc::clone(&gate))),
            Arc::new(identifier),
        ),
        harness.config.pool,
    );
    let dispatcher = pool.dispatcher();

    for name in ["a.pdf", "b.pdf"] {
        assert_eq!(
            dispatcher.submit(harness.drop_file(name)),
            SubmitOutcome::Accepted
        );
    }
    wait_for("both workers to block", || gate.arrivals() == 2).await;

    for name in ["c.pdf", "d.pdf"] {
        assert_eq!(
            dispatcher.submit(harness.drop_file(name)),
            SubmitOutcome::Accepted
        );
    }
    for name in ["e.pdf", "f.pdf", "g.pdf"] {
        let outcome = dispatcher.submit(harness.drop_file(name));
        assert!(
            matches!(outcome, SubmitOutcome::QueueFull(Some(_))),
            "{name}: {outcome:?}"
        );
    }

    assert_eq!(
        harness.failed(),
        vec!["e_queue_full.pdf", "f_queue_full.pdf", "g_queue_full.pdf"]
    );

    gate.open();
    wait_for("queued work to finish", || harness.finished().len() == 4).await;
    let report = pool.shutdown().await;

    assert!(report.is_clean());
    assert_eq!(harness.finished(), vec!["A.pdf", "B.pdf", "C.pdf", "D.pdf"]);
    assert_eq!(harness.failed().len(), 3);
    assert!(harness.incoming().is_empty());
    assert!(harness.processing().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submissions_after_shutdown_leave_the_file_in_place() {
    let harness = Harness::new();
    let pool = WorkerPool::start(
        harness.context(
            Arc::new(ScriptedRenderer::new()),
            Arc::new(DimensionIdentifier::new()),
        ),
        harness.config.pool,
    );
    let dispatcher = pool.dispatcher();
    pool.shutdown().await;

    let late = harness.drop_file("late.pdf");
    assert_eq!(dispatcher.submit(late), SubmitOutcome::Closed);
    assert_eq!(harness.incoming(), vec!["late.pdf"]);
    assert!(harness.failed().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_aborts_work_that_outlives_the_grace_period() {
    let harness = Harness::with_config(|config| {
        config.pool.workers = 1;
        config.pool.shutdown_grace_ms = 200;
    });
    let gate = Gate::new();
    let pool = WorkerPool::start(
        harness.context(
            Arc::new(GatedRenderer::new(ScriptedRenderer::new(), Arc::clone(&gate))),
            Arc::new(DimensionIdentifier::new()),
        ),
        harness.config.pool,
    );

    pool.dispatcher().submit(harness.drop_file("stuck.pdf"));
    wait_for("the worker to block", || gate.arrivals() == 1).await;

    let started = tokio::time::Instant::now();
    let report = pool.shutdown().await;
    // Release the blocking render so the runtime can shut down.
    gate.open();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.aborted, 1);
    assert!(!report.is_clean());
    // Interrupted mid-flight: the claim stands, nothing was finished or failed.
    assert_eq!(harness.processing(), vec!["stuck.pdf"]);
    assert!(harness.finished().is_empty());
    assert!(harness.failed().is_empty());
}
