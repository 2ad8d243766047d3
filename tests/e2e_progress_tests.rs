//! End-to-end tests for progress reconciliation through the facade.

mod common;

use common::{download, progress, wait_until, TestApp};
use mediastash::records::{DownloadStatus, ProgressStatus};
use mediastash::LocalStore;

#[tokio::test]
async fn test_out_of_order_progress_is_lifted_to_running_max() {
    let app = TestApp::new();
    app.facade
        .add_download(download("1", 100, DownloadStatus::Downloading))
        .await
        .unwrap();

    let mut exposed = Vec::new();
    for value in [10.0, 30.0, 20.0] {
        exposed.push(
            app.facade
                .apply_progress(&progress("1", value, ProgressStatus::Downloading))
                .await
                .progress,
        );
    }
    assert_eq!(exposed, vec![10.0, 30.0, 30.0]);
}

#[tokio::test]
async fn test_terminal_failure_overrides_with_its_own_value() {
    let app = TestApp::new();
    app.facade
        .add_download(download("1", 100, DownloadStatus::Downloading))
        .await
        .unwrap();

    app.facade
        .apply_progress(&progress("1", 80.0, ProgressStatus::Downloading))
        .await;
    let exposed = app
        .facade
        .apply_progress(&progress("1", 0.0, ProgressStatus::Failed))
        .await;

    assert_eq!(exposed.progress, 0.0);
    assert_eq!(exposed.status, ProgressStatus::Failed);
}

#[tokio::test]
async fn test_out_of_range_and_non_finite_values_are_clamped() {
    let app = TestApp::new();
    app.facade
        .add_download(download("1", 100, DownloadStatus::Downloading))
        .await
        .unwrap();

    let exposed = app
        .facade
        .apply_progress(&progress("1", 130.0, ProgressStatus::Downloading))
        .await;
    assert_eq!(exposed.progress, 100.0);

    let exposed = app
        .facade
        .apply_progress(&progress("2", f64::NAN, ProgressStatus::Downloading))
        .await;
    assert_eq!(exposed.progress, 0.0);

    let exposed = app
        .facade
        .apply_progress(&progress("3", -12.0, ProgressStatus::Downloading))
        .await;
    assert_eq!(exposed.progress, 0.0);
}

#[tokio::test]
async fn test_terminal_event_persists_status_and_refreshes_list() {
    let app = TestApp::new();
    app.facade.load_initial_state().await.unwrap();
    app.facade
        .add_download(download("1", 100, DownloadStatus::Downloading))
        .await
        .unwrap();

    app.facade
        .apply_progress(&progress("1", 50.0, ProgressStatus::Downloading))
        .await;
    app.facade
        .apply_progress(&progress("1", 100.0, ProgressStatus::Completed))
        .await;

    // Status persisted in the authoritative store
    assert_eq!(
        app.local.get_download("1").unwrap().unwrap().status,
        DownloadStatus::Completed
    );

    // Deferred re-fetch brings the state in line with the store
    let facade = app.facade.clone();
    wait_until(move || {
        let facade = facade.clone();
        futures::executor::block_on(async move {
            facade.downloads().await[0].status == DownloadStatus::Completed
        })
    })
    .await;

    // Live progress entry is gone once the transfer is terminal
    assert!(app.facade.active_progress().await.is_empty());
}

#[tokio::test]
async fn test_ids_from_different_engines_stay_independent() {
    let app = TestApp::new();
    app.facade
        .add_download(download("1", 100, DownloadStatus::Downloading))
        .await
        .unwrap();
    app.facade
        .add_download(download("2", 200, DownloadStatus::Downloading))
        .await
        .unwrap();

    app.facade
        .apply_progress(&progress("1", 90.0, ProgressStatus::Downloading))
        .await;
    let exposed = app
        .facade
        .apply_progress(&progress("2", 15.0, ProgressStatus::Downloading))
        .await;

    assert_eq!(exposed.progress, 15.0);
    let live = app.facade.active_progress().await;
    assert_eq!(live.get("1").unwrap().progress, 90.0);
    assert_eq!(live.get("2").unwrap().progress, 15.0);
}

#[tokio::test]
async fn test_completion_after_redownload_starts_fresh() {
    let app = TestApp::new();
    app.facade
        .add_download(download("1", 100, DownloadStatus::Downloading))
        .await
        .unwrap();

    app.facade
        .apply_progress(&progress("1", 70.0, ProgressStatus::Downloading))
        .await;
    app.facade
        .apply_progress(&progress("1", 100.0, ProgressStatus::Completed))
        .await;

    // Re-download of the same id is not pinned to the old maximum
    let exposed = app
        .facade
        .apply_progress(&progress("1", 5.0, ProgressStatus::Starting))
        .await;
    assert_eq!(exposed.progress, 5.0);
}
