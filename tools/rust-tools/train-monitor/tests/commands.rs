use std::sync::Arc;

use bioimage_training::testing::{BackendCall, MockBackend};
use bioimage_training::{
    AppContext, ConnectionInfo, ExportResult, MonitorConfig, StartResponse, StatusPayload,
    StatusType, TrainingContext,
};
use train_monitor::commands::{
    Command, CommandContinue, CommandExport, CommandStart, CommandStop, CommandWatch,
    OutputFormat, TrainingArgs,
};

fn context(backend: &Arc<MockBackend>) -> AppContext {
    AppContext::new(
        ConnectionInfo::default(),
        backend.clone(),
        TrainingContext {
            config: MonitorConfig {
                backoff_jitter: 0.0,
                ..Default::default()
            },
            ..Default::default()
        },
    )
}

fn training_args(dataset: Option<&str>) -> TrainingArgs {
    TrainingArgs {
        dataset: dataset.map(str::to_string),
        model: "cyto3".into(),
        train_images: "images/*.tif".into(),
        train_annotations: "annotations/*_mask.tif".into(),
        n_epochs: 4,
        learning_rate: 1e-6,
        weight_decay: 1e-4,
        validation_interval: Some(2),
        test_images: None,
        test_annotations: None,
    }
}

fn started(id: &str) -> StartResponse {
    StartResponse {
        session_id: id.into(),
        dataset_artifact_id: None,
        status_type: Some(StatusType::Preparing),
        message: None,
        train_losses: None,
        test_losses: None,
        current_epoch: None,
        total_epochs: Some(4),
        n_train: None,
        n_test: None,
    }
}

#[tokio::test(start_paused = true)]
async fn start_follows_until_completion() {
    let backend = Arc::new(MockBackend::new());
    backend.push_start(started("s1"));
    backend.push_status(StatusPayload {
        current_epoch: Some(1),
        train_losses: Some(vec![0.5]),
        ..StatusPayload::with_status(StatusType::Running)
    });
    backend.push_status(StatusPayload::with_status(StatusType::Completed));

    CommandStart {
        training: training_args(Some("ws/dataset")),
        detach: false,
        format: OutputFormat::Json,
    }
    .execute(context(&backend))
    .await
    .unwrap();
    assert_eq!(backend.status_calls(), 2);
    assert_eq!(backend.start_calls()[0].artifact_id, "ws/dataset");
}

#[tokio::test(start_paused = true)]
async fn start_without_dataset_is_rejected_locally() {
    let backend = Arc::new(MockBackend::new());
    let err = CommandStart {
        training: training_args(None),
        detach: true,
        format: OutputFormat::Text,
    }
    .execute(context(&backend))
    .await
    .unwrap_err();
    assert!(err.to_string().contains("dataset artifact id is empty"));
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn watching_a_failed_session_exits_with_its_reason() {
    let backend = Arc::new(MockBackend::new());
    backend.push_status(StatusPayload {
        message: Some("CUDA out of memory".into()),
        ..StatusPayload::with_status(StatusType::Failed)
    });

    let err = CommandWatch {
        session: "https://bioimage.io/#/train/s1".into(),
        format: OutputFormat::Text,
    }
    .execute(context(&backend))
    .await
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Training session s1 failed: CUDA out of memory"
    );
}

#[tokio::test(start_paused = true)]
async fn export_checks_the_session_first() {
    let backend = Arc::new(MockBackend::new());
    backend.push_status(StatusPayload::with_status(StatusType::Running));

    let err = CommandExport {
        session: "s1".into(),
        model_name: None,
        format: OutputFormat::Text,
    }
    .execute(context(&backend))
    .await
    .unwrap_err();
    assert!(err.to_string().contains("still running"));
    assert_eq!(backend.export_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn export_sends_the_model_name() {
    let backend = Arc::new(MockBackend::new());
    backend.push_status(StatusPayload::with_status(StatusType::Completed));
    backend.push_export(ExportResult {
        artifact_id: "ws/nuclei-v2".into(),
        files: vec!["model.pt".into()],
        ..Default::default()
    });

    CommandExport {
        session: "/train/s1".into(),
        model_name: Some("nuclei-v2".into()),
        format: OutputFormat::Json,
    }
    .execute(context(&backend))
    .await
    .unwrap();
    assert!(backend
        .calls()
        .contains(&BackendCall::Export("s1".into(), Some("nuclei-v2".into()))));
}

#[tokio::test(start_paused = true)]
async fn stop_without_wait_returns_immediately() {
    let backend = Arc::new(MockBackend::new());
    backend.push_status(StatusPayload::with_status(StatusType::Running));

    CommandStop {
        session: "s1".into(),
        wait: false,
        format: OutputFormat::Text,
    }
    .execute(context(&backend))
    .await
    .unwrap();
    assert!(backend.calls().contains(&BackendCall::Stop("s1".into())));
}

#[tokio::test(start_paused = true)]
async fn continue_reuses_the_previous_dataset() {
    let backend = Arc::new(MockBackend::new());
    backend.push_status(StatusPayload {
        dataset_artifact_id: Some("ws/dataset-a".into()),
        ..StatusPayload::with_status(StatusType::Completed)
    });
    backend.push_start(started("s2"));

    CommandContinue {
        session: "s1".into(),
        training: training_args(None),
        detach: true,
        format: OutputFormat::Text,
    }
    .execute(context(&backend))
    .await
    .unwrap();

    let request = backend.start_calls().pop().unwrap();
    assert_eq!(request.model, "s1");
    assert_eq!(request.artifact_id, "ws/dataset-a");
    assert_eq!(request.n_epochs, 4);
}

#[tokio::test(start_paused = true)]
async fn continue_refuses_a_running_session() {
    let backend = Arc::new(MockBackend::new());
    backend.push_status(StatusPayload::with_status(StatusType::Running));

    let err = CommandContinue {
        session: "s1".into(),
        training: training_args(Some("ws/dataset-a")),
        detach: true,
        format: OutputFormat::Text,
    }
    .execute(context(&backend))
    .await
    .unwrap_err();
    assert!(err.to_string().contains("still running"));
    assert!(backend.start_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn start_rejected_by_the_service_reports_why() {
    let backend = Arc::new(MockBackend::new());
    backend.push_start(StartResponse {
        status_type: Some(StatusType::Failed),
        message: Some("dataset has no annotations".into()),
        ..started("s1")
    });
    backend.push_status(StatusPayload::with_status(StatusType::Failed));

    let err = CommandStart {
        training: training_args(Some("ws/dataset")),
        detach: false,
        format: OutputFormat::Text,
    }
    .execute(context(&backend))
    .await
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Training session s1 failed: dataset has no annotations"
    );
}
