//! OCR pipeline integration tests

use std::sync::Arc;

use bridge_traits::testing::{InMemoryFileStore, InMemoryWorkspace};
use bridge_traits::{
    ExtractedData, FileRecord, OcrHealth, OcrRequest, OcrResponse, OcrService, WorkspaceEntry,
};
use chrono::Utc;
use core_ocr::{OcrConfig, OcrOutcome, OcrPipeline, DEFAULT_PRIORITY};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, OcrEvent};
use mockall::mock;

mock! {
    pub Ocr {}

    #[async_trait::async_trait]
    impl OcrService for Ocr {
        async fn perform_ocr(&self, request: OcrRequest) -> bridge_traits::error::Result<OcrResponse>;
        async fn health_check(&self) -> bridge_traits::error::Result<OcrHealth>;
    }
}

fn pipeline_with(
    ocr: MockOcr,
    store: Arc<InMemoryFileStore>,
    workspace: Arc<InMemoryWorkspace>,
    event_bus: Arc<EventBus>,
) -> OcrPipeline {
    let core = CoreConfig::builder()
        .file_store(store)
        .workspace_store(workspace)
        .ocr_service(Arc::new(ocr))
        .enable_ocr(true)
        .build()
        .unwrap();
    OcrPipeline::new(&core, OcrConfig::default(), event_bus).unwrap()
}

fn seed_pdf(
    store: &InMemoryFileStore,
    workspace: &InMemoryWorkspace,
    file_id: &str,
    name: &str,
) -> WorkspaceEntry {
    let now = Utc::now();
    let size = 2 * 1024 * 1024;
    store.insert(
        FileRecord::new(file_id, name, format!("/Invoices/{}", name), size, now)
            .with_mime_type("application/pdf"),
        vec![0u8; 16],
    );
    let entry = WorkspaceEntry::new(file_id, name, format!("/Invoices/{}", name), now)
        .with_size(size)
        .with_file_type("pdf");
    workspace.insert(entry.clone());
    entry
}

#[tokio::test]
async fn test_invoice_is_tagged_and_marked_analyzed() {
    let store = Arc::new(InMemoryFileStore::new());
    let workspace = Arc::new(InMemoryWorkspace::new());
    let event_bus = Arc::new(EventBus::new(64));
    let mut events = event_bus.subscribe();

    let mut ocr = MockOcr::new();
    ocr.expect_perform_ocr()
        .withf(|request| request.language == "en" && request.extract_tables)
        .times(1)
        .returning(|_| {
            Ok(OcrResponse {
                success: true,
                text: "Invoice RG-2024-001".to_string(),
                confidence: 0.95,
                extracted_data: ExtractedData {
                    invoice_numbers: vec!["RG-2024-001".to_string()],
                    confidence: 0.95,
                    ..Default::default()
                },
                error: None,
            })
        });

    let pipeline = pipeline_with(ocr, store.clone(), workspace.clone(), event_bus);
    let entry = seed_pdf(&store, &workspace, "f1", "invoice.pdf");

    assert!(pipeline.schedule_analysis(&entry, DEFAULT_PRIORITY).await);
    assert!(matches!(
        pipeline.process_next().await,
        Some(OcrOutcome::Completed { .. })
    ));

    let analyzed = workspace.get("f1").unwrap();
    assert!(analyzed.ocr_analyzed);
    assert!(analyzed.tags.contains(&"Invoice".to_string()));
    assert_eq!(
        analyzed.extracted_data.unwrap().invoice_numbers,
        vec!["RG-2024-001"]
    );

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&CoreEvent::Ocr(OcrEvent::Queued {
        file_id: "f1".to_string(),
        priority: 5
    })));
    assert!(seen.iter().any(|e| matches!(
        e,
        CoreEvent::Ocr(OcrEvent::Completed {
            confidence_percent: 95,
            ..
        })
    )));
}

#[tokio::test]
async fn test_backlog_sweep_is_idempotent() {
    let store = Arc::new(InMemoryFileStore::new());
    let workspace = Arc::new(InMemoryWorkspace::new());

    let mut ocr = MockOcr::new();
    ocr.expect_perform_ocr().returning(|_| {
        Ok(OcrResponse {
            success: true,
            text: "text".to_string(),
            confidence: 0.8,
            ..Default::default()
        })
    });
    let pipeline = pipeline_with(
        ocr,
        store.clone(),
        workspace.clone(),
        Arc::new(EventBus::new(64)),
    );

    seed_pdf(&store, &workspace, "f1", "a.pdf");
    seed_pdf(&store, &workspace, "f2", "b.pdf");
    workspace.insert(WorkspaceEntry::new("f3", "notes.txt", "/notes.txt", Utc::now()));
    let mut analyzed = WorkspaceEntry::new("f4", "done.png", "/done.png", Utc::now());
    analyzed.ocr_analyzed = true;
    workspace.insert(analyzed);

    assert_eq!(pipeline.process_backlog().await.unwrap(), 2);
    assert_eq!(pipeline.process_backlog().await.unwrap(), 0);
    assert_eq!(pipeline.stats().await.pending, 2);

    assert_eq!(pipeline.drain().await, 2);
    assert_eq!(pipeline.process_backlog().await.unwrap(), 0);
    assert_eq!(pipeline.stats().await.succeeded, 2);
}

#[tokio::test]
async fn test_service_failure_response_counts_as_attempt() {
    let store = Arc::new(InMemoryFileStore::new());
    let workspace = Arc::new(InMemoryWorkspace::new());

    let mut ocr = MockOcr::new();
    ocr.expect_perform_ocr()
        .times(3)
        .returning(|_| Ok(OcrResponse::failure("model overloaded")));
    let pipeline = pipeline_with(
        ocr,
        store.clone(),
        workspace.clone(),
        Arc::new(EventBus::new(64)),
    );
    let entry = seed_pdf(&store, &workspace, "f1", "scan.pdf");

    pipeline.schedule_analysis(&entry, 0).await;
    assert_eq!(pipeline.drain().await, 3);

    let failed = workspace.get("f1").unwrap();
    assert_eq!(
        failed.extracted_text.as_deref(),
        Some("[OCR failed after 3 attempts: OCR service reported failure: model overloaded]")
    );
    assert!(failed.tags.contains(&"OCR-Error".to_string()));
}

#[tokio::test]
async fn test_health_passthrough() {
    let mut ocr = MockOcr::new();
    ocr.expect_health_check().times(1).returning(|| {
        Ok(OcrHealth {
            healthy: false,
            model: Some("doc-ocr".to_string()),
            message: Some("warming up".to_string()),
        })
    });
    let pipeline = pipeline_with(
        ocr,
        Arc::new(InMemoryFileStore::new()),
        Arc::new(InMemoryWorkspace::new()),
        Arc::new(EventBus::new(8)),
    );

    let health = pipeline.health().await.unwrap();
    assert!(!health.healthy);
    assert_eq!(health.message.as_deref(), Some("warming up"));
}
