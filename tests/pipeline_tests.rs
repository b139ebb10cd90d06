//! End-to-end ingest pipeline tests with mock enrichment backends.

mod common;

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use smriti_memory::audit::AuditOutcome;
use smriti_memory::enrichment::{Embed, EnrichmentBackends, EntityExtractor};
use smriti_memory::pipeline::IngestInput;
use smriti_memory::AppError;

fn input(text: &str) -> IngestInput {
    IngestInput {
        text: text.to_string(),
        channel: "email".to_string(),
        metadata: HashMap::new(),
        attachments: Vec::new(),
    }
}

#[tokio::test]
async fn llm_fallback_supplies_entities_when_ner_is_down() {
    let backends = EnrichmentBackends {
        extractor: EntityExtractor::new(vec![
            Arc::new(FailingStrategy("ner_service")),
            Arc::new(FixedStrategy {
                label: "llm_fallback",
                entities: vec![entity("Contact", "John"), entity("Organization", "Acme")],
            }),
        ]),
        summarizer: Arc::new(FixedSummarizer("Talked to John about Acme.")),
        embedder: Arc::new(BagOfWordsEmbedder::new()),
        distiller: Arc::new(FixedDistiller(vec![])),
    };
    let h = harness(backends);
    let agent = private_agent("crm-agent");

    let outcome = h
        .state
        .orchestrator
        .ingest(&agent, input("Call with John from Acme"), &h.state.ingest_settings)
        .await
        .unwrap();

    let names: Vec<&str> = outcome.entities.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"John"));
    assert!(names.contains(&"Acme"));
    assert_eq!(outcome.entities[0].role, "mentioned");
    // The fallback answered, so the stage did not degrade.
    assert!(!outcome.degraded.contains(&"entities"));
}

#[tokio::test]
async fn extraction_outage_is_marked_degraded_not_empty() {
    // Both tiers down, everything else healthy: the caller and the
    // audit trail must be able to tell this apart from a text that
    // simply had no entities.
    let backends = EnrichmentBackends {
        extractor: EntityExtractor::new(vec![
            Arc::new(FailingStrategy("ner_service")),
            Arc::new(FailingStrategy("llm_fallback")),
        ]),
        summarizer: Arc::new(FixedSummarizer("Quarterly notes.")),
        embedder: Arc::new(BagOfWordsEmbedder::new()),
        distiller: Arc::new(FixedDistiller(vec![])),
    };
    let h = harness(backends);
    let agent = private_agent("crm-agent");

    let outcome = h
        .state
        .orchestrator
        .ingest(&agent, input("Quarterly check-in notes"), &h.state.ingest_settings)
        .await
        .unwrap();

    assert!(outcome.entities.is_empty());
    assert_eq!(outcome.degraded, vec!["entities"]);

    let audit = h.state.audit.recent("crm-agent", 10).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome, AuditOutcome::Degraded);
}

#[tokio::test]
async fn total_enrichment_outage_still_stores_the_record() {
    let backends = EnrichmentBackends {
        extractor: EntityExtractor::new(vec![
            Arc::new(FailingStrategy("ner_service")),
            Arc::new(FailingStrategy("llm_fallback")),
        ]),
        summarizer: Arc::new(FailingSummarizer),
        embedder: Arc::new(FailingEmbedder),
        distiller: Arc::new(FixedDistiller(vec![])),
    };
    let h = harness(backends);
    let agent = private_agent("crm-agent");

    let outcome = h
        .state
        .orchestrator
        .ingest(&agent, input("Quarterly check-in notes"), &h.state.ingest_settings)
        .await
        .unwrap();

    assert!(outcome.entities.is_empty());
    assert!(outcome.summary.is_none());
    assert!(outcome.degraded.contains(&"entities"));
    assert!(outcome.degraded.contains(&"summarize"));
    assert!(outcome.degraded.contains(&"embed"));

    // The record itself is durable despite every stage degrading.
    let stored = h
        .state
        .store
        .get_interaction(&outcome.memory_id)
        .unwrap()
        .expect("record stored");
    assert_eq!(stored.text, "Quarterly check-in notes");
    assert!(stored.embedding.is_none());
}

#[tokio::test]
async fn shared_derivative_is_scrubbed_but_private_keeps_raw_text() {
    let h = harness(happy_backends());
    let agent = shared_agent("crm-agent");

    let text = "Send the renewal to jane.doe@acme.com before Friday";
    let outcome = h
        .state
        .orchestrator
        .ingest(&agent, input(text), &h.state.ingest_settings)
        .await
        .unwrap();
    assert!(outcome.shared);

    let private = h
        .state
        .store
        .get_interaction(&outcome.memory_id)
        .unwrap()
        .expect("private record");
    assert!(private.text.contains("jane.doe@acme.com"));
    assert!(private.shared);

    let shared: Vec<_> = h.state.shared_store.scan().unwrap();
    assert_eq!(shared.len(), 1);
    assert!(!shared[0].scrubbed_text.contains("jane.doe@acme.com"));
    assert!(shared[0].scrubbed_text.contains("[REDACTED:email]"));
    assert_eq!(shared[0].source_id, outcome.memory_id);
    // The derivative gets its own identity.
    assert_ne!(shared[0].id, outcome.memory_id);
}

#[tokio::test]
async fn private_agents_never_produce_shared_derivatives() {
    let h = harness(happy_backends());
    let agent = private_agent("ops-agent");

    let outcome = h
        .state
        .orchestrator
        .ingest(&agent, input("Internal incident review"), &h.state.ingest_settings)
        .await
        .unwrap();

    assert!(!outcome.shared);
    assert!(h.state.shared_store.scan().unwrap().is_empty());
}

#[tokio::test]
async fn rate_limit_rejects_before_any_model_call() {
    let embedder = Arc::new(BagOfWordsEmbedder::new());
    let backends = EnrichmentBackends {
        extractor: EntityExtractor::new(vec![]),
        summarizer: Arc::new(FixedSummarizer("summary")),
        embedder: embedder.clone() as Arc<dyn Embed>,
        distiller: Arc::new(FixedDistiller(vec![])),
    };
    let mut config = smriti_memory::ServerConfig::default();
    config.embedding_dim = DIM;
    config.rate_limit.budget = 2;
    let h = harness_with_config(config, backends);
    let agent = private_agent("chatty-agent");

    for _ in 0..2 {
        h.state
            .orchestrator
            .ingest(&agent, input("hello"), &h.state.ingest_settings)
            .await
            .unwrap();
    }
    let calls_before = embedder.calls.load(Ordering::SeqCst);
    assert!(calls_before > 0);

    let err = h
        .state
        .orchestrator
        .ingest(&agent, input("hello again"), &h.state.ingest_settings)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RateLimited { .. }));

    // Rejection happens before enrichment, so no extra model calls.
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_before);
    // And leaves no audit trace: two entries, one per accepted ingest.
    assert_eq!(h.state.audit.recent("chatty-agent", 100).unwrap().len(), 2);
}

#[tokio::test]
async fn oversized_attachment_parses_as_failed_but_ingest_succeeds() {
    let h = harness(happy_backends());
    let agent = private_agent("crm-agent");

    let mut payload = input("Contract attached");
    payload.attachments.push(smriti_memory::pipeline::AttachmentInput {
        filename: "contract.txt".to_string(),
        content: "x".repeat(smriti_memory::validation::MAX_ATTACHMENT_BYTES + 1),
    });

    let outcome = h
        .state
        .orchestrator
        .ingest(&agent, payload, &h.state.ingest_settings)
        .await
        .unwrap();

    let stored = h
        .state
        .store
        .get_interaction(&outcome.memory_id)
        .unwrap()
        .expect("stored");
    assert_eq!(stored.documents.len(), 1);
    assert_eq!(
        stored.documents[0].status,
        smriti_memory::memory::ParseStatus::Failed
    );
    assert!(stored.documents[0].text.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// No generated email address ever survives into the shared
    /// partition.
    #[test]
    fn scrubbing_removes_any_email(local in "[a-z][a-z0-9]{0,9}", domain in "[a-z]{2,8}") {
        let email = format!("{local}@{domain}.com");
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let h = harness(happy_backends());
            let agent = shared_agent("crm-agent");
            let text = format!("Reach out to {email} about the invoice");
            h.state
                .orchestrator
                .ingest(&agent, input(&text), &h.state.ingest_settings)
                .await
                .unwrap();

            let shared = h.state.shared_store.scan().unwrap();
            prop_assert_eq!(shared.len(), 1);
            prop_assert!(!shared[0].scrubbed_text.contains(&email));
            if let Some(summary) = &shared[0].summary {
                prop_assert!(!summary.contains(&email));
            }
            Ok(())
        })?;
    }
}
