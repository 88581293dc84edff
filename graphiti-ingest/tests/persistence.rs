mod helpers;

use graphiti_ingest::{IngestError, ItemOutcome, SourceKind};
use serde_json::json;

use helpers::*;

#[tokio::test]
async fn a_failed_write_does_not_abort_its_siblings() {
    init_tracing();
    let registry = tripit_registry();
    let driver = TestDriver::new().failing_on(["JFK"]);
    let ingestor = ingestor_on(driver, ScriptedJudge::new(Answer::Distinct));
    let content = doc(
        &[
            ("UA 123", "Flight", json!({})),
            ("SFO", "Airport", json!({})),
            ("JFK", "Airport", json!({})),
            ("United Airlines", "Airline", json!({"iata_code": "UA"})),
        ],
        &[(0, 1, "DEPARTS_FROM"), (0, 2, "ARRIVES_AT"), (0, 3, "OPERATED_BY")],
    );

    let result = ingestor
        .ingest("p1", &content, SourceKind::Json, &registry)
        .await
        .unwrap();

    assert_eq!(result.nodes_created(), 3);
    assert!(matches!(
        &result.entity(2).unwrap().outcome,
        ItemOutcome::Failed(IngestError::Persistence(_))
    ));

    // edges touching the failed node fail, the rest are written
    assert!(result.edge(0).unwrap().outcome.is_created());
    assert!(result.edge(1).unwrap().outcome.is_failed());
    assert!(result.edge(2).unwrap().outcome.is_created());
    assert_eq!(result.failed(), 2);

    let stored = nodes_of(ingestor.driver(), "p1").await;
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|n| n.name != "JFK"));
    assert_eq!(edges_of(ingestor.driver(), "p1").await.len(), 2);
}

#[tokio::test]
async fn a_failed_node_is_retried_by_the_next_call() {
    let registry = tripit_registry();
    let ingestor = ingestor_on(
        TestDriver::new().failing_on(["JFK"]),
        ScriptedJudge::new(Answer::Distinct),
    );
    let content = doc(&[("JFK", "Airport", json!({}))], &[]);

    let first = ingestor
        .ingest("p1", &content, SourceKind::Json, &registry)
        .await
        .unwrap();
    assert!(first.entity(0).unwrap().outcome.is_failed());
    assert!(first.node_uuids().is_empty());

    // nothing reached the index, so the next call looks it up afresh
    let second = ingestor
        .ingest("p1", &content, SourceKind::Json, &registry)
        .await
        .unwrap();
    let report = second.entity(0).unwrap();
    assert_eq!(report.state, Some(graphiti_ingest::dedupe::MatchState::NoMatch));
    assert!(report.outcome.is_failed());
}
