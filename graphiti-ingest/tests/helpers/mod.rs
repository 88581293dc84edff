//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use graphiti_ingest::dedupe::{Judge, JudgmentRequest, Verdict};
use graphiti_ingest::driver::{
    EdgeUpdate, GraphDriver, InMemoryDriver, NodeUpdate, PartitionFilter, PartitionSnapshot,
};
use graphiti_ingest::edges::EntityEdge;
use graphiti_ingest::nodes::EntityNode;
use graphiti_ingest::{
    EdgeTypeDef, EdgeTypeMap, EntityTypeDef, FieldDef, FieldType, IngestConfig, IngestError,
    Ingestor, PassthroughExtractor, Result, TypeRegistry,
};
use serde_json::{json, Value};
use uuid::Uuid;

/// Route library logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn optional(name: &str, field_type: FieldType, description: &str) -> FieldDef {
    FieldDef::new(name, field_type).describe(description)
}

/// A travel-itinerary schema: reservations, places, people and providers.
pub fn tripit_registry() -> TypeRegistry {
    use FieldType::{Boolean, Float, String as Str};

    let entity_types = vec![
        EntityTypeDef::new("Trip")
            .describe("A planned trip grouping reservations and activities.")
            .with_field(optional("start_date", Str, "Trip start date (YYYY-MM-DD)"))
            .with_field(optional("end_date", Str, "Trip end date (YYYY-MM-DD)"))
            .with_field(optional("destination", Str, "Primary destination city or region"))
            .with_field(optional("is_private", Boolean, "Whether the trip is private")),
        EntityTypeDef::new("Flight")
            .describe("A flight reservation or individual flight segment.")
            .with_field(optional("airline", Str, "IATA airline code"))
            .with_field(optional("flight_number", Str, "Flight number"))
            .with_field(optional("gate", Str, "Departure gate"))
            .with_field(optional("seat_assignment", Str, "Seat assignment")),
        EntityTypeDef::new("Lodging")
            .describe("A hotel or other accommodation booking.")
            .with_field(optional("check_in_date", Str, "Check-in date"))
            .with_field(optional("check_out_date", Str, "Check-out date")),
        EntityTypeDef::new("Traveler")
            .describe("A person travelling on a reservation.")
            .with_field(optional("first_name", Str, "First name"))
            .with_field(optional("last_name", Str, "Last name")),
        EntityTypeDef::new("Airport")
            .describe("An airport, identified by its IATA code.")
            .with_field(optional("iata_code", Str, "IATA airport code"))
            .with_field(optional("city", Str, "City the airport serves"))
            .with_field(optional("latitude", Float, "Airport latitude"))
            .with_field(optional("longitude", Float, "Airport longitude")),
        EntityTypeDef::new("City")
            .describe("A city or metropolitan area.")
            .with_field(optional("country", Str, "Country the city is in"))
            .with_field(optional("timezone", Str, "IANA timezone")),
        EntityTypeDef::new("Venue")
            .describe("A named place such as a hotel property or station.")
            .with_field(optional("address", Str, "Street address")),
        EntityTypeDef::new("Airline")
            .describe("An airline company.")
            .with_field(optional("iata_code", Str, "IATA airline code")),
    ];

    let edge_types = vec![
        EdgeTypeDef::new("PART_OF_TRIP").describe("A reservation belongs to a trip."),
        EdgeTypeDef::new("DEPARTS_FROM")
            .describe("A transport segment departs from a place.")
            .with_field(optional("terminal", Str, "Terminal or platform"))
            .with_field(optional("gate", Str, "Gate number")),
        EdgeTypeDef::new("ARRIVES_AT")
            .describe("A transport segment arrives at a place.")
            .with_field(optional("baggage_claim", Str, "Baggage claim area")),
        EdgeTypeDef::new("LOCATED_AT").describe("A booking is located at a venue."),
        EdgeTypeDef::new("LOCATED_IN").describe("A place is within a city."),
        EdgeTypeDef::new("OPERATED_BY").describe("A flight is operated by an airline."),
        EdgeTypeDef::new("BOOKED_WITH")
            .describe("A reservation was booked through an agency or site.")
            .with_field(optional("booking_reference", Str, "Booking site confirmation"))
            .with_field(optional("total_cost", Str, "Total cost of the booking")),
        EdgeTypeDef::new("TRAVELER_ON").describe("A traveler is on a reservation."),
        EdgeTypeDef::new("CONNECTS_TO").describe("A segment connects to the next one."),
    ];

    let edge_type_map = EdgeTypeMap::new()
        .allow("Flight", "Trip", ["PART_OF_TRIP"])
        .allow("Lodging", "Trip", ["PART_OF_TRIP"])
        .allow("Flight", "Airport", ["DEPARTS_FROM", "ARRIVES_AT"])
        .allow("Lodging", "Venue", ["LOCATED_AT"])
        .allow("Airport", "City", ["LOCATED_IN"])
        .allow("Venue", "City", ["LOCATED_IN"])
        .allow("Flight", "Airline", ["OPERATED_BY"])
        .allow("Flight", "Entity", ["BOOKED_WITH"])
        .allow("Lodging", "Entity", ["BOOKED_WITH"])
        .allow("Traveler", "Flight", ["TRAVELER_ON"])
        .allow("Traveler", "Lodging", ["TRAVELER_ON"])
        .allow("Flight", "Flight", ["CONNECTS_TO"]);

    TypeRegistry::register(entity_types, edge_types, edge_type_map)
        .expect("tripit schema is valid")
}

/// Build an extraction document. Entities are `(name, type, attributes)`,
/// edges `(source, target, type)`.
pub fn doc(entities: &[(&str, &str, Value)], edges: &[(usize, usize, &str)]) -> String {
    let entities: Vec<Value> = entities
        .iter()
        .map(|(name, ty, attributes)| json!({"name": name, "type": ty, "attributes": attributes}))
        .collect();
    let edges: Vec<Value> = edges
        .iter()
        .map(|(source, target, ty)| json!({"source": source, "target": target, "type": ty}))
        .collect();
    json!({"entities": entities, "edges": edges}).to_string()
}

#[derive(Debug, Clone, Copy)]
pub enum Answer {
    Duplicate,
    Distinct,
    /// Never answers; the engine's timeout fires.
    Hang,
    Unavailable,
}

/// Judge that answers every request the same way and counts calls.
pub struct ScriptedJudge {
    answer: Answer,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn new(answer: Answer) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Judge for ScriptedJudge {
    async fn judge(&self, request: &JudgmentRequest) -> Result<Vec<Verdict>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Answer::Duplicate => Ok(request.matches.iter().map(|m| Verdict::duplicate(m.uuid)).collect()),
            Answer::Distinct => Ok(request.matches.iter().map(|m| Verdict::distinct(m.uuid)).collect()),
            Answer::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Answer::Unavailable => Err(IngestError::JudgmentUnavailable("judge offline".into())),
        }
    }
}

/// In-memory driver that can slow down writes and refuse to create named nodes.
#[derive(Default)]
pub struct TestDriver {
    pub inner: InMemoryDriver,
    fail_names: HashSet<String>,
    write_delay: Option<Duration>,
    created: AtomicUsize,
}

impl TestDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on<I: IntoIterator<Item = &'static str>>(mut self, names: I) -> Self {
        self.fail_names.extend(names.into_iter().map(str::to_string));
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Successful `create_node` calls.
    pub fn nodes_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl GraphDriver for TestDriver {
    async fn create_node(&self, node: &EntityNode) -> Result<()> {
        self.pause().await;
        if self.fail_names.contains(&node.name) {
            return Err(IngestError::Persistence(format!("refusing to store '{}'", node.name)));
        }
        self.inner.create_node(node).await?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_edge(&self, edge: &EntityEdge) -> Result<()> {
        self.pause().await;
        self.inner.create_edge(edge).await
    }

    async fn update_node(&self, uuid: Uuid, update: &NodeUpdate) -> Result<()> {
        self.pause().await;
        self.inner.update_node(uuid, update).await
    }

    async fn update_edge(&self, uuid: Uuid, update: &EdgeUpdate) -> Result<()> {
        self.pause().await;
        self.inner.update_edge(uuid, update).await
    }

    async fn query_by_partition(
        &self,
        group_id: &str,
        filter: &PartitionFilter,
    ) -> Result<PartitionSnapshot> {
        self.inner.query_by_partition(group_id, filter).await
    }
}

/// Short judgment timeout so fail-open tests stay fast.
pub fn test_config() -> IngestConfig {
    IngestConfig {
        judgment_timeout_ms: 100,
        ..IngestConfig::default()
    }
}

pub fn ingestor<J: Judge>(judge: J) -> Ingestor<InMemoryDriver, PassthroughExtractor, J> {
    Ingestor::new(InMemoryDriver::new(), PassthroughExtractor, judge, test_config())
        .expect("test config is valid")
}

pub fn ingestor_on<D: GraphDriver, J: Judge>(
    driver: D,
    judge: J,
) -> Ingestor<D, PassthroughExtractor, J> {
    Ingestor::new(driver, PassthroughExtractor, judge, test_config()).expect("test config is valid")
}

/// Every node of `group_id`.
pub async fn nodes_of<D: GraphDriver>(driver: &D, group_id: &str) -> Vec<EntityNode> {
    driver
        .query_by_partition(group_id, &PartitionFilter::all())
        .await
        .expect("query succeeds")
        .nodes
}

/// Every edge of `group_id`.
pub async fn edges_of<D: GraphDriver>(driver: &D, group_id: &str) -> Vec<EntityEdge> {
    driver
        .query_by_partition(group_id, &PartitionFilter::all())
        .await
        .expect("query succeeds")
        .edges
}
