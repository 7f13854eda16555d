use std::sync::Arc;

use chrono::Utc;
use qguard_core::{ComplaintRecord, ComplaintStatus, ReworkRiskScorer, SignalLexicon};
use qguard_knowledge::{KnowledgeCorpus, ProcedureSnippet};
use qguard_ml::UrgencyClassifier;
use qguard_tools::{
    KnowledgeLookupTool, RegistryError, ScoreReworkTool, ToolError, ToolRegistry, UrgencyTool,
    KNOWLEDGE_LOOKUP_TOOL, SCORE_REWORK_TOOL, URGENCY_TOOL,
};
use serde_json::json;

fn corpus() -> Arc<KnowledgeCorpus> {
    Arc::new(KnowledgeCorpus::from_snippets(
        "v1-test",
        vec![ProcedureSnippet {
            snippet_id: "heating-outage.md::0".to_string(),
            title: "Heating outage".to_string(),
            body: "No heat during heating season: check the boiler status board first."
                .to_string(),
            source_path: "heating-outage.md".to_string(),
        }],
    ))
}

fn classifier() -> Arc<UrgencyClassifier> {
    Arc::new(UrgencyClassifier::new(SignalLexicon::builtin(), None))
}

fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(UrgencyTool::new(classifier())))
        .unwrap();
    registry
        .register(Arc::new(ScoreReworkTool::new(ReworkRiskScorer::builtin())))
        .unwrap();
    registry
        .register(Arc::new(KnowledgeLookupTool::new(corpus())))
        .unwrap();
    registry
}

fn complaint(narrative: &str) -> ComplaintRecord {
    ComplaintRecord {
        complaint_id: "C-1".to_string(),
        narrative: narrative.to_string(),
        category: "GENERAL".to_string(),
        reported_at: Utc::now(),
        location_id: "BLDG-A".to_string(),
        status: ComplaintStatus::Open,
    }
}

#[test]
fn list_tools_exposes_names_and_schemas() {
    let specs = registry().list_tools();
    assert_eq!(specs.len(), 3);

    for spec in specs {
        assert!(spec.input_schema.is_object());
        assert!(spec.output_schema.is_object());
        assert!(!spec.description.is_empty());
    }
}

#[test]
fn duplicate_registration_fails_and_keeps_first() {
    let mut registry = registry();
    let error = registry
        .register(Arc::new(UrgencyTool::new(classifier())))
        .unwrap_err();
    assert!(matches!(error, RegistryError::Duplicate(_)));

    // First registration is still live.
    let output = registry
        .invoke(
            URGENCY_TOOL,
            serde_json::to_value(complaint("gas leak in hallway")).unwrap(),
        )
        .unwrap();
    assert_eq!(output["tier"], "critical");
}

#[test]
fn malformed_input_is_rejected_before_dispatch() {
    let error = registry()
        .invoke(URGENCY_TOOL, json!({ "complaint_id": "C-1" }))
        .unwrap_err();

    match error {
        ToolError::Validation { message, .. } => {
            assert!(message.contains("narrative") || message.contains("required"));
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn wrong_field_type_names_the_field() {
    let mut record = serde_json::to_value(complaint("leak")).unwrap();
    record["narrative"] = json!(42);

    let error = registry().invoke(URGENCY_TOOL, record).unwrap_err();
    match error {
        ToolError::Validation { field, .. } => assert_eq!(field, "/narrative"),
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn override_narratives_always_come_back_critical() {
    let registry = registry();
    for narrative in [
        "strong gas smell on the third floor",
        "smoke in the stairwell",
        "ceiling collapse in unit 5B",
        "no heat and the baby is sick",
        "pipes frozen solid in the kitchen wall",
    ] {
        let output = registry
            .invoke(URGENCY_TOOL, serde_json::to_value(complaint(narrative)).unwrap())
            .unwrap();
        assert_eq!(output["tier"], "critical", "narrative: {narrative}");
        assert!(
            output["confidence"].as_f64().unwrap() >= 0.9,
            "narrative: {narrative}"
        );
    }
}

#[test]
fn factor_contributions_always_sum_to_the_score() {
    let registry = registry();
    for (age, resolution, rate) in [
        (0_u32, "full_replacement", Some(0.0)),
        (24, "reset", None),
        (90, "mystery_code", Some(0.33)),
        (200, "temporary_patch", Some(0.5)),
        (999, "temporary_patch", Some(1.0)),
    ] {
        let output = registry
            .invoke(
                SCORE_REWORK_TOOL,
                json!({
                    "work_order": {
                        "work_order_id": "WO-1",
                        "asset_id": "A-1",
                        "asset_age_months": age,
                        "resolution_code": resolution,
                        "contractor_id": "CTR-1",
                        "completed_at": "2025-06-01T12:00:00Z"
                    },
                    "contractor_rework_rate": rate
                }),
            )
            .unwrap();

        let score = output["score"].as_f64().unwrap();
        let sum: f64 = output["factors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|factor| factor["points"].as_f64().unwrap())
            .sum();

        assert!((score - sum).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&score));
    }
}

#[test]
fn identical_input_yields_identical_output() {
    let registry = registry();
    let input = json!({
        "work_order": {
            "work_order_id": "WO-2",
            "asset_id": "A-2",
            "asset_age_months": 120,
            "resolution_code": "partial_repair",
            "contractor_id": "CTR-2",
            "completed_at": "2025-06-01T12:00:00Z"
        },
        "contractor_rework_rate": 0.25
    });

    let first = registry.invoke(SCORE_REWORK_TOOL, input.clone()).unwrap();
    let second = registry.invoke(SCORE_REWORK_TOOL, input).unwrap();
    assert_eq!(first, second);
}

#[test]
fn knowledge_lookup_caps_results_and_handles_empty_keywords() {
    let registry = registry();

    let empty = registry
        .invoke(KNOWLEDGE_LOOKUP_TOOL, json!({ "keywords": [] }))
        .unwrap();
    assert!(empty["matches"].as_array().unwrap().is_empty());

    let hits = registry
        .invoke(
            KNOWLEDGE_LOOKUP_TOOL,
            json!({ "keywords": ["heat", "boiler"], "limit": 1 }),
        )
        .unwrap();
    let matches = hits["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["title"], "Heating outage");
}
