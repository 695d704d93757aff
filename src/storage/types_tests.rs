use std::collections::HashMap;
use std::str::FromStr;

use serde_json::json;

use super::*;

fn sample_dna() -> DecisionDNA {
    DecisionDNA {
        risk_tolerance: 0.7,
        time_horizon_preference: TimeHorizon::Medium,
        value_priorities: vec!["career".to_string(), "freedom".to_string()],
        decision_patterns: HashMap::from([(
            "style".to_string(),
            json!("analytical"),
        )]),
        emotional_drivers: vec!["achievement".to_string()],
    }
}

fn sample_scenario(timeline: &str, variant: Variant) -> Scenario {
    let timeline = Timeline::new(timeline);
    Scenario {
        scenario_id: Scenario::id_for(&timeline, variant),
        timeline,
        variant,
        decision_path: "Take the startup role".to_string(),
        outcomes: HashMap::from([("career".to_string(), json!("Senior role"))]),
        probability: 0.7,
        key_events: vec!["Join startup".to_string()],
        risks: vec!["Startup failure".to_string()],
        opportunities: vec!["Equity upside".to_string()],
    }
}

#[test]
fn test_variant_order_and_display() {
    let names: Vec<String> = Variant::ALL.iter().map(|v| v.to_string()).collect();
    assert_eq!(names, vec!["optimistic", "realistic", "pessimistic"]);

    for variant in Variant::ALL {
        assert_eq!(Variant::from_str(&variant.to_string()).unwrap(), variant);
    }
    assert!(Variant::from_str("hopeful").is_err());
}

#[test]
fn test_timeline_defaults_and_trim() {
    let defaults = Timeline::defaults();
    assert_eq!(defaults.len(), 3);
    assert_eq!(defaults[0].as_str(), "1yr");

    assert_eq!(Timeline::new("  2yr ").as_str(), "2yr");
}

#[test]
fn test_scenario_id_shape() {
    let timeline = Timeline::new("3yr");
    assert_eq!(
        Scenario::id_for(&timeline, Variant::Pessimistic),
        "3yr_pessimistic"
    );
}

#[test]
fn test_pipeline_state_roundtrip() {
    let states = [
        PipelineState::Created,
        PipelineState::Profiled,
        PipelineState::Simulated,
        PipelineState::Analyzed,
        PipelineState::Advised,
        PipelineState::Complete,
        PipelineState::Failed {
            stage: "simulate".to_string(),
        },
    ];

    for state in states {
        let parsed = PipelineState::from_str(&state.to_string()).unwrap();
        assert_eq!(parsed, state);
    }

    assert_eq!(
        PipelineState::Failed {
            stage: "analyze".to_string()
        }
        .to_string(),
        "failed:analyze"
    );
    assert!(PipelineState::from_str("done").is_err());
}

#[test]
fn test_time_horizon_roundtrip() {
    for horizon in [TimeHorizon::Short, TimeHorizon::Medium, TimeHorizon::Long] {
        assert_eq!(TimeHorizon::from_str(&horizon.to_string()).unwrap(), horizon);
    }
}

#[test]
fn test_decision_record_builders() {
    let outcome = HashMap::from([("career".to_string(), json!("promoted"))]);
    let record = DecisionRecord::new("Take the job?", "accept", "better growth")
        .with_predicted_scenario("1yr_realistic")
        .with_outcome(outcome.clone());

    assert_eq!(record.predicted_scenario.as_deref(), Some("1yr_realistic"));
    assert_eq!(record.actual_outcome, Some(outcome));
    assert!(record.accuracy.is_none());
}

#[test]
fn test_session_conversation_log_is_ordered() {
    let mut session = Session::new(json!({"user_id": "u1", "age": 30}));
    session.record_input("profile", json!({"prompt": "..."}));
    session.record_output("profile", json!({"risk_tolerance": 0.5}));

    assert_eq!(session.conversation_history.len(), 2);
    assert_eq!(session.conversation_history[0].direction, Direction::Input);
    assert_eq!(session.conversation_history[1].direction, Direction::Output);
    assert_eq!(session.conversation_history[0].stage, "profile");
}

#[test]
fn test_session_user_id() {
    let session = Session::new(json!({"user_id": "u42"}));
    assert_eq!(session.user_id(), Some("u42"));

    let anonymous = Session::new(json!({"age": 30}));
    assert_eq!(anonymous.user_id(), None);
}

#[test]
fn test_session_serde_roundtrip() {
    let mut session = Session::new(json!({"user_id": "u1", "age": 30}));
    session.decision_text = Some("Quit my job and travel".to_string());
    session.decision_dna = Some(sample_dna());
    session.scenarios = vec![
        sample_scenario("1yr", Variant::Optimistic),
        sample_scenario("1yr", Variant::Realistic),
    ];
    session.analysis = Some(Analysis {
        recommended_scenario: "1yr_optimistic".to_string(),
        alignment_scores: HashMap::from([("1yr_optimistic".to_string(), 0.8)]),
        trade_offs: vec!["freedom vs stability".to_string()],
        risk_assessment: "Moderate risk overall".to_string(),
        opportunity_assessment: "Strong growth potential".to_string(),
    });
    session.state = PipelineState::Analyzed;

    let encoded = serde_json::to_string(&session).unwrap();
    let decoded: Session = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, session);
}
