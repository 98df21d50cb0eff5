//! Batch runner tests: JSONL in, audits out, failures counted.

use std::io::Write;

use arbitration::{ArbitrationEngine, BackendKind, EngineConfig, ScriptedAdjudicator};
use review_agents::{process_stream, BatchStats};
use serde_json::{json, Value};

fn sample_line(id: &str, polarity: &str) -> String {
    json!({
        "sample_id": id,
        "extractions": [
            {"origin": "literal", "triplet": {"aspect_term": "향", "aspect_ref": "본품#품질", "polarity": polarity}}
        ]
    })
    .to_string()
}

fn quiet_panel(samples: usize) -> ScriptedAdjudicator {
    let mut scripted = ScriptedAdjudicator::new();
    for _ in 0..samples * 3 {
        scripted = scripted.respond("review", json!({"actions": []}));
    }
    scripted
}

async fn run_batch(adjudicator: &ScriptedAdjudicator, input: &str) -> (BatchStats, Vec<Value>) {
    let config = EngineConfig::default();
    let engine = ArbitrationEngine::new(adjudicator, &config);
    let mut output: Vec<u8> = Vec::new();
    let stats = process_stream(&engine, input.as_bytes(), &mut output)
        .await
        .unwrap();
    let audits = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (stats, audits)
}

#[tokio::test]
async fn test_one_audit_per_sample() {
    let input = format!("{}\n\n{}\n", sample_line("s1", "positive"), sample_line("s2", "negative"));
    let adjudicator = quiet_panel(2);
    let (stats, audits) = run_batch(&adjudicator, &input).await;

    assert_eq!(stats, BatchStats { processed: 2, abandoned: 0 });
    assert_eq!(audits.len(), 2);
    assert_eq!(audits[0]["sample_id"], "s1");
    assert_eq!(audits[1]["candidates_after"][0]["polarity"], "negative");
}

#[tokio::test]
async fn test_malformed_line_is_skipped() {
    let input = format!("{{not json\n{}\n", sample_line("s1", "positive"));
    let adjudicator = quiet_panel(1);
    let (stats, audits) = run_batch(&adjudicator, &input).await;

    assert_eq!(stats, BatchStats { processed: 1, abandoned: 1 });
    assert_eq!(audits.len(), 1);
}

#[tokio::test]
async fn test_fatal_sample_does_not_stop_batch() {
    // First sample has a reviewer with no answer and a production backend;
    // the second sample finds all three reviews queued.
    let adjudicator = ScriptedAdjudicator::new()
        .with_backend(BackendKind::Production)
        .respond("review:A", json!({"actions": []}))
        .respond("review:B", json!({"actions": []}))
        .respond("review:A", json!({"actions": []}))
        .respond("review:B", json!({"actions": []}))
        .respond("review:C", json!({"actions": []}));
    let config = EngineConfig::from_toml_str("[adjudication]\nmax_attempts = 1").unwrap();
    let engine = ArbitrationEngine::new(&adjudicator, &config);

    let input = format!("{}\n{}\n", sample_line("s1", "positive"), sample_line("s2", "positive"));
    let mut output: Vec<u8> = Vec::new();
    let stats = process_stream(&engine, input.as_bytes(), &mut output)
        .await
        .unwrap();

    // s1: A and B answer, C has nothing queued yet and is fatal.
    // s2: A and B answer, C answers.
    assert_eq!(stats, BatchStats { processed: 1, abandoned: 1 });
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("\"sample_id\":\"s2\""));
}

#[tokio::test]
async fn test_replay_file_drives_reviews() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        json!({
            "review:A": [{"actions": [{"action_type": "DROP", "target_tuple_ids": ["t0"], "reason_code": "WEAK_EVIDENCE"}]}],
            "review:B": [{"actions": [{"action_type": "DROP", "target_tuple_ids": ["t0"], "reason_code": "DUPLICATE_TUPLE"}]}],
            "review:C": [{"actions": []}]
        })
    )
    .unwrap();
    let raw = std::fs::read_to_string(file.path()).unwrap();
    let adjudicator = ScriptedAdjudicator::from_replay(&serde_json::from_str(&raw).unwrap()).unwrap();

    let (stats, audits) = run_batch(&adjudicator, &sample_line("s1", "positive")).await;
    assert_eq!(stats.processed, 1);
    assert_eq!(audits[0]["decisions"][0]["action_type"], "DROP");
    assert_eq!(audits[0]["summary"]["dropped"][0], "t0");
    assert!(audits[0]["candidates_after"].as_array().unwrap().is_empty());
}
