use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::config::LoreConfig;
use crate::error::KnowledgeError;
use crate::knowledge::store::IngestRequest;
use crate::knowledge::types::KnowledgeRecord;

/// One line of an import file: a full exported record, or a bare ingest
/// request.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportLine {
    Record(Box<KnowledgeRecord>),
    Request(IngestRequest),
}

impl From<ImportLine> for IngestRequest {
    fn from(line: ImportLine) -> Self {
        match line {
            ImportLine::Record(record) => IngestRequest {
                file: record.file,
                category: record.category,
                body: record.body,
                source: record.metadata.source,
                verified: record.metadata.verified,
                domain_version: record.metadata.domain_version,
            },
            ImportLine::Request(request) => request,
        }
    }
}

fn parse_lines(contents: &str) -> Vec<(usize, Result<IngestRequest, serde_json::Error>)> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, serde_json::from_str::<ImportLine>(line).map(Into::into)))
        .collect()
}

/// Import records from a JSON Lines file.
///
/// Every line goes through the normal ingest path, so near-duplicates of
/// existing records are merged rather than inserted. Exported ids, usage
/// counts and history are not carried over.
pub async fn import(config: &LoreConfig, file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;
    let lines = parse_lines(&contents);

    let engine = super::open_engine(config)?;
    println!("Importing {} records...", lines.len());

    let pb = super::progress_bar(lines.len())?;
    let mut created = 0u64;
    let mut merged = 0u64;
    let mut rejected = 0u64;

    for (line_no, parsed) in lines {
        pb.inc(1);
        let request = match parsed {
            Ok(request) => request,
            Err(e) => {
                pb.suspend(|| eprintln!("Warning: line {line_no}: invalid JSON: {e}"));
                rejected += 1;
                continue;
            }
        };
        match engine.ingest(request).await {
            Ok(outcome) if outcome.merged => merged += 1,
            Ok(_) => created += 1,
            Err(e @ (KnowledgeError::Validation(_) | KnowledgeError::NotFound(_))) => {
                pb.suspend(|| eprintln!("Warning: line {line_no}: {e}"));
                rejected += 1;
            }
            Err(e) => {
                pb.finish_and_clear();
                return Err(e).with_context(|| format!("import stopped at line {line_no}"));
            }
        }
    }
    pb.finish_and_clear();

    println!("Import complete:");
    println!("  Created:  {created}");
    println!("  Merged:   {merged} (near-duplicates of existing records)");
    if rejected > 0 {
        println!("  Rejected: {rejected}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::RecordBody;

    #[test]
    fn test_parse_request_and_blank_lines() {
        let contents = r#"{"file":"guides","category":"http","body":{"kind":"article","title":"Retries","text":"Back off."},"source":"docs"}

not json
"#;
        let parsed = parse_lines(contents);
        assert_eq!(parsed.len(), 2);

        let (line_no, first) = &parsed[0];
        assert_eq!(*line_no, 1);
        let request = first.as_ref().unwrap();
        assert_eq!(request.file, "guides");
        assert_eq!(request.source, "docs");
        assert_eq!(request.body, RecordBody::article("Retries", "Back off."));

        assert_eq!(parsed[1].0, 3);
        assert!(parsed[1].1.is_err());
    }

    #[test]
    fn test_parse_exported_record() {
        let now = chrono::Utc::now();
        let record = KnowledgeRecord {
            id: "r1".into(),
            file: "faq".into(),
            category: "auth".into(),
            body: RecordBody::Qa {
                question: "How do I rotate keys?".into(),
                answer: "Use the admin console.".into(),
                code_samples: vec![],
                tags: vec!["keys".into()],
            },
            metadata: crate::knowledge::types::RecordMetadata {
                source: "official-docs".into(),
                created_at: now,
                updated_at: now,
                usage_count: 4,
                verified: true,
                quality_score: 0.9,
                version: 3,
                domain_version: Some("2024.4".into()),
                history: vec![],
            },
        };
        let line = serde_json::to_string(&record).unwrap();

        let parsed = parse_lines(&line);
        let request = parsed[0].1.as_ref().unwrap();
        assert_eq!(request.file, "faq");
        assert_eq!(request.source, "official-docs");
        assert!(request.verified);
        assert_eq!(request.domain_version.as_deref(), Some("2024.4"));
        assert_eq!(request.body.kind(), "qa");
    }
}
