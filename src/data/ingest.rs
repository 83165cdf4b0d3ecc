// ============================================================
// Layer 4 — CSV Ingestion
// ============================================================
// Reads the row-per-sentence training data. Each row carries:
//
//   doc_id, sentence,
//   <domain>-judgment   (low / high / unclear / unk, repeated
//                        verbatim on every row of the document),
//   <domain>-rationale  (0/1, per sentence)
//
// for every configured domain. Rows are grouped by doc_id in
// order of first appearance.
//
// A document whose judgment column is not constant across its own
// rows is corrupt data and aborts ingestion — we never silently
// pick one of the conflicting values.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::domain::document::Document;
use crate::domain::labels::{DomainSpec, Judgment};
use crate::domain::traits::DocumentSource;

pub struct CsvLoader {
    path: PathBuf,
    domains: Vec<DomainSpec>,
    min_sent_words: usize,
}

impl CsvLoader {
    pub fn new(path: impl Into<PathBuf>, domains: &[DomainSpec], min_sent_words: usize) -> Self {
        Self {
            path: path.into(),
            domains: domains.to_vec(),
            min_sent_words,
        }
    }
}

impl DocumentSource for CsvLoader {
    fn load_all(&self) -> Result<Vec<Document>> {
        read_documents(&self.path, &self.domains, self.min_sent_words)
    }
}

struct DocRows {
    sentences: Vec<String>,
    rationales: Vec<BTreeMap<String, f32>>,
    judgments: BTreeMap<String, Judgment>,
}

pub fn read_documents(
    path: &Path,
    domains: &[DomainSpec],
    min_sent_words: usize,
) -> Result<Vec<Document>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("cannot open training data '{}'", path.display()))?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("'{}' is missing required column '{name}'", path.display()))
    };

    let doc_id_col = column("doc_id")?;
    let sentence_col = column("sentence")?;
    let mut domain_cols = Vec::with_capacity(domains.len());
    for domain in domains {
        domain_cols.push((
            column(&domain.judgment_column())?,
            column(&domain.rationale_column())?,
        ));
    }

    // group rows by doc_id, preserving first-appearance order
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, DocRows> = HashMap::new();

    for (row_idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad CSV record at row {}", row_idx + 2))?;
        let doc_id = record
            .get(doc_id_col)
            .with_context(|| format!("row {}: missing doc_id", row_idx + 2))?
            .to_string();
        let sentence = record.get(sentence_col).unwrap_or_default().to_string();

        let entry = groups.entry(doc_id.clone()).or_insert_with(|| {
            order.push(doc_id.clone());
            DocRows {
                sentences: Vec::new(),
                rationales: Vec::new(),
                judgments: BTreeMap::new(),
            }
        });

        let mut sentence_labels = BTreeMap::new();
        for (domain, &(judgment_col, rationale_col)) in domains.iter().zip(&domain_cols) {
            let raw_judgment = record.get(judgment_col).unwrap_or_default();
            let judgment = Judgment::parse(raw_judgment)
                .with_context(|| format!("document '{doc_id}', row {}", row_idx + 2))?;

            // the document label is repeated on every row; any
            // disagreement means the data is corrupt
            match entry.judgments.get(&domain.name) {
                None => {
                    entry.judgments.insert(domain.name.clone(), judgment);
                }
                Some(&seen) if seen != judgment => bail!(
                    "document '{doc_id}': conflicting '{}' labels across rows ({seen} vs {judgment})",
                    domain.judgment_column()
                ),
                Some(_) => {}
            }

            let raw_flag = record.get(rationale_col).unwrap_or("0").trim();
            let flag: f32 = if raw_flag.is_empty() {
                0.0
            } else {
                raw_flag.parse().with_context(|| {
                    format!(
                        "document '{doc_id}', row {}: bad rationale flag '{raw_flag}'",
                        row_idx + 2
                    )
                })?
            };
            sentence_labels.insert(domain.name.clone(), if flag > 0.0 { 1.0 } else { 0.0 });
        }

        entry.sentences.push(sentence);
        entry.rationales.push(sentence_labels);
    }

    let documents: Vec<Document> = order
        .into_iter()
        .map(|doc_id| {
            let rows = groups.remove(&doc_id).expect("grouped above");
            Document::new(doc_id, rows.sentences, rows.judgments, rows.rationales, min_sent_words)
        })
        .collect();

    tracing::info!(
        "Loaded {} documents from '{}'",
        documents.len(),
        path.display()
    );
    Ok(documents)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    fn rsg() -> Vec<DomainSpec> {
        vec![DomainSpec::new("rsg", 1.0)]
    }

    #[test]
    fn test_rows_group_into_documents_in_first_seen_order() {
        let f = write_csv(
            "doc_id,sentence,rsg-judgment,rsg-rationale\n\
             d2,coin flips decided assignment,low,1\n\
             d1,no method was described,unk,0\n\
             d2,outcomes were recorded daily,low,0\n",
        );
        let docs = read_documents(f.path(), &rsg(), 1).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "d2");
        assert_eq!(docs[0].num_sentences(), 2);
        assert_eq!(docs[0].judgment_for("rsg"), Judgment::Favorable);
        assert_eq!(docs[1].judgment_for("rsg"), Judgment::Unknown);
    }

    #[test]
    fn test_conflicting_document_labels_abort_ingestion() {
        let f = write_csv(
            "doc_id,sentence,rsg-judgment,rsg-rationale\n\
             d1,allocation used random tables,low,1\n\
             d1,no further detail given,high,0\n",
        );
        let err = read_documents(f.path(), &rsg(), 1).unwrap_err();
        assert!(err.to_string().contains("conflicting"));
    }

    #[test]
    fn test_missing_domain_column_fails_fast() {
        let f = write_csv("doc_id,sentence\nd1,some sentence,\n");
        assert!(read_documents(f.path(), &rsg(), 1).is_err());
    }

    #[test]
    fn test_rationale_flags_binarize() {
        let f = write_csv(
            "doc_id,sentence,rsg-judgment,rsg-rationale\n\
             d1,randomization by computer sequence,low,2\n\
             d1,patients signed consent forms,low,0\n",
        );
        let docs = read_documents(f.path(), &rsg(), 1).unwrap();
        assert_eq!(docs[0].rationales[0]["rsg"], 1.0);
        assert_eq!(docs[0].rationales[1]["rsg"], 0.0);
    }
}
