//! BM25 lexical scoring over one candidate set

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// BM25 parameters
const K1: f64 = 1.5; // Term frequency saturation
const B: f64 = 0.75; // Length normalization

#[derive(Debug, Clone)]
struct Document {
    terms: HashMap<String, usize>,
    length: usize,
}

/// In-memory BM25 index; documents are addressed by insertion order
#[derive(Debug, Default)]
pub struct Bm25Index {
    documents: Vec<Document>,
    avg_doc_length: f64,
    idf: HashMap<String, f64>,
}

fn stopwords() -> &'static HashSet<&'static str> {
    static STOPWORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOPWORDS.get_or_init(|| {
        [
            "a", "an", "the", "and", "or", "for", "with", "that", "from", "this", "in", "on",
            "at", "to", "of", "by", "is", "are", "be", "me", "my", "i", "you", "your", "it",
            "its", "show", "find", "get", "some", "any", "please", "want", "need", "looking",
        ]
        .into_iter()
        .collect()
    })
}

/// Lowercased alphanumeric terms without stopwords
pub fn tokenize(text: &str) -> Vec<String> {
    let stopwords = stopwords();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty() && !stopwords.contains(term))
        .map(str::to_string)
        .collect()
}

impl Bm25Index {
    /// Build and finalize an index over `documents`
    pub fn build<S: AsRef<str>>(documents: &[S]) -> Self {
        let documents: Vec<Document> = documents
            .iter()
            .map(|text| {
                let terms = tokenize(text.as_ref());
                let length = terms.len();
                let mut freq = HashMap::new();
                for term in terms {
                    *freq.entry(term).or_insert(0) += 1;
                }
                Document {
                    terms: freq,
                    length,
                }
            })
            .collect();

        let mut index = Self {
            documents,
            avg_doc_length: 0.0,
            idf: HashMap::new(),
        };
        index.finalize();
        index
    }

    fn finalize(&mut self) {
        if self.documents.is_empty() {
            return;
        }

        let total_length: usize = self.documents.iter().map(|d| d.length).sum();
        self.avg_doc_length = total_length as f64 / self.documents.len() as f64;

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for doc in &self.documents {
            for term in doc.terms.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let num_docs = self.documents.len() as f64;
        self.idf = doc_freq
            .into_iter()
            .map(|(term, df)| {
                let df = df as f64;
                (term.to_string(), ((num_docs - df + 0.5) / (df + 0.5)).ln_1p())
            })
            .collect();
    }

    /// Raw BM25 score of every document, in insertion order
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let query_terms = tokenize(query);
        self.documents
            .iter()
            .map(|doc| self.score_document(doc, &query_terms))
            .collect()
    }

    fn score_document(&self, doc: &Document, query_terms: &[String]) -> f64 {
        if doc.length == 0 || self.avg_doc_length == 0.0 {
            return 0.0;
        }

        let doc_len_norm = doc.length as f64 / self.avg_doc_length;
        query_terms
            .iter()
            .filter_map(|term| {
                let tf = *doc.terms.get(term)? as f64;
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                let numerator = tf * (K1 + 1.0);
                let denominator = K1.mul_add(B.mul_add(doc_len_norm, 1.0 - B), tf);
                Some(idf * (numerator / denominator))
            })
            .sum()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stopwords_and_punctuation() {
        assert_eq!(
            tokenize("Find me the best running-shoes, please!"),
            vec!["best", "running", "shoes"]
        );
    }

    #[test]
    fn test_matching_document_scores_higher() {
        let index = Bm25Index::build(&[
            "Nike Pegasus running shoes",
            "Leather office chair",
            "Trail running jacket",
        ]);
        let scores = index.scores("running shoes");
        assert!(scores[0] > scores[2]);
        assert!(scores[2] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn test_single_and_empty_documents() {
        let index = Bm25Index::build(&["hotel"]);
        assert!(index.scores("hotel")[0] > 0.0);

        let index = Bm25Index::build(&[""]);
        assert_eq!(index.scores("hotel"), vec![0.0]);

        let index = Bm25Index::build::<&str>(&[]);
        assert!(index.is_empty());
        assert!(index.scores("hotel").is_empty());
    }
}
