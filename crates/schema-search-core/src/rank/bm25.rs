//! Okapi BM25 lexical index over chunk token sequences.
//!
//! Scoring for a document `d` and query `q`:
//!
//! ```text
//! score(d, q) = Σ_{t ∈ q} idf(t) × tf(t,d) × (k1 + 1)
//!                                  ───────────────────────────────────────
//!                                  tf(t,d) + k1 × (1 − b + b × |d| / avgdl)
//! idf(t)      = ln((N − n(t) + 0.5) / (n(t) + 0.5))
//! ```
//!
//! Terms present in more than half of the documents get a negative IDF;
//! those are replaced by `idf_floor × mean(idf)` so common terms still
//! contribute a small positive amount.

use std::collections::HashMap;

/// Tuning parameters for [`Bm25Index`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization strength in `[0, 1]`.
    pub b: f64,
    /// Fraction of the mean IDF assigned to terms with negative IDF.
    pub idf_floor: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            idf_floor: 0.25,
        }
    }
}

/// Lowercase and split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

/// Inverted term statistics for a fixed corpus of token sequences.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    params: Bm25Params,
    doc_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avgdl: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Index {
    pub fn build(corpus: &[Vec<String>], params: Bm25Params) -> Self {
        let mut doc_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lens = Vec::with_capacity(corpus.len());
        let mut containing: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0usize;

        for doc in corpus {
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in doc {
                *tf.entry(token.clone()).or_default() += 1;
            }
            for term in tf.keys() {
                *containing.entry(term.clone()).or_default() += 1;
            }
            total_len += doc.len();
            doc_lens.push(doc.len());
            doc_freqs.push(tf);
        }

        let n = corpus.len() as f64;
        let avgdl = if corpus.is_empty() {
            0.0
        } else {
            total_len as f64 / n
        };

        let mut idf: HashMap<String, f64> = HashMap::with_capacity(containing.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, df) in containing {
            let df = f64::from(df);
            let value = ((n - df + 0.5) / (df + 0.5)).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term, value);
        }
        if !idf.is_empty() {
            let floor = params.idf_floor * idf_sum / idf.len() as f64;
            for term in negative {
                idf.insert(term, floor);
            }
        }

        Self {
            params,
            doc_freqs,
            doc_lens,
            avgdl,
            idf,
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Raw BM25 score of every document, in corpus order.
    ///
    /// Repeated query tokens count once per occurrence. Unknown tokens
    /// contribute nothing; an empty query yields all zeros.
    pub fn scores(&self, query: &[String]) -> Vec<f64> {
        let Bm25Params { k1, b, .. } = self.params;
        let mut out = vec![0.0; self.len()];

        for q in query {
            let Some(&idf) = self.idf.get(q) else {
                continue;
            };
            for (i, tf_map) in self.doc_freqs.iter().enumerate() {
                let tf = f64::from(tf_map.get(q).copied().unwrap_or(0));
                if tf == 0.0 {
                    continue;
                }
                let len_ratio = if self.avgdl > 0.0 {
                    self.doc_lens[i] as f64 / self.avgdl
                } else {
                    1.0
                };
                out[i] += idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * len_ratio));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(texts: &[&str]) -> Vec<Vec<String>> {
        texts.iter().map(|t| tokenize(t)).collect()
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("  Customer\tNames\nAND emails "),
            vec!["customer", "names", "and", "emails"]
        );
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_matching_document_scores_highest() {
        let idx = Bm25Index::build(
            &corpus(&[
                "order totals and dates",
                "customer names and emails",
                "order line items",
            ]),
            Bm25Params::default(),
        );
        let s = idx.scores(&tokenize("customer email"));
        assert!(s[1] > 0.0);
        assert_eq!(s[0], 0.0);
        assert_eq!(s[2], 0.0);
    }

    #[test]
    fn test_idf_matches_okapi_formula() {
        // "customer" appears in 1 of 3 docs, all docs have 4 tokens (len_ratio = 1).
        let idx = Bm25Index::build(
            &corpus(&["a b c customer", "a b c d", "a b c e"]),
            Bm25Params::default(),
        );
        let s = idx.scores(&tokenize("customer"));
        let idf = (2.5f64 / 1.5).ln();
        // tf=1: (1 * 2.5) / (1 + 1.5) = 1.0
        assert!((s[0] - idf).abs() < 1e-9, "got {}", s[0]);
    }

    #[test]
    fn test_common_terms_get_floored_idf() {
        let idx = Bm25Index::build(
            &corpus(&["shared a1 a2", "shared b1 b2", "shared c1 c2"]),
            Bm25Params::default(),
        );
        let s = idx.scores(&tokenize("shared"));
        // ln(0.5/3.5) < 0 for "shared", so it is floored to a positive value.
        assert!(s.iter().all(|v| *v > 0.0));
        assert!((s[0] - s[1]).abs() < 1e-12);
    }

    #[test]
    fn test_empty_query_and_unknown_terms() {
        let idx = Bm25Index::build(&corpus(&["alpha beta", "gamma"]), Bm25Params::default());
        assert_eq!(idx.scores(&[]), vec![0.0, 0.0]);
        assert_eq!(idx.scores(&tokenize("delta")), vec![0.0, 0.0]);
    }

    #[test]
    fn test_empty_corpus_and_empty_documents() {
        let idx = Bm25Index::build(&[], Bm25Params::default());
        assert!(idx.is_empty());
        assert!(idx.scores(&tokenize("anything")).is_empty());

        let idx = Bm25Index::build(&corpus(&["", ""]), Bm25Params::default());
        assert_eq!(idx.scores(&tokenize("anything")), vec![0.0, 0.0]);
    }

    #[test]
    fn test_shorter_documents_score_higher() {
        let idx = Bm25Index::build(
            &corpus(&[
                "invoice",
                "invoice with many other words padding length here",
                "unrelated",
                "also unrelated",
                "still unrelated",
            ]),
            Bm25Params::default(),
        );
        let s = idx.scores(&tokenize("invoice"));
        assert!(s[0] > s[1]);
    }
}
