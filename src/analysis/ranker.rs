use crate::taint::{TaintConfiguration, TaintFlow};
use serde::{Deserialize, Serialize};

/// Weights for the risk formula:
/// `w1·sensitivity + w2·sink_severity + w3·implicit − w4·path_len`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RankWeights {
    pub sensitivity: f64,
    pub sink_severity: f64,
    pub implicit_bonus: f64,
    pub path_cost: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            sensitivity: 3.0,
            sink_severity: 2.0,
            implicit_bonus: 1.5,
            path_cost: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedFlow {
    pub risk_score: f64,
    pub flow: TaintFlow,
}

pub struct RiskRanker {
    weights: RankWeights,
}

impl RiskRanker {
    pub fn new(weights: RankWeights) -> Self {
        Self { weights }
    }

    /// Score and order flows: risk descending, then shorter paths, then
    /// source name.
    pub fn rank(&self, flows: Vec<TaintFlow>, config: &TaintConfiguration) -> Vec<RankedFlow> {
        let mut ranked: Vec<RankedFlow> = flows
            .into_iter()
            .map(|flow| RankedFlow {
                risk_score: self.score(&flow, config),
                flow,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.risk_score
                .total_cmp(&a.risk_score)
                .then_with(|| a.flow.path.len().cmp(&b.flow.path.len()))
                .then_with(|| a.flow.source_name.cmp(&b.flow.source_name))
        });
        ranked
    }

    fn score(&self, flow: &TaintFlow, config: &TaintConfiguration) -> f64 {
        let sensitivity = flow.sensitivity.score();
        let severity = config
            .sink(&flow.sink_name)
            .and_then(|s| s.cwe_id.as_deref())
            .map(cwe_severity)
            .unwrap_or(1.0);
        let implicit = if flow.implicit { 1.0 } else { 0.0 };
        let path_len = flow.path.len() as f64;

        self.weights.sensitivity * sensitivity
            + self.weights.sink_severity * severity
            + self.weights.implicit_bonus * implicit
            - self.weights.path_cost * path_len
    }
}

/// Severity bucket for a sink's CWE class.
fn cwe_severity(cwe: &str) -> f64 {
    match cwe {
        // code / command execution and deserialization
        "CWE-78" | "CWE-89" | "CWE-94" | "CWE-502" => 3.0,
        // injection into interpreters / path traversal
        "CWE-79" | "CWE-22" | "CWE-918" => 2.0,
        _ => 1.5,
    }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taint::{Sensitivity, SinkSpec, SourceSpec};

    fn flow(source: &str, sink: &str, path_len: usize, implicit: bool) -> TaintFlow {
        TaintFlow {
            source_name: source.to_string(),
            sink_name: sink.to_string(),
            path: (0..path_len).map(|i| format!("v_{i}")).collect(),
            implicit,
            sensitivity: Sensitivity::infer(source),
            sanitizers_crossed: vec![],
        }
    }

    fn config(sinks: Vec<SinkSpec>) -> TaintConfiguration {
        TaintConfiguration {
            sources: vec![SourceSpec::named("source")],
            sinks,
            sanitizers: vec![],
        }
    }

    #[test]
    fn implicit_outranks_identical_explicit() {
        let cfg = config(vec![SinkSpec::named("sink")]);
        let ranker = RiskRanker::new(RankWeights::default());
        let ranked = ranker.rank(
            vec![flow("source", "sink", 3, false), flow("source", "sink", 3, true)],
            &cfg,
        );
        assert!(ranked[0].flow.implicit);
        assert!(ranked[0].risk_score > ranked[1].risk_score);
    }

    #[test]
    fn short_sensitive_beats_long_mundane() {
        let cfg = config(vec![SinkSpec::named("exec"), SinkSpec::named("print")]);
        let ranker = RiskRanker::new(RankWeights::default());
        let ranked = ranker.rank(
            vec![
                flow("user_input", "print", 4, false),
                flow("secret_source", "exec", 2, false),
            ],
            &cfg,
        );
        assert_eq!(ranked[0].flow.source_name, "secret_source");
    }

    #[test]
    fn known_cwe_raises_the_score() {
        let with_cwe = config(vec![SinkSpec::with_cwe("sink", "CWE-78")]);
        let without = config(vec![SinkSpec::named("sink")]);
        let ranker = RiskRanker::new(RankWeights::default());

        let high = ranker.rank(vec![flow("source", "sink", 2, false)], &with_cwe);
        let low = ranker.rank(vec![flow("source", "sink", 2, false)], &without);
        assert!(high[0].risk_score > low[0].risk_score);
    }

    #[test]
    fn ties_break_on_path_length_then_source() {
        let cfg = config(vec![SinkSpec::named("sink")]);
        let ranker = RiskRanker::new(RankWeights {
            path_cost: 0.0,
            ..RankWeights::default()
        });
        let ranked = ranker.rank(
            vec![
                flow("mystery_b", "sink", 5, false),
                flow("mystery_a", "sink", 5, false),
                flow("mystery_a", "sink", 2, false),
            ],
            &cfg,
        );
        assert_eq!(ranked[0].flow.path.len(), 2);
        assert_eq!(ranked[1].flow.source_name, "mystery_a");
        assert_eq!(ranked[2].flow.source_name, "mystery_b");
    }

    #[test]
    fn longer_paths_rank_lower() {
        let cfg = config(vec![SinkSpec::named("sink")]);
        let ranker = RiskRanker::new(RankWeights::default());
        let ranked = ranker.rank(
            vec![flow("source", "sink", 8, false), flow("source", "sink", 1, false)],
            &cfg,
        );
        assert_eq!(ranked[0].flow.path.len(), 1);
    }
}
