//! Human-readable and JSON renderings of tuning history.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::history::GenResult;
use crate::knob::KnobId;
use crate::knob_set::KnobSet;

/// One explored version: knob values by name plus its measurement.
#[derive(Debug, Clone, Serialize)]
pub struct VersionRecord {
    pub config: BTreeMap<String, Value>,
    pub feedback: Value,
}

#[derive(Debug, Serialize)]
struct StatsReport<'a> {
    versions: &'a [VersionRecord],
}

pub fn version_record<M: ?Sized>(knobs: &KnobSet<M>, result: &GenResult) -> VersionRecord {
    let label = |id: KnobId| {
        knobs
            .name_of(id)
            .map_or_else(|| id.to_string(), str::to_string)
    };

    let mut config = BTreeMap::new();
    for (id, value) in result.config.int_values() {
        config.insert(label(id), Value::from(value));
    }
    for (id, setting) in result.config.loop_values() {
        config.insert(
            label(id),
            serde_json::to_value(setting).unwrap_or(Value::Null),
        );
    }

    VersionRecord {
        config,
        feedback: result.feedback.report(),
    }
}

pub fn version_records<M: ?Sized>(knobs: &KnobSet<M>, results: &[GenResult]) -> Vec<VersionRecord> {
    results
        .iter()
        .map(|result| version_record(knobs, result))
        .collect()
}

pub fn write_best(out: &mut dyn Write, best: Option<&VersionRecord>) -> io::Result<()> {
    writeln!(out, "\n---------- best config ----------")?;
    match best {
        Some(record) => {
            serde_json::to_writer_pretty(&mut *out, record)?;
            writeln!(out)
        }
        None => writeln!(out, "<no configs generated yet>\n"),
    }
}

/// Write `{"versions": [...]}` with `records` already in best-first order.
pub fn write_stats(out: &mut dyn Write, records: &[VersionRecord]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, &StatsReport { versions: records })?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::ExecutionTime;
    use crate::knob::{LoopKnob, LoopSetting, ScalarKnob};
    use crate::knob_config::KnobConfig;
    use std::sync::Arc;

    #[test]
    fn test_record_uses_knob_names() {
        let mut knobs: KnobSet<()> = KnobSet::new();
        let unroll = knobs
            .add_int(ScalarKnob::new("unroll", 1, 1, 8, |_, _| {}))
            .unwrap();
        let body = knobs
            .add_loop(LoopKnob::new("body", vec![], |_, _| {}))
            .unwrap();

        let config = KnobConfig::builder()
            .int(unroll, 4)
            .loop_setting(body, LoopSetting::vectorized(8))
            .build();
        let result = GenResult::new(
            Arc::new(config),
            Arc::new(ExecutionTime::from_samples([0.25])),
        );

        let record = version_record(&knobs, &result);
        assert_eq!(record.config["unroll"], Value::from(4));
        assert_eq!(record.config["body"]["vectorize_width"], Value::from(8));
        assert_eq!(record.feedback["mean"], Value::from(0.25));
    }

    #[test]
    fn test_empty_best_message() {
        let mut out = Vec::new();
        write_best(&mut out, None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("best config"));
        assert!(text.contains("<no configs generated yet>"));
    }

    #[test]
    fn test_stats_shape() {
        let records = vec![VersionRecord {
            config: BTreeMap::new(),
            feedback: Value::Null,
        }];
        let mut out = Vec::new();
        write_stats(&mut out, &records).unwrap();

        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["versions"].as_array().map(Vec::len), Some(1));
    }
}
