use metrics::histogram;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, instrument};

use crate::app::ports::{RecordSink, RowSource};
use crate::error::Result;
use crate::pipeline::normalize::EntityNormalizer;
use crate::types::{RecordCounts, Timetable};

/// Summary reported at the end of every successful extraction
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub rows: usize,
    pub counts: RecordCounts,
}

/// Use case for turning a wide-format row source into linked record sets
/// and handing them to a sink
pub struct NormalizeUseCase {
    source: Box<dyn RowSource>,
    normalizer: EntityNormalizer,
    sink: Box<dyn RecordSink>,
}

impl NormalizeUseCase {
    pub fn new(source: Box<dyn RowSource>, normalizer: EntityNormalizer, sink: Box<dyn RecordSink>) -> Self {
        Self {
            source,
            normalizer,
            sink,
        }
    }

    /// Read, normalize, link and write. Nothing reaches the sink unless every pass succeeds.
    #[instrument(skip_all, fields(source = %self.source.describe()))]
    pub fn run(&self) -> Result<(Timetable, RunSummary)> {
        let started = Instant::now();

        let rows = self.source.read_rows()?;
        let timetable = self.normalizer.normalize(&rows)?;
        self.sink.write(&timetable)?;

        histogram!("timetable_normalize_duration_seconds").record(started.elapsed().as_secs_f64());

        let summary = RunSummary {
            source: self.source.describe(),
            rows: rows.len(),
            counts: timetable.counts(),
        };
        info!("Extraction complete: {:?}", summary.counts);
        Ok((timetable, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimetableError;
    use crate::pipeline::normalize::NormalizeOptions;
    use crate::types::RawRow;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct StaticRows(Vec<RawRow>);

    impl RowSource for StaticRows {
        fn read_rows(&self) -> Result<Vec<RawRow>> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    #[derive(Clone, Default)]
    struct MockSink {
        written: Arc<Mutex<Vec<Timetable>>>,
    }

    impl RecordSink for MockSink {
        fn write(&self, timetable: &Timetable) -> Result<()> {
            self.written.lock().unwrap().push(timetable.clone());
            Ok(())
        }
    }

    fn use_case(rows: serde_json::Value, sink: MockSink) -> NormalizeUseCase {
        let rows = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_object().unwrap().clone())
            .collect();
        NormalizeUseCase::new(
            Box::new(StaticRows(rows)),
            EntityNormalizer::new(NormalizeOptions::default()),
            Box::new(sink),
        )
    }

    #[test]
    fn test_run_writes_linked_timetable_and_reports_counts() {
        let sink = MockSink::default();
        let (timetable, summary) = use_case(
            json!([
                {"Place": "A", "2": "0700", "2_1": "0800"},
                {"Place": "B", "2": "0710", "2_1": "-"}
            ]),
            sink.clone(),
        )
        .run()
        .unwrap();

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.counts.services, 1);
        assert_eq!(summary.counts.trips, 2);
        assert_eq!(summary.counts.stop_times, 4);

        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].is_linked());
        assert_eq!(written[0], timetable);
    }

    #[test]
    fn test_structural_error_produces_no_output() {
        let sink = MockSink::default();
        let err = use_case(json!([{"Stop": "A", "1": "0600"}]), sink.clone())
            .run()
            .unwrap_err();

        assert!(matches!(err, TimetableError::MissingLocationColumn(_)));
        assert!(sink.written.lock().unwrap().is_empty());
    }
}
