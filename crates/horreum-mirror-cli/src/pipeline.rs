use horreum_mirror_source::{DatasetSource, ListQuery, list_datasets};
use horreum_mirror_store::Sink;
use horreum_mirror_types::{MirrorRecord, to_record};
use tracing::{debug, info, instrument};

use crate::MirrorResult;

/// Records buffered before each write to the sink.
pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub datasets: usize,
    pub batches: usize,
    /// Rows that were new to the sink. Replays of known datasets do not count.
    pub inserted: u64,
}

/// Streams datasets from `source` into `sink` in fixed-size batches.
///
/// The run is strictly sequential: each dataset's label values are fetched
/// before the next summary is pulled. Any error ends the run; batches already
/// written stay written, and re-running from the same page is safe because
/// the sink skips known natural keys.
pub struct MirrorPipeline<'a, S: DatasetSource + ?Sized, K: Sink + ?Sized> {
    source: &'a S,
    sink: &'a mut K,
    batch_size: usize,
}

impl<'a, S: DatasetSource + ?Sized, K: Sink + ?Sized> MirrorPipeline<'a, S, K> {
    pub fn new(source: &'a S, sink: &'a mut K) -> Self {
        Self {
            source,
            sink,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Ensures the schema, mirrors everything `query` lists, then closes the sink.
    #[instrument(skip_all, fields(test_id = query.test_id, start_page = query.start_page))]
    pub fn run(self, query: ListQuery) -> MirrorResult<MirrorReport> {
        let Self {
            source,
            sink,
            batch_size,
        } = self;

        sink.ensure_schema()?;

        let mut report = MirrorReport::default();
        let mut buffer: Vec<MirrorRecord> = Vec::with_capacity(batch_size);
        for summary in list_datasets(source, query) {
            let summary = summary?;
            let label_values = source.fetch_label_values(summary.id)?;
            let record = to_record(&summary, label_values)?;
            debug!(
                dataset_id = record.dataset_id,
                labels = record.label_values.len(),
                start = %record.start,
                "Collected labels for dataset"
            );
            buffer.push(record);
            report.datasets += 1;

            if buffer.len() >= batch_size {
                flush(sink, &mut buffer, &mut report)?;
            }
        }

        if !buffer.is_empty() {
            flush(sink, &mut buffer, &mut report)?;
        }
        sink.close()?;

        info!(
            datasets = report.datasets,
            batches = report.batches,
            inserted = report.inserted,
            "Mirror run finished"
        );
        Ok(report)
    }
}

fn flush<K: Sink + ?Sized>(
    sink: &mut K,
    buffer: &mut Vec<MirrorRecord>,
    report: &mut MirrorReport,
) -> MirrorResult<()> {
    let inserted = sink.insert_batch(buffer.as_slice())?;
    debug!(
        rows = buffer.len(),
        inserted, "Flushed batch (duplicates ignored)"
    );
    buffer.clear();
    report.batches += 1;
    report.inserted += inserted;
    Ok(())
}
