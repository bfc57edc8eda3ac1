use crate::report::influx_reporter_base::InfluxReporterBase;
use crate::report::{ReportCollector, ReportMetric};
use crate::{CheckRecord, OperationRecord};
use anyhow::Context;
use influxdb::{Query, WriteQuery};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Write metrics to disk in the InfluxDB line protocol format.
/// Metrics can then be sent to InfluxDB by Telegraf.
pub struct InfluxFileReportCollector {
    inner: InfluxReporterBase,
}

impl InfluxFileReportCollector {
    pub fn new(
        runtime: &Runtime,
        dir: PathBuf,
        scenario_name: String,
        run_id: String,
    ) -> anyhow::Result<Self> {
        let file = open_metrics_file(&dir, &scenario_name, &run_id)?;

        let flush_complete = Arc::new(AtomicBool::new(false));
        let (join_handle, writer) =
            start_metrics_file_write_task(runtime, file, flush_complete.clone());

        Ok(Self {
            inner: InfluxReporterBase::new(join_handle, writer, flush_complete),
        })
    }
}

impl ReportCollector for InfluxFileReportCollector {
    fn add_operation(&mut self, operation_record: &OperationRecord) {
        self.inner.add_operation(operation_record);
    }

    fn add_check(&mut self, check: &CheckRecord) {
        self.inner.add_check(check);
    }

    fn add_custom(&mut self, metric: ReportMetric) {
        self.inner.add_custom(metric);
    }

    fn finalize(&mut self) {
        self.inner.finalize();
    }
}

fn open_metrics_file(dir: &Path, scenario_name: &str, run_id: &str) -> anyhow::Result<std::fs::File> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create metrics directory {}", dir.display()))?;

    let path = dir.join(format!("{}-{}.influx", scenario_name, run_id));
    std::fs::File::options()
        .create_new(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("Failed to create metrics file {}", path.display()))
}

fn start_metrics_file_write_task(
    runtime: &Runtime,
    file: std::fs::File,
    flush_complete: Arc<AtomicBool>,
) -> (JoinHandle<()>, UnboundedSender<WriteQuery>) {
    let (writer, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    let join_handle = runtime.spawn(async move {
        let mut file = BufWriter::new(File::from_std(file));
        let mut written = 0usize;

        // The channel closes when the reporter is finalized.
        while let Some(query) = receiver.recv().await {
            if let Err(e) = write_query(&mut file, query).await {
                log::warn!("Failed to write metric to file: {:?}", e);
            }
            written += 1;
        }

        if let Err(e) = file.flush().await {
            log::error!("Failed to flush metrics file: {:?}", e);
        }

        log::debug!("Wrote {} metrics to file", written);

        // Signal the 'finalize' method that the write task has finished.
        flush_complete.store(true, Ordering::Relaxed);
    });

    (join_handle, writer)
}

#[inline]
async fn write_query<W>(writer: &mut W, query: WriteQuery) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let query_str = query.build()?.get();
    writer.write_all(query_str.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{report_operation, Reporter};

    #[test]
    fn writes_line_protocol_on_finalize() {
        let runtime = Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let collector = InfluxFileReportCollector::new(
            &runtime,
            dir.path().to_path_buf(),
            "api_info_highload".to_string(),
            "abc".to_string(),
        )
        .unwrap();
        let reporter = Arc::new(Reporter::with_collectors(vec![Box::new(collector)]));

        let result: Result<(), ()> = Ok(());
        let mut record = OperationRecord::new("http_get".to_string());
        record.add_attr("status", 200);
        report_operation(reporter.clone(), record, &result);
        reporter.add_check(&CheckRecord::new("status was 200", true));
        reporter.add_custom(ReportMetric::new("vus").with_field("active", 5i64));
        reporter.finalize();

        let content =
            std::fs::read_to_string(dir.path().join("api_info_highload-abc.influx")).unwrap();
        let lines = content.lines().collect::<Vec<_>>();

        assert_eq!(3, lines.len());
        assert!(lines[0].starts_with("gust.instruments.operation_duration,"));
        assert!(lines[0].contains("operation_id=http_get"));
        assert!(lines[0].contains("status=200"));
        assert!(lines[1].starts_with("gust.instruments.check,"));
        assert!(lines[2].starts_with("gust.custom.vus"));
    }

    #[test]
    fn refuses_to_overwrite_existing_metrics_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("s-run.influx"), "").unwrap();

        assert!(open_metrics_file(dir.path(), "s", "run").is_err());
    }
}
