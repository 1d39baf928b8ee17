use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::models::artifact::{Artifact, MediaFormat};
use crate::models::error::TranscodeError;
use crate::traits::transcoder::{Transcoder, TranscoderRuntime};
use crate::transcode::job::{TranscodeJob, TranscodeStatus};

struct RuntimeSlot<R> {
    runtime: R,
    loaded: bool,
}

/// Drives a `TranscoderRuntime` one job at a time.
///
/// The runtime is loaded lazily on first use. A failed load is retried on
/// the next job. A job arriving while another is in flight is rejected with
/// `TranscodeError::Busy` rather than queued.
///
/// Every job writes its input, converts it, reads the output back, and
/// deletes both working files whatever the outcome, so the namespace is
/// empty between jobs.
pub struct TranscodePipeline<R: TranscoderRuntime> {
    slot: tokio::sync::Mutex<RuntimeSlot<R>>,
    last_job: Mutex<Option<TranscodeJob>>,
    next_id: AtomicU64,
}

impl<R: TranscoderRuntime> TranscodePipeline<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            slot: tokio::sync::Mutex::new(RuntimeSlot { runtime, loaded: false }),
            last_job: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Whether a job currently holds the runtime.
    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Snapshot of the most recently started job.
    pub fn last_job(&self) -> Option<TranscodeJob> {
        self.last_job.lock().clone()
    }

    fn record(&self, job: &TranscodeJob) {
        *self.last_job.lock() = Some(job.clone());
    }
}

impl<R: TranscoderRuntime> RuntimeSlot<R> {
    async fn ensure_loaded(&mut self) -> Result<(), TranscodeError> {
        if self.loaded {
            return Ok(());
        }
        match self.runtime.load().await {
            Ok(()) => {
                log::info!("transcoder runtime loaded");
                self.loaded = true;
                Ok(())
            }
            Err(TranscodeError::Init(msg)) => Err(TranscodeError::Init(msg)),
            Err(e) => Err(TranscodeError::Init(e.to_string())),
        }
    }

    async fn convert(&mut self, job: &TranscodeJob, input: &Artifact) -> Result<Artifact, TranscodeError> {
        let input_name = job.input_name();
        let output_name = job.output_name();

        let result = self.write_run_read(job, input, &input_name, &output_name).await;

        for name in [&input_name, &output_name] {
            // The output is absent when the run failed before writing it.
            if let Err(e) = self.runtime.delete_file(name).await {
                log::debug!("transcode job {}: cleanup of {} skipped: {}", job.id, name, e);
            }
        }
        result
    }

    async fn write_run_read(
        &mut self,
        job: &TranscodeJob,
        input: &Artifact,
        input_name: &str,
        output_name: &str,
    ) -> Result<Artifact, TranscodeError> {
        self.runtime.write_file(input_name, input.data()).await?;
        self.runtime.run(input_name, output_name, job.target).await?;
        let data = self.runtime.read_file(output_name).await?;
        Ok(Artifact::new(data, job.target))
    }
}

#[async_trait]
impl<R: TranscoderRuntime + 'static> Transcoder for TranscodePipeline<R> {
    async fn transcode(&self, input: &Artifact, target: MediaFormat) -> Result<Artifact, TranscodeError> {
        let mut slot = self.slot.try_lock().map_err(|_| {
            log::warn!("transcode to {} rejected: another job is running", target);
            TranscodeError::Busy
        })?;

        let mut job = TranscodeJob::new(self.next_id.fetch_add(1, Ordering::Relaxed), input, target);
        self.record(&job);

        if let Err(e) = slot.ensure_loaded().await {
            log::error!("transcoder runtime failed to load: {}", e);
            job.status = TranscodeStatus::Failed(e.clone());
            self.record(&job);
            return Err(e);
        }

        job.status = TranscodeStatus::Running;
        self.record(&job);
        log::info!(
            "transcode job {}: {} → {} ({} bytes)",
            job.id,
            job.source,
            job.target,
            job.input_len
        );

        let result = slot.convert(&job, input).await;
        job.status = match &result {
            Ok(output) => {
                log::info!("transcode job {} finished ({} bytes)", job.id, output.len());
                TranscodeStatus::Succeeded(output.clone())
            }
            Err(e) => {
                log::error!("transcode job {} failed: {}", job.id, e);
                TranscodeStatus::Failed(e.clone())
            }
        };
        self.record(&job);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{webm_payload, MemoryRuntime};
    use bytes::Bytes;
    use std::time::Duration;

    fn webm(len: usize) -> Artifact {
        Artifact::new(webm_payload(len), MediaFormat::Webm)
    }

    #[tokio::test]
    async fn converts_webm_to_mp4() {
        let runtime = MemoryRuntime::new();
        let pipeline = TranscodePipeline::new(runtime.clone());
        let input = webm(25);

        let output = pipeline.transcode(&input, MediaFormat::Mp4).await.unwrap();

        assert_eq!(output.mime_type(), "video/mp4");
        assert!(!output.is_empty());
        assert_eq!(&output.data()[4..8], b"ftyp");
        assert_eq!(input.len(), 25);
        assert_eq!(runtime.file_count(), 0);

        let job = pipeline.last_job().unwrap();
        assert_eq!(job.input_len, 25);
        assert!(matches!(job.status, TranscodeStatus::Succeeded(_)));
        assert!(job.status.is_finished());
    }

    #[tokio::test]
    async fn runtime_is_loaded_once() {
        let runtime = MemoryRuntime::new();
        let pipeline = TranscodePipeline::new(runtime.clone());

        pipeline.transcode(&webm(10), MediaFormat::Mp4).await.unwrap();
        pipeline.transcode(&webm(10), MediaFormat::Mp4).await.unwrap();

        assert_eq!(runtime.load_count(), 1);
        assert_eq!(runtime.run_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_job_is_rejected_as_busy() {
        let runtime = MemoryRuntime::new().with_run_delay(Duration::from_millis(50));
        let pipeline = TranscodePipeline::new(runtime.clone());
        let first_input = webm(25);
        let second_input = webm(30);

        let (first, second) = tokio::join!(
            pipeline.transcode(&first_input, MediaFormat::Mp4),
            pipeline.transcode(&second_input, MediaFormat::Mp4),
        );

        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), TranscodeError::Busy);
        assert!(pipeline.last_job().unwrap().status.is_finished());
        assert_eq!(runtime.run_count(), 1);
        assert_eq!(runtime.file_count(), 0);
        assert!(!pipeline.is_busy());
    }

    #[tokio::test]
    async fn invalid_input_fails_and_pipeline_stays_usable() {
        let runtime = MemoryRuntime::new();
        let pipeline = TranscodePipeline::new(runtime.clone());
        let garbage = Artifact::new(Bytes::from_static(b"not a media file"), MediaFormat::Webm);

        let err = pipeline.transcode(&garbage, MediaFormat::Mp4).await.unwrap_err();

        assert!(matches!(err, TranscodeError::Failed(_)));
        assert_eq!(garbage.data().as_ref(), b"not a media file");
        assert_eq!(garbage.mime_type(), "video/webm");
        assert_eq!(runtime.file_count(), 0);
        assert!(matches!(
            pipeline.last_job().unwrap().status,
            TranscodeStatus::Failed(_)
        ));

        assert!(pipeline.transcode(&webm(12), MediaFormat::Mp4).await.is_ok());
    }

    #[tokio::test]
    async fn failed_load_is_retried_on_next_job() {
        let runtime = MemoryRuntime::new().failing_loads(1);
        let pipeline = TranscodePipeline::new(runtime.clone());
        let input = webm(8);

        let err = pipeline.transcode(&input, MediaFormat::Mp4).await.unwrap_err();
        assert!(matches!(err, TranscodeError::Init(_)));
        assert_eq!(runtime.run_count(), 0);

        pipeline.transcode(&input, MediaFormat::Mp4).await.unwrap();
        assert_eq!(runtime.load_count(), 2);
    }

    #[tokio::test]
    async fn job_names_are_unique() {
        let runtime = MemoryRuntime::new();
        let pipeline = TranscodePipeline::new(runtime);

        pipeline.transcode(&webm(4), MediaFormat::Mp4).await.unwrap();
        let first = pipeline.last_job().unwrap();
        pipeline.transcode(&webm(4), MediaFormat::Mp4).await.unwrap();
        let second = pipeline.last_job().unwrap();

        assert_ne!(first.input_name(), second.input_name());
        assert_eq!(second.input_name(), format!("job-{}-input.webm", second.id));
        assert_eq!(second.output_name(), format!("job-{}-output.mp4", second.id));
    }
}
