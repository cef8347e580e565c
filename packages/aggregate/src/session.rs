//! Last-request-wins execution for interactive callers.
//!
//! Every parameter edit submits a new request. Each submission takes the
//! next generation number; a run whose generation is no longer the latest
//! when it finishes is discarded, and runs still in progress stop at the
//! next stage boundary. The session holds the only shared mutable state:
//! the latest applied bundle and the palette overrides.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hexmap_aggregate_models::{Bundle, Color, Point};
use tokio::sync::{Mutex, RwLock};

use crate::AggregateError;
use crate::bins::BinGeneration;
use crate::palette::{PaletteOverrides, assign};
use crate::pipeline::{Pipeline, PipelineRequest};
use crate::progress::{NullProgress, ProgressCallback};

/// What happened to a submitted request.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run finished while still the latest request and its bundle is
    /// now current.
    Applied(Arc<Bundle>),
    /// A newer request arrived first. Nothing was applied.
    Superseded {
        /// Generation of the discarded request.
        generation: u64,
    },
}

impl RunOutcome {
    /// The applied bundle, if any.
    #[must_use]
    pub const fn bundle(&self) -> Option<&Arc<Bundle>> {
        match self {
            Self::Applied(bundle) => Some(bundle),
            Self::Superseded { .. } => None,
        }
    }
}

/// A point set plus the latest bundle computed from it.
pub struct PipelineSession {
    pipeline: Arc<Pipeline>,
    points: Arc<Vec<Point>>,
    generation: Arc<AtomicU64>,
    latest: RwLock<Option<Arc<Bundle>>>,
    overrides: Mutex<PaletteOverrides>,
    progress: Arc<dyn ProgressCallback>,
}

impl PipelineSession {
    #[must_use]
    pub fn new(pipeline: Pipeline, points: Vec<Point>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            points: Arc::new(points),
            generation: Arc::new(AtomicU64::new(0)),
            latest: RwLock::new(None),
            overrides: Mutex::new(PaletteOverrides::new()),
            progress: NullProgress::shared(),
        }
    }

    /// Reports run progress to `progress` instead of discarding it.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Number of points the session aggregates.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// The most recently applied bundle.
    pub async fn latest(&self) -> Option<Arc<Bundle>> {
        self.latest.read().await.clone()
    }

    /// Current palette overrides.
    pub async fn overrides(&self) -> PaletteOverrides {
        self.overrides.lock().await.clone()
    }

    /// Runs `request` immediately.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error if the run fails while still the latest
    /// request. The previous bundle stays current.
    pub async fn submit(&self, request: PipelineRequest) -> Result<RunOutcome, AggregateError> {
        let generation = self.next_generation();
        self.execute(generation, request).await
    }

    /// Waits `delay`, then runs `request` unless another request was
    /// submitted in the meantime.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub async fn submit_debounced(
        &self,
        request: PipelineRequest,
        delay: Duration,
    ) -> Result<RunOutcome, AggregateError> {
        let generation = self.next_generation();
        tokio::time::sleep(delay).await;

        if !self.is_current(generation) {
            log::debug!("Request {generation} superseded during debounce");
            return Ok(RunOutcome::Superseded { generation });
        }

        self.execute(generation, request).await
    }

    /// Sets a color override and recolors the latest bundle in place of
    /// re-running the pipeline. Returns the recolored bundle.
    ///
    /// A run still in progress picks the override up when it is applied.
    pub async fn set_override(
        &self,
        label: impl Into<String>,
        color: Color,
    ) -> Option<Arc<Bundle>> {
        self.overrides.lock().await.set(label, color);
        self.recolor_latest().await
    }

    /// Removes a color override and recolors the latest bundle.
    pub async fn clear_override(&self, label: &str) -> Option<Arc<Bundle>> {
        self.overrides.lock().await.remove(label);
        self.recolor_latest().await
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn execute(
        &self,
        generation: u64,
        request: PipelineRequest,
    ) -> Result<RunOutcome, AggregateError> {
        let overrides = self.overrides.lock().await.clone();
        let pipeline = self.pipeline.clone();
        let points = self.points.clone();
        let counter = self.generation.clone();
        let progress = self.progress.clone();

        log::debug!("Starting run {generation}");

        let result = tokio::task::spawn_blocking(move || {
            let is_cancelled = || counter.load(Ordering::SeqCst) != generation;
            pipeline.run_with(&points, &request, &overrides, progress.as_ref(), &is_cancelled)
        })
        .await
        .map_err(|e| AggregateError::Computation {
            message: format!("pipeline worker failed: {e}"),
        })?;

        let mut bundle = match result {
            Ok(bundle) => bundle,
            Err(AggregateError::Cancelled { stage }) => {
                log::debug!("Run {generation} cancelled before {stage}");
                return Ok(RunOutcome::Superseded { generation });
            }
            Err(_) if !self.is_current(generation) => {
                return Ok(RunOutcome::Superseded { generation });
            }
            Err(e) => return Err(e),
        };

        let mut latest = self.latest.write().await;
        if !self.is_current(generation) {
            log::debug!("Run {generation} finished after a newer request; discarding");
            return Ok(RunOutcome::Superseded { generation });
        }

        {
            // Overrides may have changed while the run was in the worker
            let mut overrides = self.overrides.lock().await;
            overrides.reconcile(
                BinGeneration {
                    step: bundle.metadata.bin_step,
                    count: bundle.metadata.bin_count,
                },
                &bundle.metadata.bin_labels,
            );
            self.recolor(&mut bundle, &overrides);
        }

        let bundle = Arc::new(bundle);
        *latest = Some(bundle.clone());
        log::info!(
            "Applied run {generation}: {} cells from {} points",
            bundle.metadata.cell_count,
            bundle.metadata.total_points_out
        );

        Ok(RunOutcome::Applied(bundle))
    }

    /// Lock order is `latest`, then `overrides`, as in [`Self::execute`].
    async fn recolor_latest(&self) -> Option<Arc<Bundle>> {
        let mut latest = self.latest.write().await;
        let mut bundle = Bundle::clone(latest.as_ref()?);

        let overrides = self.overrides.lock().await;
        self.recolor(&mut bundle, &overrides);
        drop(overrides);

        let bundle = Arc::new(bundle);
        *latest = Some(bundle.clone());
        Some(bundle)
    }

    fn recolor(&self, bundle: &mut Bundle, overrides: &PaletteOverrides) {
        let config = self.pipeline.config();
        let palette = assign(
            &bundle.metadata.bin_labels,
            overrides.colors(),
            config.palette_start,
            config.palette_end,
        );

        for feature in &mut bundle.features {
            if let Some(entry) = palette.get(feature.bin_index) {
                feature.color = entry.color;
            }
        }
        bundle.palette = palette;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;

    use hexmap_aggregate_models::{BoundingBox, GroupBy};
    use hexmap_spatial::Region;
    use tokio::sync::Notify;

    use super::*;
    use crate::config::PipelineConfig;

    /// Parks the worker of the first run at one point until released.
    struct Gate {
        at_done: bool,
        held: AtomicBool,
        reached: Notify,
        release: std::sync::Mutex<mpsc::Receiver<()>>,
    }

    impl Gate {
        /// Parks at the first stage, or after the last stage if `at_done`.
        fn new(at_done: bool) -> (Arc<Self>, mpsc::Sender<()>) {
            let (tx, rx) = mpsc::channel();
            let gate = Arc::new(Self {
                at_done,
                held: AtomicBool::new(false),
                reached: Notify::new(),
                release: std::sync::Mutex::new(rx),
            });
            (gate, tx)
        }

        fn hold(&self) {
            if !self.held.swap(true, Ordering::SeqCst) {
                self.reached.notify_one();
                let _ = self.release.lock().unwrap().recv();
            }
        }
    }

    impl ProgressCallback for Gate {
        fn begin(&self, _total: Option<u64>) {}

        fn step(&self, _label: &str) {
            if !self.at_done {
                self.hold();
            }
        }

        fn advance(&self, _count: u64) {}

        fn done(&self, _summary: &str) {
            if self.at_done {
                self.hold();
            }
        }
    }

    fn points() -> Vec<Point> {
        let mut points = vec![Point::new(50.0, 50.0), Point::new(-10.0, -10.0)];
        // 25 points in one spot so bins past the first are populated
        points.extend((0..25).map(|_| Point::new(10.0, 10.0)));
        points.push(Point::new(15.0, 5.0));
        points
    }

    fn request(resolution: u8, bin_count: u32) -> PipelineRequest {
        PipelineRequest {
            region: Region::bounding_box(BoundingBox::new(20.0, 0.0, 20.0, 0.0)).unwrap(),
            resolution,
            bin_step: 10,
            bin_count,
            group_by: GroupBy::None,
        }
    }

    fn session() -> PipelineSession {
        PipelineSession::new(Pipeline::new(PipelineConfig::default()).unwrap(), points())
    }

    #[tokio::test]
    async fn submit_applies_bundle() {
        let session = session();
        assert!(session.latest().await.is_none());

        let outcome = session.submit(request(5, 3)).await.unwrap();
        let applied = outcome.bundle().unwrap().clone();
        assert_eq!(applied.metadata.total_points_out, 26);
        assert_eq!(session.latest().await.unwrap(), applied);
    }

    #[tokio::test]
    async fn debounced_request_is_superseded_by_newer_one() {
        let session = session();

        let (first, second) = tokio::join!(
            session.submit_debounced(request(4, 3), Duration::from_millis(50)),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                session.submit(request(6, 3)).await
            }
        );

        assert!(matches!(
            first.unwrap(),
            RunOutcome::Superseded { generation: 1 }
        ));
        assert!(matches!(second.unwrap(), RunOutcome::Applied(_)));
        assert_eq!(session.latest().await.unwrap().metadata.resolution, 6);
    }

    #[tokio::test]
    async fn failed_run_keeps_previous_bundle() {
        let session = session();
        session.submit(request(5, 3)).await.unwrap();

        let err = session.submit(request(5, 0)).await.unwrap_err();
        assert!(matches!(err, AggregateError::InvalidBinParameters { .. }));

        let latest = session.latest().await.unwrap();
        assert_eq!(latest.metadata.bin_count, 3);
    }

    #[tokio::test]
    async fn bin_change_drops_orphaned_overrides() {
        let session = session();
        session.submit(request(5, 3)).await.unwrap();

        let red = Color::rgb(255, 0, 0);
        let blue = Color::rgb(0, 0, 255);
        session.set_override("1\u{2013}10", red).await;
        session.set_override("21+", blue).await;

        let outcome = session.submit(request(5, 2)).await.unwrap();
        let bundle = outcome.bundle().unwrap();
        assert_eq!(bundle.metadata.bin_labels, vec!["1\u{2013}10", "11+"]);
        assert_eq!(bundle.color_for("1\u{2013}10"), Some(red));

        let overrides = session.overrides().await;
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides.get("21+"), None);
    }

    #[tokio::test]
    async fn override_recolors_latest_without_rerun() {
        let session = session();
        assert!(session.set_override("21+", Color::rgb(1, 2, 3)).await.is_none());

        session.submit(request(5, 3)).await.unwrap();
        let recolored = session
            .set_override("21+", Color::rgb(9, 9, 9))
            .await
            .unwrap();

        let busy = recolored
            .features
            .iter()
            .find(|f| f.count == 25)
            .unwrap();
        assert_eq!(busy.bin_label, "21+");
        assert_eq!(busy.color, Color::rgb(9, 9, 9));

        let cleared = session.clear_override("21+").await.unwrap();
        assert!(!cleared.palette[2].overridden);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn running_request_is_cancelled_by_newer_submit() {
        let (gate, release) = Gate::new(false);
        let session = session().with_progress(gate.clone());

        let (first, second) = tokio::join!(session.submit(request(4, 3)), async {
            gate.reached.notified().await;
            let outcome = session.submit(request(6, 3)).await;
            release.send(()).unwrap();
            outcome
        });

        assert!(matches!(
            first.unwrap(),
            RunOutcome::Superseded { generation: 1 }
        ));
        assert!(matches!(second.unwrap(), RunOutcome::Applied(_)));
        assert_eq!(session.latest().await.unwrap().metadata.resolution, 6);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_finishing_after_newer_request_is_discarded() {
        let (gate, release) = Gate::new(true);
        let session = session().with_progress(gate.clone());

        let (first, second) = tokio::join!(session.submit(request(4, 3)), async {
            gate.reached.notified().await;
            let outcome = session.submit(request(6, 2)).await;
            release.send(()).unwrap();
            outcome
        });

        assert!(matches!(
            first.unwrap(),
            RunOutcome::Superseded { generation: 1 }
        ));
        assert!(matches!(second.unwrap(), RunOutcome::Applied(_)));
        let latest = session.latest().await.unwrap();
        assert_eq!(latest.metadata.resolution, 6);
        assert_eq!(latest.metadata.bin_count, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn override_set_during_run_is_applied() {
        let (gate, release) = Gate::new(false);
        let session = session().with_progress(gate.clone());
        let red = Color::rgb(255, 0, 0);

        let (outcome, recolored) = tokio::join!(session.submit(request(5, 3)), async {
            gate.reached.notified().await;
            let recolored = session.set_override("1\u{2013}10", red).await;
            release.send(()).unwrap();
            recolored
        });

        assert!(recolored.is_none());
        let applied = outcome.unwrap().bundle().unwrap().clone();
        assert_eq!(applied.color_for("1\u{2013}10"), Some(red));
        assert!(applied.palette[0].overridden);
        let single = applied.features.iter().find(|f| f.count == 1).unwrap();
        assert_eq!(single.color, red);

        assert_eq!(session.latest().await.unwrap(), applied);
        assert_eq!(session.overrides().await.get("1\u{2013}10"), Some(red));
    }
}
