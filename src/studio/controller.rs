//! Generation request lifecycle.
//!
//! [`GenerationController`] runs one generation attempt at a time: it
//! validates the parameters against the model catalog, tears down any
//! previous session, ticks a simulated progress estimate while the request
//! is in flight, races the request against the configured timeout and
//! supersession, and reconciles the response into a [`GenerationResult`].
//!
//! Presentation is decoupled: every UI-visible change is published as a
//! [`ControllerEvent`] on a [`tokio::sync::broadcast`] channel and folded
//! into a [`ViewState`] snapshot. Events from a session that is no longer
//! the latest started are dropped, so a superseded request can never touch
//! the view.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::GenerationSettings,
    error::{Result, StudioError},
    models::{ControllerEvent, GenerationResult, ModelCatalog, RequestParams, SessionId, ViewState},
    studio::{progress::ProgressEstimator, reconcile::reconcile, transport::Transport},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How a submission ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed(GenerationResult),
    /// A newer submission (or [`GenerationController::cancel`]) took over;
    /// whatever this session produced was discarded.
    Superseded(SessionId),
}

impl SubmitOutcome {
    pub fn into_result(self) -> Option<GenerationResult> {
        match self {
            SubmitOutcome::Completed(result) => Some(result),
            SubmitOutcome::Superseded(_) => None,
        }
    }
}

/// The single live session: its progress ticker and cancellation token.
struct ActiveSession {
    id: SessionId,
    cancel: CancellationToken,
    ticker: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn shutdown(self) {
        self.cancel.cancel();
        if let Some(ticker) = self.ticker {
            ticker.abort();
        }
    }
}

struct ControllerInner {
    transport: Arc<dyn Transport>,
    catalog: ModelCatalog,
    settings: GenerationSettings,
    next_session: AtomicU64,
    latest: AtomicU64,
    active: Mutex<Option<ActiveSession>>,
    view: Mutex<ViewState>,
    events: broadcast::Sender<ControllerEvent>,
}

#[derive(Clone)]
pub struct GenerationController {
    inner: Arc<ControllerInner>,
}

impl GenerationController {
    pub fn new(
        transport: Arc<dyn Transport>,
        catalog: ModelCatalog,
        settings: GenerationSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ControllerInner {
                transport,
                catalog,
                settings,
                next_session: AtomicU64::new(1),
                latest: AtomicU64::new(0),
                active: Mutex::new(None),
                view: Mutex::new(ViewState::default()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.inner.events.subscribe()
    }

    pub fn view(&self) -> ViewState {
        lock(&self.inner.view).clone()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.inner.catalog
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.inner.settings
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.inner.active).is_some()
    }

    /// Abandons the in-flight session, if any. Its result will be ignored
    /// and the view returns to idle.
    pub fn cancel(&self) {
        let inner = &self.inner;
        if let Some(session) = lock(&inner.active).take() {
            log::info!("Cancelling generation session {}", session.id);
            let tombstone = inner.next_session.fetch_add(1, Ordering::SeqCst);
            inner.latest.fetch_max(tombstone, Ordering::SeqCst);
            let cancelled = session.id;
            session.shutdown();

            let event = ControllerEvent::Cancelled { session: cancelled };
            lock(&inner.view).apply(&event);
            let _ = inner.events.send(event);
        }
    }

    /// Runs one generation attempt end to end.
    ///
    /// Any previous session is torn down first. Validation failures return
    /// before any network activity.
    pub async fn submit(&self, params: RequestParams) -> Result<SubmitOutcome> {
        let inner = &self.inner;
        let id = inner.next_session.fetch_add(1, Ordering::SeqCst);

        inner.latest.fetch_max(id, Ordering::SeqCst);
        if let Some(previous) = lock(&inner.active).take() {
            log::info!("Session {} superseded by session {}", previous.id, id);
            previous.shutdown();
        }

        if let Err(e) = params.check_requirements(&inner.catalog) {
            log::warn!("Session {} rejected: {}", id, e);
            inner.publish(ControllerEvent::Failed {
                session: id,
                message: e.user_message(),
                timed_out: false,
            });
            return Err(e);
        }

        let body = params.to_body()?;
        let cancel = CancellationToken::new();
        {
            let mut active = lock(&inner.active);
            // A concurrent submit may have started after us.
            if !inner.is_latest(id) {
                return Ok(SubmitOutcome::Superseded(id));
            }
            let stale = active.replace(ActiveSession {
                id,
                cancel: cancel.clone(),
                ticker: None,
            });
            if let Some(stale) = stale {
                stale.shutdown();
            }
        }
        let _guard = SessionGuard {
            inner: Arc::clone(inner),
            id,
        };
        inner.publish(ControllerEvent::Started { session: id });
        let ticker = inner.spawn_ticker(id, params.num_steps, cancel.clone());
        if let Some(session) = lock(&inner.active).as_mut().filter(|s| s.id == id) {
            session.ticker = Some(ticker);
        } else {
            ticker.abort();
        }

        log::info!(
            "Session {}: generating {} image(s) with {} ({} steps)",
            id,
            params.num_outputs,
            params.model,
            params.num_steps
        );

        let started = Instant::now();
        let timeout = inner.settings.request_timeout;
        let response = tokio::select! {
            _ = cancel.cancelled() => None,
            res = tokio::time::timeout(timeout, inner.transport.post_json("/", &body, "image/*")) => Some(res),
        };
        let elapsed = started.elapsed();

        let response = match response {
            None => {
                log::debug!("Session {} discarded after cancellation", id);
                return Ok(SubmitOutcome::Superseded(id));
            }
            Some(Err(_)) => {
                log::warn!("Session {} timed out after {:?}", id, timeout);
                Err(StudioError::TimeoutError(timeout.as_millis() as u64))
            }
            Some(Ok(res)) => res,
        };

        if !inner.is_latest(id) {
            log::debug!("Session {} resolved late, result ignored", id);
            return Ok(SubmitOutcome::Superseded(id));
        }

        let outcome = response.and_then(|raw| reconcile(raw, &params, elapsed, &inner.catalog));
        inner.finish(id);

        match outcome {
            Ok(result) => {
                log::info!(
                    "Session {} succeeded: {} image(s) in {:.2}s, {} it/s",
                    id,
                    result.images.len(),
                    result.stats.effective_seconds(),
                    result.stats.throughput
                );
                inner.publish(ControllerEvent::Succeeded {
                    session: id,
                    result: Box::new(result.clone()),
                });
                inner.schedule_hide(id);
                Ok(SubmitOutcome::Completed(result))
            }
            Err(e) => {
                log::error!("Session {} failed: {}", id, e);
                inner.publish(ControllerEvent::Failed {
                    session: id,
                    message: e.user_message(),
                    timed_out: e.is_timeout(),
                });
                Err(e)
            }
        }
    }
}

impl ControllerInner {
    fn is_latest(&self, id: SessionId) -> bool {
        self.latest.load(Ordering::SeqCst) == id
    }

    /// Session events reach the view and subscribers only through here.
    fn publish(&self, event: ControllerEvent) {
        if !self.is_latest(event.session()) {
            return;
        }
        lock(&self.view).apply(&event);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Clears the session slot if it still belongs to `id`. Returns whether
    /// it did.
    fn finish(&self, id: SessionId) -> bool {
        let mut active = lock(&self.active);
        if active.as_ref().map_or(false, |s| s.id == id) {
            if let Some(session) = active.take() {
                session.shutdown();
                return true;
            }
        }
        false
    }

    fn spawn_ticker(
        self: &Arc<Self>,
        id: SessionId,
        num_steps: u32,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let mut estimator = ProgressEstimator::new(num_steps, &self.settings);
        let period = self.settings.poll_interval.max(MIN_POLL_INTERVAL);

        tokio::spawn(async move {
            let started = Instant::now();
            let mut ticks = tokio::time::interval_at(started + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticks.tick() => {
                        if let Some(percent) = estimator.observe(started.elapsed()) {
                            // Hold the slot so a tick cannot land after the
                            // session resolved.
                            let active = lock(&inner.active);
                            if active.as_ref().map_or(false, |s| s.id == id) {
                                inner.publish(ControllerEvent::Progress { session: id, percent });
                            }
                        }
                    }
                }
            }
        })
    }

    fn schedule_hide(self: &Arc<Self>, id: SessionId) {
        let inner = Arc::clone(self);
        let delay = self.settings.hide_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.publish(ControllerEvent::ProgressHidden { session: id });
        });
    }
}

/// Releases the session slot when a `submit` future is dropped before it
/// resolved. Every normal exit has already cleared the slot by then.
struct SessionGuard {
    inner: Arc<ControllerInner>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.inner.finish(self.id) {
            log::info!("Session {} abandoned by its caller", self.id);
            self.inner
                .publish(ControllerEvent::Cancelled { session: self.id });
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeneratedImages, ModelDescriptor, StatusKind};
    use crate::studio::testing::{Reply, ScriptedTransport};
    use crate::studio::transport::RawResponse;
    use serde_json::json;

    fn catalog() -> ModelCatalog {
        ModelCatalog::new(vec![
            ModelDescriptor::new("sdxl", "SDXL"),
            ModelDescriptor::new("img2img", "Img2Img").requiring_image(),
        ])
    }

    fn params(prompt: &str, model: &str) -> RequestParams {
        RequestParams {
            password: Some("pw".into()),
            prompt: prompt.into(),
            negative_prompt: String::new(),
            model: model.into(),
            width: 768,
            height: 512,
            num_steps: 20,
            guidance: 7.5,
            seed: 99,
            num_outputs: 1,
            image_url: None,
            mask_url: None,
        }
    }

    fn png() -> RawResponse {
        RawResponse::new(200)
            .with_header("content-type", "image/png")
            .with_body(vec![0x89, b'P', b'N', b'G'])
    }

    fn controller(transport: &Arc<ScriptedTransport>) -> GenerationController {
        GenerationController::new(transport.clone(), catalog(), GenerationSettings::default())
    }

    async fn wait_for_calls(transport: &ScriptedTransport, path: &str, n: usize) {
        while transport.calls_to(path) < n {
            tokio::task::yield_now().await;
        }
    }

    fn drain(rx: &mut broadcast::Receiver<ControllerEvent>) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn validation_failure_issues_no_request() {
        let transport = Arc::new(ScriptedTransport::new());
        let controller = controller(&transport);

        let mut missing_image = params("a portrait", "img2img");
        missing_image.image_url = Some(String::new());
        let err = controller.submit(missing_image).await.unwrap_err();

        assert!(matches!(err, StudioError::ValidationError(_)));
        assert_eq!(transport.total_calls(), 0);
        assert!(!controller.is_busy());
        let view = controller.view();
        assert_eq!(view.progress, None);
        assert_eq!(view.status.unwrap().kind, StatusKind::Error);
    }

    #[tokio::test]
    async fn unknown_model_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        let err = controller(&transport)
            .submit(params("x", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::ValidationError(_)));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_monotonic_capped_and_completes_at_100() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply_after("/", Duration::from_secs(30), png());
        let controller = controller(&transport);
        let mut rx = controller.subscribe();

        let outcome = controller.submit(params("a lighthouse", "sdxl")).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Completed(_)));

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(ControllerEvent::Started { .. })));
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ControllerEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert!(!percents.is_empty());
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
        assert!(percents.iter().all(|p| *p <= 95));
        assert_eq!(percents.last(), Some(&95));
        assert!(matches!(events.last(), Some(ControllerEvent::Succeeded { .. })));

        let view = controller.view();
        assert_eq!(view.progress, Some(100));
        assert!(!view.busy);
        assert!(!controller.is_busy());

        tokio::time::sleep(Duration::from_millis(801)).await;
        assert_eq!(controller.view().progress, None);
        assert!(matches!(
            drain(&mut rx).last(),
            Some(ControllerEvent::ProgressHidden { .. })
        ));
    }

    #[tokio::test]
    async fn newer_submission_supersedes_pending_one() {
        let transport = Arc::new(ScriptedTransport::new());
        let gate = transport.gate("/");
        transport.reply(
            "/",
            RawResponse::json(200, &json!({ "images": ["data:image/png;base64,AAAA"] })),
        );
        let controller = controller(&transport);

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.submit(params("first", "sdxl")).await })
        };
        wait_for_calls(&transport, "/", 1).await;

        let second = controller.submit(params("second", "sdxl")).await.unwrap();
        assert!(matches!(second, SubmitOutcome::Completed(_)));

        // Session 1 resolves only after session 2 finished.
        let _ = gate.send(png());
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, SubmitOutcome::Superseded(_)));

        let view = controller.view();
        let shown = view.result.expect("second result shown");
        assert_eq!(shown.params.prompt, "second");
        assert!(matches!(shown.images, GeneratedImages::Gallery(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_request_times_out() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/", Reply::Never);
        let controller = controller(&transport);
        let mut rx = controller.subscribe();

        let err = controller.submit(params("slow", "sdxl")).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, StudioError::TimeoutError(60_000)));

        let failed = drain(&mut rx)
            .into_iter()
            .find(|e| matches!(e, ControllerEvent::Failed { .. }))
            .unwrap();
        assert!(matches!(failed, ControllerEvent::Failed { timed_out: true, .. }));

        let view = controller.view();
        assert_eq!(view.progress, None);
        assert!(view.result.is_none());
        assert!(view.status.unwrap().text.contains("timed out"));
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(
            "/",
            Reply::Ready(Err(StudioError::NetworkError("connection refused".into()))),
        );
        let err = controller(&transport)
            .submit(params("x", "sdxl"))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::NetworkError(_)));
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn server_error_resets_view() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(
            "/",
            RawResponse::json(500, &json!({ "error": "GPU busy", "details": "retry later" })),
        );
        let controller = controller(&transport);

        let err = controller.submit(params("x", "sdxl")).await.unwrap_err();
        assert_eq!(err.user_message(), "GPU busy (retry later)");

        let view = controller.view();
        assert!(view.result.is_none());
        assert!(view.params_panel.is_empty());
        assert_eq!(view.status.unwrap().text, "GPU busy (retry later)");
    }

    #[tokio::test]
    async fn cancel_discards_in_flight_session() {
        let transport = Arc::new(ScriptedTransport::new());
        let _gate = transport.gate("/");
        let controller = controller(&transport);

        let pending = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.submit(params("x", "sdxl")).await })
        };
        wait_for_calls(&transport, "/", 1).await;
        assert!(controller.is_busy());

        controller.cancel();
        let outcome = pending.await.unwrap().unwrap();
        assert!(matches!(outcome, SubmitOutcome::Superseded(_)));
        assert!(!controller.is_busy());
        assert_eq!(controller.view(), ViewState::default());
    }

    #[tokio::test]
    async fn sent_params_match_displayed_panel() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply("/", png());
        let controller = controller(&transport);

        let mut sent = params("a castle at dusk", "img2img");
        sent.image_url = Some("http://example.com/in.png".into());
        controller.submit(sent.clone()).await.unwrap();

        let body = transport.posted_bodies("/").pop().unwrap();
        assert_eq!(body["password"], "pw");
        assert!(body.get("mask_url").is_none());

        let view = controller.view();
        let rebuilt = RequestParams::from_panel(&view.params_panel).unwrap();
        assert_eq!(rebuilt, sent.without_password());
        let mut on_wire: RequestParams = serde_json::from_value(body).unwrap();
        on_wire.password = None;
        assert_eq!(rebuilt, on_wire);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_submit_releases_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/", Reply::Never);
        let controller = controller(&transport);
        let mut rx = controller.subscribe();

        let abandoned =
            tokio::time::timeout(Duration::from_secs(5), controller.submit(params("x", "sdxl"))).await;
        assert!(abandoned.is_err());

        assert!(!controller.is_busy());
        assert_eq!(controller.view(), ViewState::default());
        assert!(matches!(
            drain(&mut rx).last(),
            Some(ControllerEvent::Cancelled { .. })
        ));

        // The ticker is gone: nothing more arrives.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(controller.view().progress, None);
    }

    #[tokio::test]
    async fn completed_submit_publishes_no_cancellation() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply("/", png());
        let controller = controller(&transport);
        let mut rx = controller.subscribe();

        controller.submit(params("x", "sdxl")).await.unwrap();
        assert!(drain(&mut rx)
            .iter()
            .all(|e| !matches!(e, ControllerEvent::Cancelled { .. })));
    }

    #[tokio::test]
    async fn rendered_state_never_carries_password() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply("/", png());
        let controller = controller(&transport);
        let mut rx = controller.subscribe();

        let mut sent = params("x", "sdxl");
        sent.password = Some("hunter2".into());
        controller.submit(sent).await.unwrap();

        assert_eq!(transport.posted_bodies("/")[0]["password"], "hunter2");
        let view = serde_json::to_string(&controller.view()).unwrap();
        assert!(!view.contains("hunter2"));
        for event in drain(&mut rx) {
            assert!(!serde_json::to_string(&event).unwrap().contains("hunter2"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_poll_interval_still_completes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply_after("/", Duration::from_millis(50), png());
        let settings = GenerationSettings::default().with_poll_interval(Duration::ZERO);
        let controller = GenerationController::new(transport.clone(), catalog(), settings);

        let outcome = controller.submit(params("x", "sdxl")).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Completed(_)));
        assert_eq!(controller.view().progress, Some(100));
    }
}
