//! Per-frame orchestration.
//!
//! Three execution contexts, connected by channels:
//!
//! - the **frame worker** takes camera frames from a bounded queue, converts
//!   them to the detector's pixel format and submits them, strictly one at a
//!   time; when the queue is full new frames are dropped (or the producer
//!   blocks, if it asks to);
//! - the **landmark router** receives detector results on whatever thread
//!   the detector delivers them, maps the fingertip into screen space and
//!   forwards pointer updates, discarding anything older than what it has
//!   already forwarded;
//! - the **scene actor** is the single owner of the render surface and the
//!   interaction state; everything that changes the scene arrives as a
//!   [`UiMessage`].

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, Sender, SyncSender, TryRecvError, TrySendError},
        Arc, PoisonError, RwLock,
    },
    thread::{self, JoinHandle},
};

use log::{debug, error, info, warn};

use crate::{
    camera::{BgraConverter, CameraFrame, PixelFormat},
    detector::{DetectorOutput, FrameId, LandmarkDetector},
    error::{PipelineError, SceneError},
    scene::SceneSurface,
    session_config::SessionConfig,
    systems::{interaction::InteractionSystem, position_remapping::CoordinateMapper},
    tracking::{fingertip_location, LandmarkOrientation, ScreenPoint, Size},
};

/// Everything the scene actor reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum UiMessage {
    Layout(Size),
    /// Fingertip position computed from the given frame
    Pointer { frame_id: FrameId, point: ScreenPoint },
    /// Drag gesture on the view
    Drag(ScreenPoint),
    Tap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued(FrameId),
    /// The worker was busy and the queue full
    Dropped,
}

/// Producer side of the bounded frame queue; cheap to clone.
#[derive(Clone)]
pub struct FrameSender {
    queue: SyncSender<(FrameId, CameraFrame)>,
    next_id: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    /// Queue a frame without waiting; the frame is dropped if the queue is full
    pub fn submit(&self, frame: CameraFrame) -> Result<Submission, PipelineError> {
        let frame_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        match self.queue.try_send((frame_id, frame)) {
            Ok(()) => Ok(Submission::Queued(frame_id)),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Worker busy; dropped frame {}", frame_id);
                Ok(Submission::Dropped)
            }
            Err(TrySendError::Disconnected(_)) => Err(PipelineError::Disconnected),
        }
    }

    /// Queue a frame, waiting for room if the worker is busy
    pub fn submit_blocking(&self, frame: CameraFrame) -> Result<FrameId, PipelineError> {
        let frame_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.queue
            .send((frame_id, frame))
            .map_err(|_| PipelineError::Disconnected)?;
        Ok(frame_id)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn frame_queue(capacity: usize) -> (FrameSender, Receiver<(FrameId, CameraFrame)>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (
        FrameSender {
            queue: tx,
            next_id: Arc::new(AtomicU64::new(1)),
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

/// Turns detector results into pointer updates for the scene actor
pub struct LandmarkRouter {
    mapper: Arc<RwLock<CoordinateMapper>>,
    fingertip_index: usize,
    orientation: LandmarkOrientation,
    last_forwarded: Option<FrameId>,
}

impl LandmarkRouter {
    pub fn new(
        mapper: Arc<RwLock<CoordinateMapper>>,
        fingertip_index: usize,
        orientation: LandmarkOrientation,
    ) -> Self {
        LandmarkRouter {
            mapper,
            fingertip_index,
            orientation,
            last_forwarded: None,
        }
    }

    pub fn route(&mut self, output: DetectorOutput) -> Option<UiMessage> {
        match output {
            DetectorOutput::Landmarks {
                frame_id,
                landmarks,
            } => {
                if self.last_forwarded.is_some_and(|last| frame_id <= last) {
                    debug!("Discarding stale landmarks from frame {}", frame_id);
                    return None;
                }
                let Some(location) =
                    fingertip_location(&landmarks, self.fingertip_index, self.orientation)
                else {
                    debug!(
                        "Frame {} has {} landmarks; no fingertip at index {}",
                        frame_id,
                        landmarks.len(),
                        self.fingertip_index
                    );
                    return None;
                };
                let mapped = self
                    .mapper
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .to_screen(location);
                let Some(point) = mapped else {
                    debug!("No layout yet; skipping frame {}", frame_id);
                    return None;
                };
                self.last_forwarded = Some(frame_id);
                Some(UiMessage::Pointer { frame_id, point })
            }
            DetectorOutput::PixelBuffer { .. } => None,
        }
    }
}

fn run_worker<D: LandmarkDetector>(
    frames: Receiver<(FrameId, CameraFrame)>,
    converter: BgraConverter,
    mut detector: D,
) -> Result<(), PipelineError> {
    while let Ok((frame_id, frame)) = frames.recv() {
        let converted = converter.convert(&frame.pixel_buffer).map_err(|e| {
            error!("Frame {} could not be converted: {}", frame_id, e);
            e
        })?;
        detector.process_frame(frame_id, &converted).map_err(|e| {
            error!("Detector failed on frame {}: {}", frame_id, e);
            e
        })?;
    }
    debug!("Frame queue closed; worker finished");
    Ok(())
}

fn run_router(
    outputs: Receiver<DetectorOutput>,
    mut router: LandmarkRouter,
    ui: Sender<UiMessage>,
) {
    while let Ok(output) = outputs.recv() {
        if let Some(message) = router.route(output) {
            if ui.send(message).is_err() {
                warn!("Scene actor gone; landmark router stopping");
                break;
            }
        }
    }
    debug!("Detector output closed; router finished");
}

pub struct FramePipeline {
    frames: FrameSender,
    ui: Sender<UiMessage>,
    mapper: Arc<RwLock<CoordinateMapper>>,
    worker: JoinHandle<Result<(), PipelineError>>,
    router: JoinHandle<()>,
}

impl FramePipeline {
    /// Check the pixel formats, start the detector and spawn the worker and
    /// router. Returns the receiving end that the scene actor consumes.
    pub fn start<D: LandmarkDetector + 'static>(
        config: &SessionConfig,
        source_format: PixelFormat,
        mut detector: D,
    ) -> Result<(FramePipeline, Receiver<UiMessage>), PipelineError> {
        let required_format = detector.required_format();
        let converter = BgraConverter::new(source_format, required_format)?;

        let (detector_tx, detector_rx) = mpsc::channel();
        detector.start(detector_tx)?;

        let (frames, frame_rx) = frame_queue(config.frame_queue_capacity);
        let (ui_tx, ui_rx) = mpsc::channel();
        let mapper = Arc::new(RwLock::new(CoordinateMapper::new(config.video_format)));

        let worker = thread::Builder::new()
            .name(String::from("frame-worker"))
            .spawn(move || run_worker(frame_rx, converter, detector))
            .map_err(|_| PipelineError::Spawn("frame-worker"))?;

        let router = LandmarkRouter::new(
            mapper.clone(),
            config.fingertip_index,
            config.landmark_orientation,
        );
        let router_ui = ui_tx.clone();
        let router = thread::Builder::new()
            .name(String::from("landmark-router"))
            .spawn(move || run_router(detector_rx, router, router_ui))
            .map_err(|_| PipelineError::Spawn("landmark-router"))?;

        info!(
            "Frame pipeline started; {:?} -> {:?}, queue capacity {}",
            source_format, required_format, config.frame_queue_capacity
        );

        Ok((
            FramePipeline {
                frames,
                ui: ui_tx,
                mapper,
                worker,
                router,
            },
            ui_rx,
        ))
    }

    pub fn frame_sender(&self) -> FrameSender {
        self.frames.clone()
    }

    /// For gesture input (taps, drags) from the view layer
    pub fn ui_sender(&self) -> Sender<UiMessage> {
        self.ui.clone()
    }

    /// Layout pass finished; must happen before pointer updates can be mapped
    pub fn update_viewport(&self, viewport: Size) {
        self.mapper
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .update_viewport(viewport);
        if self.ui.send(UiMessage::Layout(viewport)).is_err() {
            warn!("Scene actor gone; layout not delivered");
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.frames.dropped_frames()
    }

    /// Close the frame queue and wait for queued work to drain. Other
    /// `FrameSender` clones must be dropped first, or this waits forever.
    pub fn shutdown(self) -> Result<(), PipelineError> {
        let FramePipeline {
            frames,
            ui,
            worker,
            router,
            ..
        } = self;
        let dropped = frames.dropped_frames();
        drop(frames);
        drop(ui);

        let result = worker
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("frame-worker"))?;
        router
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("landmark-router"))?;
        info!("Frame pipeline stopped; {} frames dropped", dropped);
        result
    }
}

/// Sole owner of the render surface. Runs on the UI/render thread.
pub struct SceneActor<S: SceneSurface> {
    surface: S,
    interaction: InteractionSystem,
    last_pointer_frame: Option<FrameId>,
}

impl<S: SceneSurface> SceneActor<S> {
    pub fn new(config: &SessionConfig, mut surface: S) -> Result<Self, SceneError> {
        let interaction = InteractionSystem::new(config, &mut surface)?;
        Ok(SceneActor {
            surface,
            interaction,
            last_pointer_frame: None,
        })
    }

    pub fn handle(&mut self, message: UiMessage) -> Result<(), SceneError> {
        match message {
            UiMessage::Layout(viewport) => {
                self.surface.update_viewport(viewport);
                Ok(())
            }
            UiMessage::Pointer { frame_id, point } => {
                if self.last_pointer_frame.is_some_and(|last| frame_id <= last) {
                    debug!("Ignoring pointer from stale frame {}", frame_id);
                    return Ok(());
                }
                self.last_pointer_frame = Some(frame_id);
                self.interaction.handle_pointer(point, &mut self.surface)
            }
            UiMessage::Drag(point) => self.interaction.handle_drag(point, &mut self.surface),
            UiMessage::Tap => self.interaction.handle_tap(&mut self.surface),
        }
    }

    /// Handle messages until every sender has gone away
    pub fn run(mut self, messages: Receiver<UiMessage>) -> Result<Self, SceneError> {
        for message in messages.iter() {
            self.handle(message).map_err(|e| {
                error!("Scene update failed: {}", e);
                e
            })?;
        }
        debug!("All UI message senders closed");
        Ok(self)
    }

    /// Handle whatever is queued right now; for hosts with their own render loop
    pub fn drain(&mut self, messages: &Receiver<UiMessage>) -> Result<usize, SceneError> {
        let mut handled = 0;
        loop {
            match messages.try_recv() {
                Ok(message) => {
                    self.handle(message)?;
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    return Ok(handled);
                }
            }
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn interaction(&self) -> &InteractionSystem {
        &self.interaction
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        camera::PixelBuffer,
        scene::{HeadlessScene, Notification},
        tracking::{ImageResolution, Landmark, ScreenRect, INDEX_FINGER_TIP},
    };

    fn frame() -> CameraFrame {
        CameraFrame {
            pixel_buffer: PixelBuffer::ycbcr_filled(2, 2, 128, 128, 128),
            capture_timestamp: Duration::ZERO,
            video_format: ImageResolution::new(1200, 1000),
        }
    }

    fn hand(x: f32, y: f32) -> DetectorOutput {
        let mut landmarks = vec![Landmark::new(0., 0.); INDEX_FINGER_TIP + 1];
        landmarks[INDEX_FINGER_TIP] = Landmark::new(x, y);
        DetectorOutput::Landmarks {
            frame_id: 0,
            landmarks,
        }
    }

    fn with_frame(output: DetectorOutput, id: FrameId) -> DetectorOutput {
        match output {
            DetectorOutput::Landmarks { landmarks, .. } => DetectorOutput::Landmarks {
                frame_id: id,
                landmarks,
            },
            other => other,
        }
    }

    fn router(viewport: Option<Size>) -> LandmarkRouter {
        let mut mapper = CoordinateMapper::new(ImageResolution::new(1200, 1000));
        if let Some(v) = viewport {
            mapper.update_viewport(v);
        }
        LandmarkRouter::new(
            Arc::new(RwLock::new(mapper)),
            INDEX_FINGER_TIP,
            LandmarkOrientation::AsIs,
        )
    }

    #[test]
    fn test_full_queue_drops_frames() {
        let (sender, rx) = frame_queue(1);
        assert_eq!(sender.submit(frame()).unwrap(), Submission::Queued(1));
        assert_eq!(sender.submit(frame()).unwrap(), Submission::Dropped);
        assert_eq!(sender.dropped_frames(), 1);

        let (id, _) = rx.recv().unwrap();
        assert_eq!(id, 1);
        assert_eq!(sender.submit(frame()).unwrap(), Submission::Queued(3));

        drop(rx);
        assert!(matches!(
            sender.submit(frame()),
            Err(PipelineError::Disconnected)
        ));
    }

    #[test]
    fn test_router_maps_fingertip() {
        let mut router = router(Some(Size::new(800., 1200.)));
        let Some(UiMessage::Pointer { frame_id, point }) =
            router.route(with_frame(hand(0.3, 0.7), 5))
        else {
            panic!("expected a pointer update");
        };
        assert_eq!(frame_id, 5);
        assert!((point.x - 200.).abs() < 1e-2);
        assert!((point.y - 840.).abs() < 1e-2);
    }

    #[test]
    fn test_router_discards_stale_results() {
        let mut router = router(Some(Size::new(800., 1200.)));
        assert!(router.route(with_frame(hand(0.1, 0.1), 4)).is_some());
        assert!(router.route(with_frame(hand(0.2, 0.2), 3)).is_none());
        assert!(router.route(with_frame(hand(0.2, 0.2), 4)).is_none());
        assert!(router.route(with_frame(hand(0.2, 0.2), 6)).is_some());
    }

    #[test]
    fn test_router_waits_for_layout() {
        let mut router = router(None);
        assert!(router.route(with_frame(hand(0.5, 0.5), 1)).is_none());
        // A skipped frame does not count as forwarded
        router
            .mapper
            .write()
            .unwrap()
            .update_viewport(Size::new(800., 1200.));
        assert!(router.route(with_frame(hand(0.5, 0.5), 1)).is_some());
    }

    #[test]
    fn test_router_ignores_short_hands_and_pixel_buffers() {
        let mut router = router(Some(Size::new(800., 1200.)));
        let short = DetectorOutput::Landmarks {
            frame_id: 1,
            landmarks: vec![Landmark::new(0.5, 0.5); 3],
        };
        assert!(router.route(short).is_none());
        let pixels = DetectorOutput::PixelBuffer {
            frame_id: 2,
            buffer: PixelBuffer::ycbcr_filled(2, 2, 0, 0, 0),
        };
        assert!(router.route(pixels).is_none());
    }

    #[test]
    fn test_actor_ignores_out_of_order_pointer() {
        let config = SessionConfig::default();
        let scene = HeadlessScene::counter_scene(
            Size::new(800., 1200.),
            ScreenRect::new(300., 500., 200., 200.),
        );
        let mut actor = SceneActor::new(&config, scene).unwrap();
        let inside = ScreenPoint::new(400., 600.);
        let outside = ScreenPoint::new(10., 10.);

        actor
            .handle(UiMessage::Pointer {
                frame_id: 2,
                point: inside,
            })
            .unwrap();
        actor
            .handle(UiMessage::Pointer {
                frame_id: 1,
                point: outside,
            })
            .unwrap();

        assert_eq!(actor.interaction().count(), 1);
        assert_eq!(actor.surface().notifications(), &[Notification::Press]);
    }

    #[test]
    fn test_drain_handles_queued_messages() {
        let config = SessionConfig::default();
        let scene = HeadlessScene::counter_scene(
            Size::new(800., 1200.),
            ScreenRect::new(300., 500., 200., 200.),
        );
        let mut actor = SceneActor::new(&config, scene).unwrap();
        let (tx, rx) = mpsc::channel();
        tx.send(UiMessage::Layout(Size::new(800., 1200.))).unwrap();
        tx.send(UiMessage::Pointer {
            frame_id: 1,
            point: ScreenPoint::new(400., 600.),
        })
        .unwrap();
        tx.send(UiMessage::Tap).unwrap();
        assert_eq!(actor.drain(&rx).unwrap(), 3);
        assert_eq!(actor.drain(&rx).unwrap(), 0);
        assert_eq!(actor.interaction().count(), 1);
    }

    #[test]
    fn test_drag_between_fingertip_frames_does_not_press() {
        let config = SessionConfig::default();
        let scene = HeadlessScene::counter_scene(
            Size::new(800., 1200.),
            ScreenRect::new(300., 500., 200., 200.),
        );
        let mut actor = SceneActor::new(&config, scene).unwrap();
        let inside = ScreenPoint::new(400., 600.);

        actor
            .handle(UiMessage::Pointer {
                frame_id: 1,
                point: inside,
            })
            .unwrap();
        actor
            .handle(UiMessage::Drag(ScreenPoint::new(10., 10.)))
            .unwrap();
        actor
            .handle(UiMessage::Pointer {
                frame_id: 2,
                point: inside,
            })
            .unwrap();

        assert_eq!(actor.interaction().count(), 1);
        assert_eq!(actor.surface().notifications(), &[Notification::Press]);
    }
}
