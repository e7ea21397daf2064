use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};

use crate::detection::domain::expression_detector::ExpressionDetector;

type LoadResult = Result<Box<dyn ExpressionDetector>, String>;

/// Expression detector whose model is loaded on a background thread.
///
/// The frame loop polls the handle each tick; until loading completes
/// `poll` returns `None`. A failed load is logged once and the handle
/// stays pending for the rest of the session.
pub struct DeferredDetector {
    pending: Option<Receiver<LoadResult>>,
    ready: Option<Box<dyn ExpressionDetector>>,
    load_error: Option<String>,
    max_faces: usize,
}

impl DeferredDetector {
    pub fn spawn<F>(load: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn ExpressionDetector>, Box<dyn std::error::Error>>
            + Send
            + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let spawned = thread::Builder::new()
            .name("model-loader".into())
            .spawn(move || {
                let result = load().map_err(|e| e.to_string());
                let _ = tx.send(result);
            });

        let mut deferred = Self {
            pending: None,
            ready: None,
            load_error: None,
            max_faces: 1,
        };
        match spawned {
            Ok(_) => deferred.pending = Some(rx),
            Err(e) => deferred.fail(format!("could not start loader thread: {e}")),
        }
        deferred
    }

    /// Wrap an already-loaded detector.
    pub fn ready(detector: Box<dyn ExpressionDetector>) -> Self {
        Self {
            pending: None,
            ready: Some(detector),
            load_error: None,
            max_faces: 1,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_some()
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Applied immediately if loaded, otherwise once loading completes.
    pub fn set_max_faces(&mut self, max_faces: usize) {
        self.max_faces = max_faces;
        if let Some(detector) = self.ready.as_mut() {
            detector.set_max_faces(max_faces);
        }
    }

    pub fn poll(&mut self) -> Option<&mut (dyn ExpressionDetector + 'static)> {
        if self.ready.is_none() {
            self.receive();
        }
        self.ready.as_deref_mut()
    }

    fn receive(&mut self) {
        let Some(rx) = self.pending.as_ref() else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(mut detector)) => {
                detector.set_max_faces(self.max_faces);
                log::info!("Expression model ready");
                self.pending = None;
                self.ready = Some(detector);
            }
            Ok(Err(e)) => self.fail(e),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.fail("loader thread exited without a result".to_string())
            }
        }
    }

    fn fail(&mut self, error: String) {
        log::error!("Expression model failed to load: {error}");
        self.pending = None;
        self.load_error = Some(error);
    }
}
