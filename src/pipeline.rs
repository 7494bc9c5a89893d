//! One-slot prefetch between a document producer and its consumer
//!
//! The producer runs on a worker thread and decodes the next document while the
//! consumer works on the current one. At most one document is in flight: the
//! worker only starts on a document after [`PrefetchPipeline::request_next`].
//!
//! States run `Idle -> Producing -> Ready -> Consumed -> Producing ...` and end
//! in `Stopped`. The consumer sees `Ready` once [`PrefetchPipeline::poll`] finds
//! the item finished; [`PrefetchPipeline::await_result`] passes through it
//! without polling.

use crate::error::{MeltError, Result};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::thread::JoinHandle;
use tracing::debug;

/// Consumer-side view of the handoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Producing,
    Ready,
    Consumed,
    Stopped,
}

/// Prefetching producer of `T`; the producer returns `None` when exhausted
pub struct PrefetchPipeline<T: Send + 'static> {
    requests: Option<SyncSender<()>>,
    results: Receiver<Option<T>>,
    worker: Option<JoinHandle<()>>,
    state: PipelineState,
    ready: Option<Option<T>>,
}

impl<T: Send + 'static> PrefetchPipeline<T> {
    pub fn new<F>(mut producer: F) -> Self
    where
        F: FnMut() -> Option<T> + Send + 'static,
    {
        let (request_tx, request_rx) = sync_channel::<()>(1);
        let (result_tx, result_rx) = sync_channel::<Option<T>>(1);

        let worker = std::thread::spawn(move || {
            while request_rx.recv().is_ok() {
                if result_tx.send(producer()).is_err() {
                    break;
                }
            }
            debug!("prefetch worker exiting");
        });

        PrefetchPipeline {
            requests: Some(request_tx),
            results: result_rx,
            worker: Some(worker),
            state: PipelineState::Idle,
            ready: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Start producing the next item in the background
    pub fn request_next(&mut self) -> Result<()> {
        match self.state {
            PipelineState::Idle | PipelineState::Consumed => {}
            other => {
                return Err(MeltError::Pipeline(format!(
                    "request_next called while {:?}",
                    other
                )))
            }
        }
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| MeltError::Pipeline("pipeline is stopped".into()))?;
        requests
            .send(())
            .map_err(|_| MeltError::Pipeline("prefetch worker has exited".into()))?;
        self.state = PipelineState::Producing;
        Ok(())
    }

    /// Check without blocking whether the requested item is finished
    pub fn poll(&mut self) -> Result<PipelineState> {
        if self.state == PipelineState::Producing {
            match self.results.try_recv() {
                Ok(item) => {
                    self.ready = Some(item);
                    self.state = PipelineState::Ready;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    return Err(MeltError::Pipeline("prefetch worker has exited".into()))
                }
            }
        }
        Ok(self.state)
    }

    /// Block until the requested item is ready and take it
    pub fn await_result(&mut self) -> Result<Option<T>> {
        let item = match (self.state, self.ready.take()) {
            (PipelineState::Ready, Some(item)) => item,
            (PipelineState::Producing, _) => self
                .results
                .recv()
                .map_err(|_| MeltError::Pipeline("prefetch worker has exited".into()))?,
            (state, _) => {
                return Err(MeltError::Pipeline(format!(
                    "await_result called while {:?}",
                    state
                )))
            }
        };
        self.state = PipelineState::Consumed;
        Ok(item)
    }

    /// Shut the worker down; only allowed with no production outstanding.
    /// A ready item that was never taken is discarded.
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            PipelineState::Stopped => return Ok(()),
            PipelineState::Producing => {
                return Err(MeltError::Pipeline(
                    "stop called while an item is being produced".into(),
                ))
            }
            PipelineState::Idle | PipelineState::Ready | PipelineState::Consumed => {}
        }
        self.ready = None;
        self.state = PipelineState::Stopped;
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| MeltError::Pipeline("prefetch worker panicked".into()))?;
        }
        Ok(())
    }
}

impl<T: Send + 'static> Drop for PrefetchPipeline<T> {
    fn drop(&mut self) {
        // An outstanding item is discarded; the worker finishes it and exits
        let _ = self.shutdown();
    }
}

impl<T: Send + 'static> IntoIterator for PrefetchPipeline<T> {
    type Item = T;
    type IntoIter = Prefetched<T>;

    fn into_iter(self) -> Prefetched<T> {
        Prefetched {
            pipeline: self,
            primed: false,
            done: false,
        }
    }
}

/// Iterator that asks for item N+1 as soon as item N is handed out
pub struct Prefetched<T: Send + 'static> {
    pipeline: PrefetchPipeline<T>,
    primed: bool,
    done: bool,
}

impl<T: Send + 'static> Iterator for Prefetched<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }
        if !self.primed {
            self.primed = true;
            if self.pipeline.request_next().is_err() {
                self.done = true;
                return None;
            }
        }
        match self.pipeline.await_result() {
            Ok(Some(item)) => {
                if self.pipeline.request_next().is_err() {
                    self.done = true;
                }
                Some(item)
            }
            _ => {
                self.done = true;
                let _ = self.pipeline.stop();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter(limit: usize) -> impl FnMut() -> Option<usize> + Send + 'static {
        let mut next = 0;
        move || {
            if next < limit {
                next += 1;
                Some(next)
            } else {
                None
            }
        }
    }

    #[test]
    fn test_items_arrive_in_production_order() {
        let items: Vec<usize> = PrefetchPipeline::new(counter(50)).into_iter().collect();
        assert_eq!(items, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn test_explicit_handoff() {
        let mut pipeline = PrefetchPipeline::new(counter(2));
        assert_eq!(pipeline.state(), PipelineState::Idle);

        pipeline.request_next().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Producing);
        assert!(pipeline.request_next().is_err());
        assert!(pipeline.stop().is_err());

        assert_eq!(pipeline.await_result().unwrap(), Some(1));
        assert_eq!(pipeline.state(), PipelineState::Consumed);
        assert!(pipeline.await_result().is_err());

        pipeline.request_next().unwrap();
        assert_eq!(pipeline.await_result().unwrap(), Some(2));
        pipeline.request_next().unwrap();
        assert_eq!(pipeline.await_result().unwrap(), None);

        pipeline.stop().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(pipeline.request_next().is_err());
    }

    #[test]
    fn test_poll_reports_ready_item() {
        let mut pipeline = PrefetchPipeline::new(counter(3));
        assert_eq!(pipeline.poll().unwrap(), PipelineState::Idle);

        pipeline.request_next().unwrap();
        let mut state = pipeline.poll().unwrap();
        while state == PipelineState::Producing {
            std::thread::sleep(std::time::Duration::from_millis(1));
            state = pipeline.poll().unwrap();
        }
        assert_eq!(state, PipelineState::Ready);
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert!(pipeline.request_next().is_err());

        assert_eq!(pipeline.await_result().unwrap(), Some(1));
        assert_eq!(pipeline.state(), PipelineState::Consumed);

        // await_result without polling still hands items over in order
        pipeline.request_next().unwrap();
        assert_eq!(pipeline.await_result().unwrap(), Some(2));

        pipeline.request_next().unwrap();
        while pipeline.poll().unwrap() != PipelineState::Ready {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        pipeline.stop().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[test]
    fn test_producer_runs_one_ahead_at_most() {
        let produced = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&produced);
        let mut source = counter(10);
        let pipeline = PrefetchPipeline::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            source()
        });

        for (taken, _) in pipeline.into_iter().enumerate().take(5) {
            // the item handed out plus the one being prefetched
            assert!(produced.load(Ordering::SeqCst) <= taken + 2);
        }
    }
}
