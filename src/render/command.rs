//! Command buffers and queues.
//!
//! One command buffer carries one frame: its render task, the drawable to present and the
//! completion handlers. Queues retire buffers strictly in commit order, so completion handlers of
//! consecutive frames fire in submission order.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::foundation::core::{FrameIndex, Point, Rect};
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::raster::{FramePixels, Image};
use crate::render::surface::{Presentable, RenderDestination};

/// Receives the pixels a render task wrote, right after the write.
pub type FrameTap = Box<dyn FnOnce(Arc<FramePixels>) + Send>;

/// Called once when the queue has retired every piece of work in a buffer.
pub type CompletionHandler = Box<dyn FnOnce(&CompletionStatus) + Send>;

/// Outcome reported to completion handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionStatus {
    pub index: FrameIndex,
    /// Set when the render task failed while executing; the frame was dropped but the buffer still
    /// retired.
    pub error: Option<String>,
}

impl CompletionStatus {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Reads a composed image and writes it into a destination texture.
pub struct RenderTask {
    image: Image,
    from: Rect,
    destination: RenderDestination,
    origin: Point,
    tap: Option<FrameTap>,
}

impl RenderTask {
    pub(crate) fn new(
        image: Image,
        from: Rect,
        destination: RenderDestination,
        origin: Point,
        tap: Option<FrameTap>,
    ) -> Self {
        Self {
            image,
            from,
            destination,
            origin,
            tap,
        }
    }

    /// Run on the queue's timeline. The texture is fetched here and nowhere else.
    pub fn execute(self) -> FramecastResult<()> {
        let RenderTask {
            image,
            from,
            destination,
            origin,
            tap,
        } = self;

        let mut texture = destination.texture.acquire()?;
        if texture.width() != destination.width
            || texture.height() != destination.height
            || texture.format() != destination.pixel_format
        {
            return Err(FramecastError::render(format!(
                "texture {}x{} {:?} does not match destination {}x{} {:?}",
                texture.width(),
                texture.height(),
                texture.format(),
                destination.width,
                destination.height,
                destination.pixel_format
            )));
        }

        let pixels = image.render(from, destination.pixel_format)?;
        texture.write(&pixels, origin.x.round() as i64, origin.y.round() as i64)?;

        if let Some(tap) = tap {
            tap(Arc::new(pixels));
        }
        Ok(())
    }
}

/// An ordered batch of work submitted and retired as a unit.
pub struct CommandBuffer {
    index: FrameIndex,
    tasks: Vec<RenderTask>,
    presents: Vec<Box<dyn Presentable>>,
    completed: Vec<CompletionHandler>,
}

impl CommandBuffer {
    pub fn new(index: FrameIndex) -> Self {
        Self {
            index,
            tasks: Vec::new(),
            presents: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn index(&self) -> FrameIndex {
        self.index
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn encode_task(&mut self, task: RenderTask) {
        self.tasks.push(task);
    }

    /// Present `drawable` once this buffer's tasks have run.
    pub fn present_drawable(&mut self, drawable: Box<dyn Presentable>) {
        self.presents.push(drawable);
    }

    pub fn add_completed_handler<F>(&mut self, handler: F)
    where
        F: FnOnce(&CompletionStatus) + Send + 'static,
    {
        self.completed.push(Box::new(handler));
    }

    /// Execute tasks in order, then present. Returns the pending completion to be signalled once
    /// the work is retired.
    pub fn run(self) -> Completion {
        let CommandBuffer {
            index,
            tasks,
            presents,
            completed,
        } = self;

        let mut error = None;
        for task in tasks {
            if let Err(e) = task.execute() {
                tracing::warn!(frame = index.0, error = %e, "render task failed, frame dropped");
                error.get_or_insert_with(|| e.to_string());
            }
        }
        for drawable in presents {
            drawable.present();
        }

        Completion {
            status: CompletionStatus { index, error },
            handlers: completed,
        }
    }
}

/// Retired-but-not-yet-signalled buffer state.
pub struct Completion {
    status: CompletionStatus,
    handlers: Vec<CompletionHandler>,
}

impl Completion {
    pub fn status(&self) -> &CompletionStatus {
        &self.status
    }

    /// Fire every completion handler exactly once.
    pub fn signal(self) {
        for handler in self.handlers {
            handler(&self.status);
        }
    }
}

/// Accepts committed command buffers and retires them in commit order.
pub trait CommandQueue: Send + Sync {
    fn command_buffer(&self, index: FrameIndex) -> CommandBuffer {
        CommandBuffer::new(index)
    }

    /// Enqueue `buffer` for execution. Returns immediately.
    fn commit(&self, buffer: CommandBuffer) -> FramecastResult<()>;
}

/// Queue backed by one dedicated execution thread.
///
/// Buffers run in FIFO order on that thread and completion handlers fire there, separate from the
/// committing thread.
pub struct SerialQueue {
    tx: Mutex<Option<mpsc::Sender<CommandBuffer>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialQueue {
    pub fn new() -> FramecastResult<Self> {
        Self::with_latency(Duration::ZERO)
    }

    /// Like [`SerialQueue::new`], but every buffer takes at least `latency` before it retires.
    pub fn with_latency(latency: Duration) -> FramecastResult<Self> {
        let (tx, rx) = mpsc::channel::<CommandBuffer>();
        let worker = std::thread::Builder::new()
            .name("framecast-queue".to_string())
            .spawn(move || {
                while let Ok(buffer) = rx.recv() {
                    let index = buffer.index();
                    let completion = buffer.run();
                    if !latency.is_zero() {
                        std::thread::sleep(latency);
                    }
                    tracing::trace!(frame = index.0, "command buffer retired");
                    completion.signal();
                }
            })
            .map_err(|e| FramecastError::queue(format!("failed to spawn queue thread: {e}")))?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop accepting buffers and wait for the committed ones to retire.
    pub fn shutdown(&self) -> FramecastResult<()> {
        drop(
            self.tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            handle
                .join()
                .map_err(|_| FramecastError::queue("queue thread panicked"))?;
        }
        Ok(())
    }
}

impl CommandQueue for SerialQueue {
    fn commit(&self, buffer: CommandBuffer) -> FramecastResult<()> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard
            .as_ref()
            .ok_or_else(|| FramecastError::queue("queue is shut down"))?;
        tx.send(buffer)
            .map_err(|_| FramecastError::queue("queue thread exited"))
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "queue shutdown failed");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/command.rs"]
mod tests;
