use varwatch::{Granularity, Job, Scheduler};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, UnwrapThrowExt};
use zoon::{Task, Timer};

/// The browser event loop.
///
/// Task jobs run after a zero-delay timer, like `setTimeout(job)`.
/// Microtask jobs go through `queueMicrotask`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebScheduler;

impl Scheduler for WebScheduler {
    fn defer(&self, granularity: Granularity, job: Job) {
        match granularity {
            Granularity::Task => {
                Task::start(async move {
                    Timer::sleep(0).await;
                    job();
                });
            }
            Granularity::Microtask => {
                let callback = Closure::once_into_js(move || job());
                web_sys::window()
                    .unwrap_throw()
                    .queue_microtask(callback.unchecked_ref());
            }
        }
    }
}
