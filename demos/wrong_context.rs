use std::{sync::Arc, thread, time::Duration};

use funnel::{Affine, EventLoop};

struct ProgressView {
    value: u8,
}

fn main() {
    let event_loop = EventLoop::acquire().expect("main thread owns no context yet");
    let view = Arc::new(Affine::new(&event_loop, ProgressView { value: 0 }));

    // Touching the main thread's view from a worker thread:
    let worker_view = Arc::clone(&view);
    let touched = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        worker_view.with(|view| view.value = 100)
    })
    .join()
    .expect("worker does not panic");

    if let Err(err) = touched {
        eprintln!("Error: {err}");
    }

    // Creating a view on a worker thread binds it to the worker's context,
    // so the main thread cannot touch it afterwards:
    let foreign_view = thread::spawn(|| {
        let worker_loop = EventLoop::acquire().expect("worker owns no context yet");
        Affine::new(&worker_loop, ProgressView { value: 0 })
    })
    .join()
    .expect("worker does not panic");

    if let Err(err) = foreign_view.with(|view| view.value = 50) {
        eprintln!("Error: {err}");
    }

    let value = view.with(|view| view.value).expect("main thread owns the view");
    println!("Progress view still shows {value}%");
}
