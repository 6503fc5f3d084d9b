use std::{sync::Arc, time::Duration};

use funnel::{Affine, Batch, EventLoop, ProgressSink, WorkUnit};

/// Stands in for a window holding a progress bar.
struct ProgressView {
    value: u8,
    open: bool,
}

fn main() {
    // The main thread owns the view:
    let event_loop = EventLoop::acquire().expect("main thread owns no context yet");

    let view = Arc::new(Affine::new(
        &event_loop,
        ProgressView {
            value: 0,
            open: true,
        },
    ));

    // The sink's callback only ever runs on the main thread,
    // so it may touch the view:
    let callback_view = Arc::clone(&view);
    let sink = ProgressSink::new(event_loop.dispatcher(), move |percentage| {
        let result = callback_view.with(|view| {
            view.value = percentage;
            println!("Progress: {percentage}%");

            if percentage == 100 {
                view.open = false;
                println!("Closing progress view.");
            }
        });

        if let Err(err) = result {
            eprintln!("Error: {err}");
        }
    });

    let durations = [3000, 2500, 2000, 1500, 1000, 3500, 4000, 4500, 5000, 5500];

    let units = durations
        .iter()
        .enumerate()
        .map(|(index, &ms)| {
            WorkUnit::simulated(format!("Task {index} ({ms} ms)"), Duration::from_millis(ms))
        })
        .collect();

    let batch = Batch::submit(units, &sink).expect("batch is not empty");

    // Keeps delivering progress to the view while waiting:
    let joined = batch.join_pumping(&event_loop);

    for result in joined.results() {
        match result {
            Ok(label) => println!("{label} done"),
            Err(failure) => println!("{failure}"),
        }
    }

    println!(
        "All tasks completed in {:.1} s (the slowest task, not the sum).",
        joined.elapsed().as_secs_f64()
    );

    let open = view.with(|view| view.open).expect("main thread owns the view");
    println!("Progress view open: {open}");
}
