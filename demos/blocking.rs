use std::{thread, time::Duration, time::Instant};

use funnel::{EventLoop, ProgressSink};

fn main() {
    let event_loop = EventLoop::acquire().expect("main thread owns no context yet");

    let started = Instant::now();
    let sink = ProgressSink::new(event_loop.dispatcher(), move |percentage| {
        println!("{:>5} ms: progress {percentage}%", started.elapsed().as_millis());
    });

    // Doing the work on the owning context itself:
    let total = 10;
    for completed in 1..=total {
        thread::sleep(Duration::from_millis(200));
        sink.report((completed * 100 / total) as u8);
    }

    // Nothing was delivered while the owning context was busy,
    // so every report arrives at once, after the sum of all durations:
    event_loop.run_pending();

    println!("Done after {} ms.", started.elapsed().as_millis());
}
