use criterion::{criterion_group, criterion_main, Criterion};
use jobqueue::JobQueue;

fn submit_and_drain(reps: usize, threads: usize) {
    let pool: JobQueue<()> = JobQueue::new(threads, |_| ());
    for _ in 0..reps {
        pool.add_job(|()| { std::hint::black_box(1 + 1); }).unwrap();
    }
    pool.wait_on_jobs();
}

fn bench_job_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("jobqueue");
    for threads in [1, 4, 8] {
        group.bench_function(format!("reps=10000/threads={threads}"), |b| {
            b.iter(|| submit_and_drain(10_000, threads));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_job_queue);
criterion_main!(benches);
