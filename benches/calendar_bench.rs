use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use hospital_sim::events::{Calendar, Event};

const EVENT_COUNTS: &[usize] = &[128, 1_024, 8_192, 65_536];

fn build_events(count: usize) -> Vec<(f64, Event)> {
    (0..count)
        .map(|idx| {
            // Interleave times so the heap has to reorder.
            let time = ((idx * 7_919) % count) as f64 * 0.5;
            let id = idx as u64;
            let event = match idx % 4 {
                0 => Event::Arrival,
                1 => Event::PreparationDone(id),
                2 => Event::OperationDone(id),
                _ => Event::RecoveryDone(id),
            };
            (time, event)
        })
        .collect()
}

fn bench_calendar(c: &mut Criterion) {
    let mut group = c.benchmark_group("calendar");

    for &count in EVENT_COUNTS {
        group.bench_with_input(
            BenchmarkId::new("schedule_pop", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    || build_events(count),
                    |events| {
                        let mut calendar = Calendar::new();
                        for (time, event) in events {
                            calendar
                                .schedule(time, event)
                                .expect("times are never in the past");
                        }
                        while let Some(event) = calendar.pop_next() {
                            black_box(event);
                        }
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_calendar);
criterion_main!(benches);
