// Benchmark for the byte tokenizer and the line-to-move path
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use krusty_engraver::communication::Outbound;
use krusty_engraver::gcode::{CommandQueue, Tokenizer};
use krusty_engraver::motion::plan_line;
use krusty_engraver::Config;

fn bench_tokenizer(c: &mut Criterion) {
    let mut gcode = String::new();
    for i in 0..10_000 {
        gcode.push_str(&format!("G1 X{}.125 Y{}.5 F1500 ; pass {}\n", i, i, i));
    }
    let config = Config::default();
    c.bench_function("tokenize 10k G1 lines", |b| {
        b.iter(|| {
            let mut tokenizer = Tokenizer::new(&config);
            let mut queue = CommandQueue::new(64);
            let mut out = Outbound::new();
            let mut lines = 0;
            for &byte in gcode.as_bytes() {
                tokenizer.feed(byte, &mut queue, &mut out);
                if queue.has_complete_line() {
                    while queue.pop().is_some_and(|t| t != krusty_engraver::gcode::Token::EndOfLine) {}
                    lines += 1;
                }
            }
            assert_eq!(lines, 10_000);
        });
    });
}

fn bench_step_sequence(c: &mut Criterion) {
    c.bench_function("trace 100k-step line", |b| {
        b.iter(|| {
            let mut plan = plan_line([0, 0, 0], [100_000, 37_000, -12_345]);
            let mut ticks = 0u64;
            while plan.is_active() {
                plan.next_step();
                ticks += 1;
            }
            assert_eq!(ticks, 100_000);
        });
    });
}

criterion_group!(benches, bench_tokenizer, bench_step_sequence);
criterion_main!(benches);
