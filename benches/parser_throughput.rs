// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

//! Throughput benchmarks for the hybrid stream parser.
//!
//! Measures:
//! - Marker scanning over plain text at different fragment sizes
//! - A full structured answer fed one character at a time
//! - The processor pipeline end to end on a current-thread runtime
//!
//! Run: cargo bench --bench parser_throughput

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use coachstream::config::defaults::default_augmentation_rules;
use coachstream::protocol::{scan_markers, visible_text};
use coachstream::stream::{
    BlockPolicy, EventSink, HybridStreamParser, ParserOptions, RuleAugmenter, StreamProcessor,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn structured_answer() -> String {
    let mut text = "Your knee pain looks like overload. ".repeat(20);
    text.push_str("Try this <<EXERCISE_QUERY:knee:wall sit>> for a week. ");
    text.push_str("<<JSON_DATA>>");
    text.push_str(
        r#"{"diagnosis":"patellofemoral","painScale":4,"followUpOptions":[{"text":"Give me a workout program","mode":"exploration"},{"text":"Does it hurt at night?","mode":"diagnosis"},{"text":"Both exercise and recovery","mode":"exploration"}]}"#,
    );
    text.push_str("<<JSON_END>>");
    text
}

fn chunked(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

fn parser(policy: BlockPolicy) -> HybridStreamParser {
    let options = ParserOptions {
        block_policy: policy,
        ..ParserOptions::default()
    };
    let (sink, _events) = EventSink::channel();
    HybridStreamParser::new(
        options,
        Arc::new(RuleAugmenter::new(default_augmentation_rules())),
        sink,
    )
}

// ---------------------------------------------------------------------------
// Benchmark: protocol scanning
// ---------------------------------------------------------------------------

fn bench_protocol(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol");
    let answer = structured_answer();
    let plain = "Plain coaching advice without any markers at all. ".repeat(40);

    group.bench_function("scan_markers_structured", |b| {
        b.iter(|| scan_markers(black_box(&answer), 0));
    });
    group.bench_function("visible_text_structured", |b| {
        b.iter(|| visible_text(black_box(&answer)));
    });
    group.bench_function("visible_text_plain", |b| {
        b.iter(|| visible_text(black_box(&plain)));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: parser fragment sizes
// ---------------------------------------------------------------------------

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let answer = structured_answer();

    for size in [1usize, 8, 64] {
        let fragments = chunked(&answer, size);
        group.bench_with_input(BenchmarkId::new("structured", size), &fragments, |b, fragments| {
            b.iter(|| {
                let mut parser = parser(BlockPolicy::First);
                for fragment in fragments {
                    parser.process_chunk(black_box(fragment));
                }
                rt.block_on(parser.complete());
            });
        });
    }

    let fragments = chunked(&answer, 8);
    group.bench_function("structured_every_policy", |b| {
        b.iter(|| {
            let mut parser = parser(BlockPolicy::Every);
            for fragment in &fragments {
                parser.process_chunk(black_box(fragment));
            }
            rt.block_on(parser.complete());
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: processor end to end
// ---------------------------------------------------------------------------

fn bench_processor(c: &mut Criterion) {
    let mut group = c.benchmark_group("processor");
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let processor = StreamProcessor::new(
        ParserOptions::default(),
        Arc::new(RuleAugmenter::new(default_augmentation_rules())),
    );
    let fragments = chunked(&structured_answer(), 16);

    group.bench_function("structured_16", |b| {
        b.to_async(&rt).iter(|| async {
            use tokio_stream::StreamExt;
            let input = tokio_stream::iter(
                fragments
                    .clone()
                    .into_iter()
                    .map(Ok::<_, std::convert::Infallible>),
            );
            let mut events = processor.process(input, None);
            let mut count = 0usize;
            while let Some(event) = events.next().await {
                black_box(&event);
                count += 1;
            }
            count
        });
    });

    group.finish();
}

criterion_group!(benches, bench_protocol, bench_parser, bench_processor);
criterion_main!(benches);
