//! Benchmarks for the hot paths of a reasoning step.

#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reasonflow::config::{Limits, ParticipantConfig, SanitizerConfig};
use reasonflow::council::{fingerprint, ConsensusRound, Participant, Verdict, Vote};
use reasonflow::executor::Sanitizer;
use reasonflow::tools::{ToolCall, ToolKind};
use std::path::PathBuf;

fn sanitizer_benchmark(c: &mut Criterion) {
    let config = SanitizerConfig {
        working_root: Some(PathBuf::from("/srv/workspace")),
        ..SanitizerConfig::default()
    };
    let sanitizer = Sanitizer::new(&config, Limits::default().regex_timeout()).unwrap();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let safe = ToolCall::new("shell", "cargo test --workspace");
    let write = ToolCall::new("write_file", "notes/today.md\nremember the milk");

    c.bench_function("sanitizer_check_command", |b| {
        b.iter(|| runtime.block_on(sanitizer.check(black_box(&safe), ToolKind::Command)))
    });
    c.bench_function("sanitizer_check_file_write", |b| {
        b.iter(|| runtime.block_on(sanitizer.check(black_box(&write), ToolKind::FileWrite)))
    });
}

fn consensus_benchmark(c: &mut Criterion) {
    let roster = [
        ParticipantConfig::new("correctness", 0.3, false),
        ParticipantConfig::new("security", 0.25, true),
        ParticipantConfig::new("maintainability", 0.25, false),
        ParticipantConfig::new("performance", 0.2, false),
    ];
    let participants: Vec<Participant> = roster.iter().map(Participant::from).collect();
    let proposal = "Refactor the loader to stream records instead of buffering them.";

    c.bench_function("consensus_round_evaluate", |b| {
        b.iter(|| {
            let votes = participants
                .iter()
                .map(|p| Vote::new(p, Verdict::Approve, "looks fine"))
                .collect();
            ConsensusRound::evaluate(1, votes, 0.7, fingerprint(black_box(proposal)))
        })
    });
}

criterion_group!(benches, sanitizer_benchmark, consensus_benchmark);
criterion_main!(benches);
