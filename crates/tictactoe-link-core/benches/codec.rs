use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tictactoe_link_core::{decode, CellIndex, Command, GameMode};

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let lines = [
        ("ack", "OK:RESET"),
        ("board_continue", "BOARD:010102020:CONTINUE"),
        ("board_win", "BOARD:111220000:WIN:1"),
        ("board_draw", "BOARD:121212212:DRAW"),
        ("error", "ERR:Cell occupied"),
        ("garbage", "Arduino ready, waiting for host"),
    ];

    for (name, line) in lines.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, line| {
            b.iter(|| decode(black_box(line)));
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let commands = [
        ("reset", Command::Reset),
        ("mode", Command::SetMode(GameMode::AiVsAi)),
        ("move", Command::Move(CellIndex::new(4).expect("valid cell"))),
    ];

    for (name, command) in commands.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), command, |b, command| {
            b.iter(|| black_box(command).encode());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
