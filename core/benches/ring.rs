// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use latte::gpu::{
    cmd::{Builder, Packets},
    CommandBuffer, Context, Executor, NullBackend, Ring,
};

fn push_and_pop(c: &mut Criterion) {
    let ring = Ring::new();
    let buffer = Builder::new().nop().into_buffer(Context(0));

    c.bench_function("ring::push_then_try_pop", |b| {
        b.iter(|| {
            ring.push(buffer.clone()).unwrap();
            ring.try_pop()
        })
    });
}

fn execute_frame(c: &mut Criterion) {
    let words = (0..256)
        .fold(Builder::new(), |builder, idx| builder.set_context_reg(0xa000 + idx, &[idx]))
        .swap_buffers()
        .finish();
    let buffer = CommandBuffer::from_words(&words, Context(0));
    let mut executor = Executor::new();
    let mut backend = NullBackend::new();

    c.bench_function("cmd::packets", |b| {
        b.iter(|| Packets::new(buffer.words()).count())
    });
    c.bench_function("exec::execute", |b| {
        b.iter(|| executor.execute(&mut backend, buffer.words()).unwrap())
    });
}

fn shared_region(c: &mut Criterion) {
    let region: Arc<[_]> = Builder::new().nop().into_buffer(Context(0)).words().into();

    c.bench_function("CommandBuffer::new", |b| {
        b.iter(|| CommandBuffer::new(Arc::clone(&region), Context(1)))
    });
}

criterion_group!(benches, push_and_pop, execute_frame, shared_region);
criterion_main!(benches);
