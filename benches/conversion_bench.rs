// 协议转换性能基准测试
//
// 测试项目:
// 1. OpenAI -> Anthropic 转换性能
// 2. Anthropic -> OpenAI 转换性能
// 3. 流式响应转换性能

use criterion::{black_box, criterion_group, criterion_main, Criterion};

// 占位符 - 待实现
fn benchmark_placeholder(c: &mut Criterion) {
    c.bench_function("placeholder", |b| {
        b.iter(|| {
            black_box(1 + 1)
        });
    });
}

criterion_group!(benches, benchmark_placeholder);
criterion_main!(benches);
