use criterion::{criterion_group, criterion_main, Criterion};

use bytecode::{BinOp, Image, ImageBuilder};
use runtime::Runtime;

fn straight_line_image(pairs: usize) -> Image {
    let mut b = ImageBuilder::new();
    b.public("main", 0);
    for i in 0..pairs {
        b.const_int(i as i32);
        b.const_int(1);
        b.binop(BinOp::Add);
        b.drop_top();
    }
    b.stop();
    Image::from_bytes(b.build()).expect("valid image")
}

fn bench_dispatch(c: &mut Criterion) {
    let image = straight_line_image(1_000);
    c.bench_function("dispatch_1k_add_drop", |b| {
        b.iter(|| {
            let mut rt = Runtime::with_io(std::io::empty(), std::io::sink());
            vm::interp::run(&image, &mut rt).expect("clean run");
        })
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
