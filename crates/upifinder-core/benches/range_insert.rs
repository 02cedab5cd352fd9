use upifinder_core::RangeSet;

/// Sequence counter with a hole every `every` values, shuffled by a fixed stride.
fn sequences(n: u32, every: u32, stride: u32) -> Vec<u32> {
    let values: Vec<u32> = (0..n).filter(|v| v % every != 0).collect();
    let len = values.len();
    (0..len).map(|i| values[(i * stride as usize) % len]).collect()
}

#[divan::bench(args = [1_000, 100_000])]
fn insert_in_order(bencher: divan::Bencher, n: u32) {
    let values = sequences(n, 97, 1);
    bencher.bench(|| {
        let mut set = RangeSet::new();
        for v in &values {
            set.insert(*v);
        }
        set.missing()
    });
}

#[divan::bench(args = [1_000, 100_000])]
fn insert_scattered(bencher: divan::Bencher, n: u32) {
    // stride coprime with most lengths
    let values = sequences(n, 97, 7919);
    bencher.bench(|| {
        let mut set = RangeSet::new();
        for v in &values {
            set.insert(*v);
        }
        set.missing()
    });
}

fn main() {
    divan::main();
}
