// Quick benchmark for summary results across both annotation sets

use std::time::Instant;

use annotree::annotation::AnnotationTree;
use annotree::annotation::FlatAnnotationSet;
use annotree::annotation::RawAnnotationSet;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

const KEYS: [&str; 3] = ["style/bold", "style/italic", "lang"];

fn time_ops<F: Fn() -> usize>(f: F, iterations: usize) -> f64 {
    // Warmup
    for _ in 0..3 {
        let _ = f();
    }

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = f();
    }
    let elapsed = start.elapsed();
    return elapsed.as_nanos() as f64 / iterations as f64;
}

fn annotate(set: &mut dyn RawAnnotationSet<u32>, start: usize, end: usize, key: &str, value: Option<u32>) {
    let size = set.size();
    set.begin();
    if start > 0 {
        set.skip(start);
    }
    set.start_annotation(key, value);
    set.skip(end - start);
    set.end_annotation(key);
    if size > end {
        set.skip(size - end);
    }
    set.finish();
}

macro_rules! bench_impl {
    ($name:expr, $set:ty, $len:expr, $seed:expr) => {{
        let len: usize = $len;

        // Random annotations (100 ranges)
        let annotate_time = time_ops(|| {
            let mut set = <$set>::new();
            set.begin();
            set.insert(len);
            set.finish();
            let mut rng = StdRng::seed_from_u64($seed);
            for _ in 0..100 {
                let start = rng.gen_range(0..len);
                let end = rng.gen_range(start + 1..=len.min(start + 32));
                annotate(&mut set, start, end, KEYS[rng.gen_range(0..KEYS.len())], Some(rng.gen_range(0..4)));
            }
            set.known_keys().len()
        }, 20);

        // Typing at the end (200 positions)
        let typing_time = time_ops(|| {
            let mut set = <$set>::new();
            for _ in 0..200 {
                let size = set.size();
                set.begin();
                if size > 0 {
                    set.skip(size);
                }
                set.insert(1);
                set.finish();
            }
            set.size()
        }, 20);

        // Point queries over an annotated document
        let mut set = <$set>::new();
        set.begin();
        set.insert(len);
        set.finish();
        let mut rng = StdRng::seed_from_u64($seed);
        for _ in 0..200 {
            let start = rng.gen_range(0..len);
            let end = rng.gen_range(start + 1..=len.min(start + 32));
            annotate(&mut set, start, end, "style/bold", Some(1));
        }
        let query_time = time_ops(|| {
            let mut found = 0;
            for start in (0..len).step_by(len / 100) {
                if set.first_annotation_change(start, len, "style/bold", None).is_some() {
                    found += 1;
                }
            }
            found
        }, 20);

        println!(
            "| {:18} | {:>12.1} | {:>12.1} | {:>12.1} |",
            $name,
            annotate_time / 1000.0,
            typing_time / 1000.0,
            query_time / 1000.0
        );
    }};
}

fn main() {
    let len = 5000;

    println!("\nAnnotation sets, document of {} positions (times in us)\n", len);
    println!("| {:18} | {:>12} | {:>12} | {:>12} |", "Implementation", "annotate", "typing", "queries");
    println!("|{:-<20}|{:->14}|{:->14}|{:->14}|", "", "", "", "");

    bench_impl!("AnnotationTree", AnnotationTree<u32>, len, 42);
    bench_impl!("FlatAnnotationSet", FlatAnnotationSet<u32>, len, 42);

    println!();
}
