//! Reproduce AFL crashes without AFL instrumentation
//!
//! Usage: cargo run --bin repro_crash -- <crash_file>

use std::fs;

use annotree::annotation::AnnotationTree;
use annotree::annotation::FlatAnnotationSet;
use annotree::annotation::RawAnnotationSet;
use annotree::annotation::script::CursorOp;
use annotree::annotation::script::decode_ops;
use annotree::annotation::script::first_difference;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <crash_file>", args[0]);
        std::process::exit(1);
    }
    let data = fs::read(&args[1]).expect("Failed to read file");

    eprintln!("Input: {} bytes", data.len());
    eprintln!("Hex: {}", data.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" "));

    let ops = decode_ops(&data);
    eprintln!("Decoded {} ops", ops.len());

    // Invariants are checked by hand below so the failing op gets printed first
    let mut tree: AnnotationTree<u8> = AnnotationTree::new();
    let mut flat: FlatAnnotationSet<u8> = FlatAnnotationSet::new();

    for (i, op) in ops.iter().enumerate() {
        eprintln!("Op {}: {}", i, op);
        op.apply(&mut tree);
        op.apply(&mut flat);

        if *op != CursorOp::Finish {
            continue;
        }
        eprintln!("  After: size={} keys={:?}", tree.size(), {
            let mut keys: Vec<String> = tree.known_keys().iter().map(|k| k.to_string()).collect();
            keys.sort();
            keys
        });

        if let Err(violation) = tree.check_invariants() {
            eprintln!("  Invariant check: FAILED");
            panic!("{}", violation);
        }
        if let Some(diff) = first_difference(&tree, &flat) {
            eprintln!("  Comparison with flat set: FAILED");
            eprintln!("{}", tree.debug_string());
            panic!("Divergence after op {}: {}", i, diff);
        }
    }

    eprintln!("\nFinal state:");
    eprintln!("{}", tree.debug_string());
    eprintln!("\nAll checks passed!");
}
