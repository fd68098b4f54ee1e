//! AFL fuzz harness for the annotation tree
//!
//! The input is decoded into a script of complete transactions and applied to
//! the tree and to the flat reference set in lockstep. After every `finish()`:
//! 1. Both sets agree on size, known keys and every value
//! 2. The tree passes the full invariant check

use afl::fuzz;
use annotree::annotation::AnnotationTree;
use annotree::annotation::FlatAnnotationSet;
use annotree::annotation::script::CursorOp;
use annotree::annotation::script::decode_ops;
use annotree::annotation::script::first_difference;
use annotree::config::TreeConfig;

fn main() {
    fuzz!(|data: &[u8]| {
        let ops = decode_ops(data);
        let mut tree: AnnotationTree<u8> = AnnotationTree::with_config(TreeConfig::new().with_invariant_checks(true));
        let mut flat: FlatAnnotationSet<u8> = FlatAnnotationSet::new();

        for (i, op) in ops.iter().enumerate() {
            op.apply(&mut tree);
            op.apply(&mut flat);

            if *op == CursorOp::Finish {
                if let Some(diff) = first_difference(&tree, &flat) {
                    panic!("Divergence after op {} ({}): {}\n{}", i, op, diff, tree.debug_string());
                }
            }
        }

        if let Err(violation) = tree.check_invariants() {
            panic!("{}", violation);
        }
    });
}
