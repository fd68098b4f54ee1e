//! Replayable sequences of cursor calls.
//!
//! A script is a flat list of [`CursorOp`]s, including the `Begin` and
//! `Finish` brackets. [`decode_ops`] turns arbitrary bytes into a script that
//! is always well formed for the document it is applied to, so fuzzers and
//! crash reproducers can drive any [`RawAnnotationSet`] with raw input.

use std::fmt;

use smallvec::SmallVec;

use crate::annotation::Key;
use crate::annotation::RawAnnotationSet;

/// Keys used by decoded scripts. The last one is a local key.
pub const SCRIPT_KEYS: [&str; 4] = ["a", "b", "c", "@d"];

/// One call on the cursor protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CursorOp<V> {
    Begin,
    Finish,
    Skip(usize),
    Delete(usize),
    Insert(usize),
    Start(String, Option<V>),
    End(String),
}

impl<V: Clone> CursorOp<V> {
    pub fn apply(&self, set: &mut dyn RawAnnotationSet<V>) {
        match self {
            CursorOp::Begin => set.begin(),
            CursorOp::Finish => set.finish(),
            CursorOp::Skip(n) => set.skip(*n),
            CursorOp::Delete(n) => set.delete(*n),
            CursorOp::Insert(n) => set.insert(*n),
            CursorOp::Start(key, value) => set.start_annotation(key, value.clone()),
            CursorOp::End(key) => set.end_annotation(key),
        }
    }
}

impl<V: fmt::Debug> fmt::Display for CursorOp<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            CursorOp::Begin => write!(f, "begin"),
            CursorOp::Finish => write!(f, "finish"),
            CursorOp::Skip(n) => write!(f, "skip {n}"),
            CursorOp::Delete(n) => write!(f, "delete {n}"),
            CursorOp::Insert(n) => write!(f, "insert {n}"),
            CursorOp::Start(key, Some(value)) => write!(f, "start {key}={value:?}"),
            CursorOp::Start(key, None) => write!(f, "start {key}=null"),
            CursorOp::End(key) => write!(f, "end {key}"),
        };
    }
}

/// Apply every op of `script` in order.
pub fn apply_all<V: Clone>(script: &[CursorOp<V>], set: &mut dyn RawAnnotationSet<V>) {
    for op in script {
        op.apply(set);
    }
}

/// Describe the first observable difference between two sets, or `None` when
/// they agree on size, known keys and every value.
pub fn first_difference<V>(left: &dyn RawAnnotationSet<V>, right: &dyn RawAnnotationSet<V>) -> Option<String>
where
    V: PartialEq + fmt::Debug,
{
    let size = left.size();
    if size != right.size() {
        return Some(format!("size {} != {}", size, right.size()));
    }
    let mut left_keys: Vec<Key> = left.known_keys().into_iter().collect();
    let mut right_keys: Vec<Key> = right.known_keys().into_iter().collect();
    left_keys.sort();
    right_keys.sort();
    if left_keys != right_keys {
        return Some(format!("known keys {left_keys:?} != {right_keys:?}"));
    }

    let mut keys: Vec<&str> = SCRIPT_KEYS.to_vec();
    keys.extend(left_keys.iter().map(|key| &**key));
    for key in keys {
        for index in 0..size {
            let (a, b) = (left.get_annotation(index, key), right.get_annotation(index, key));
            if a != b {
                return Some(format!("{key} at {index}: {a:?} != {b:?}"));
            }
        }
        let (a, b) = (
            left.last_annotation_change(0, size, key, None),
            right.last_annotation_change(0, size, key, None),
        );
        if a != b {
            return Some(format!("last change of {key}: {a:?} != {b:?}"));
        }
    }
    return None;
}

/// Tracks document size, cursor and open keys while decoding so that every
/// emitted op is legal.
struct Decoder {
    ops: Vec<CursorOp<u8>>,
    size: usize,
    cursor: usize,
    open: SmallVec<[&'static str; 4]>,
}

impl Decoder {
    fn close_all(&mut self) {
        self.open.sort();
        for key in self.open.drain(..) {
            self.ops.push(CursorOp::End(key.to_string()));
        }
    }

    fn finish(&mut self) {
        self.close_all();
        self.ops.push(CursorOp::Finish);
        self.cursor = 0;
    }

    /// Decode one op from the front of `bytes` and return the rest, or `None`
    /// when the input is exhausted.
    fn step<'a>(&mut self, bytes: &'a [u8]) -> Option<&'a [u8]> {
        let (&tag, rest) = bytes.split_first()?;
        match tag % 6 {
            0 | 1 if !rest.is_empty() => {
                let available = self.size - self.cursor;
                let n = (rest[0] as usize % 8 + 1).min(available);
                if n > 0 {
                    if tag % 6 == 0 {
                        self.ops.push(CursorOp::Skip(n));
                        self.cursor += n;
                    } else {
                        self.ops.push(CursorOp::Delete(n));
                        self.size -= n;
                    }
                }
                return Some(&rest[1..]);
            }
            2 if !rest.is_empty() => {
                let n = rest[0] as usize % 8 + 1;
                self.ops.push(CursorOp::Insert(n));
                self.size += n;
                self.cursor += n;
                return Some(&rest[1..]);
            }
            3 if rest.len() >= 2 => {
                let key = SCRIPT_KEYS[rest[0] as usize % SCRIPT_KEYS.len()];
                let value = match rest[1] % 4 {
                    0 => None,
                    v => Some(v - 1),
                };
                self.ops.push(CursorOp::Start(key.to_string(), value));
                if !self.open.contains(&key) {
                    self.open.push(key);
                }
                return Some(&rest[2..]);
            }
            4 if !rest.is_empty() => {
                let key = SCRIPT_KEYS[rest[0] as usize % SCRIPT_KEYS.len()];
                if let Some(i) = self.open.iter().position(|k| *k == key) {
                    self.open.swap_remove(i);
                    self.ops.push(CursorOp::End(key.to_string()));
                }
                return Some(&rest[1..]);
            }
            5 => {
                self.finish();
                self.ops.push(CursorOp::Begin);
                return Some(rest);
            }
            _ => return None,
        }
    }
}

/// Decode arbitrary bytes into complete transactions starting from an empty
/// document. Values are `0..3`; roughly one start in four opens a null range.
pub fn decode_ops(bytes: &[u8]) -> Vec<CursorOp<u8>> {
    let mut decoder = Decoder {
        ops: vec![CursorOp::Begin],
        size: 0,
        cursor: 0,
        open: SmallVec::new(),
    };
    let mut remaining = bytes;
    while let Some(rest) = decoder.step(remaining) {
        remaining = rest;
    }
    decoder.finish();
    return decoder.ops;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationTree;
    use crate::annotation::FlatAnnotationSet;
    use crate::config::TreeConfig;

    #[test]
    fn empty_input_is_one_empty_transaction() {
        assert_eq!(decode_ops(&[]), vec![CursorOp::<u8>::Begin, CursorOp::Finish]);
    }

    #[test]
    fn skips_are_clamped_to_document() {
        // insert 3, then skip 8 which only has 3 positions available
        let ops = decode_ops(&[2, 2, 0, 7]);
        assert_eq!(
            ops,
            vec![CursorOp::Begin, CursorOp::Insert(3), CursorOp::Finish]
        );
        let ops = decode_ops(&[2, 2, 5, 0, 7]);
        assert_eq!(
            ops,
            vec![
                CursorOp::Begin,
                CursorOp::Insert(3),
                CursorOp::Finish,
                CursorOp::Begin,
                CursorOp::Skip(3),
                CursorOp::Finish
            ]
        );
    }

    #[test]
    fn open_keys_are_closed_before_finish() {
        let ops = decode_ops(&[3, 1, 2, 2, 0]);
        assert_eq!(
            ops,
            vec![
                CursorOp::Begin,
                CursorOp::Start("b".to_string(), Some(1)),
                CursorOp::Insert(1),
                CursorOp::End("b".to_string()),
                CursorOp::Finish
            ]
        );
    }

    #[test]
    fn decoded_scripts_apply_cleanly() {
        let bytes: Vec<u8> = (0..400u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let ops = decode_ops(&bytes);
        let mut set: FlatAnnotationSet<u8> = FlatAnnotationSet::new();
        apply_all(&ops, &mut set);
        assert!(!set.is_in_transaction());
    }

    #[test]
    fn tree_and_flat_agree_on_a_decoded_script() {
        let bytes: Vec<u8> = (0..600u32).map(|i| (i.wrapping_mul(40503) >> 5) as u8).collect();
        let ops = decode_ops(&bytes);
        let mut tree: AnnotationTree<u8> =
            AnnotationTree::with_config(TreeConfig::new().with_invariant_checks(true));
        let mut flat: FlatAnnotationSet<u8> = FlatAnnotationSet::new();
        apply_all(&ops, &mut tree);
        apply_all(&ops, &mut flat);
        assert_eq!(first_difference(&tree, &flat), None);
    }

    #[test]
    fn difference_names_the_position() {
        let mut a: FlatAnnotationSet<u8> = FlatAnnotationSet::new();
        let mut b: FlatAnnotationSet<u8> = FlatAnnotationSet::new();
        apply_all(&decode_ops(&[2, 3, 5, 3, 0, 1, 0, 1]), &mut a);
        apply_all(&decode_ops(&[2, 3, 5, 3, 0, 2, 0, 1]), &mut b);
        assert_eq!(first_difference(&a, &b), Some("a at 0: Some(0) != Some(1)".to_string()));
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(CursorOp::Start("a".to_string(), Some(2u8)).to_string(), "start a=2");
        assert_eq!(CursorOp::<u8>::Start("a".to_string(), None).to_string(), "start a=null");
        assert_eq!(CursorOp::<u8>::Delete(4).to_string(), "delete 4");
    }
}
