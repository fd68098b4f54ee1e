//! Annotree - range annotations for collaborative documents.
//!
//! A document is a sequence of positions. Every position carries a value for
//! every annotation key (`None` when unset). [`AnnotationTree`] stores these
//! values as an augmented red-black tree of runs and applies document
//! operations through a streaming cursor.
//!
//! # Quick Start
//!
//! ```
//! use annotree::annotation::AnnotationTree;
//! use annotree::annotation::RawAnnotationSet;
//!
//! let mut tree: AnnotationTree<&str> = AnnotationTree::new();
//!
//! // Create ten positions
//! tree.begin();
//! tree.insert(10);
//! tree.finish();
//!
//! // Make positions 2..7 bold
//! tree.begin();
//! tree.skip(2);
//! tree.start_annotation("bold", Some("true"));
//! tree.skip(5);
//! tree.end_annotation("bold");
//! tree.finish();
//!
//! assert_eq!(tree.get_annotation(1, "bold"), None);
//! assert_eq!(tree.get_annotation(4, "bold"), Some(&"true"));
//! assert_eq!(tree.first_annotation_change(0, 10, "bold", None), Some(2));
//! ```
//!
//! [`AnnotationTree`]: annotation::AnnotationTree

pub mod annotation;
pub mod config;
pub mod error;
