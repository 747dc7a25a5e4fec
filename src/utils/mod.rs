//! Common utilities shared by the solvers.
//!
//! - **`linalg`**: small dense helpers on complex columns (axpy, inner products,
//!   normalization, reproducible random start vectors, distance ordering).
//!

pub mod linalg;

pub use linalg::{
    axpy, dot, identity, is_finite, normalized, random_vector, sort_by_distance, to_complex,
};
