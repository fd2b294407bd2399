pub mod category;
pub mod fasta;

pub use category::{classify, FunctionalCategory};
pub use fasta::{parse, FastaSource};
