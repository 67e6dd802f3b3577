pub mod block;

pub use block::{Block, BlockArtist, BlockStyle};
