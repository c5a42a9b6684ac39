pub mod fits;

pub use fits::{load_fits, read_header, save_fits};
