pub mod detectors;
pub mod fibonacci;
pub mod fvg;
pub mod swings;


pub use detectors::*;
pub use fibonacci::*;
pub use fvg::*;
pub use swings::*;
