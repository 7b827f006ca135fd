mod argmax;
mod attention;
mod embedding;
mod linear;
mod norm;
mod rearrange;
mod rope;
mod swiglu;

pub use argmax::*;
pub use attention::*;
pub use embedding::*;
pub use linear::*;
pub use norm::*;
pub use rearrange::*;
pub use rope::*;
pub use swiglu::*;
