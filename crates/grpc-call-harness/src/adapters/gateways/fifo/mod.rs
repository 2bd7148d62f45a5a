mod pipe;

pub use pipe::{FifoPipe, MAX_FRAME_LEN};
