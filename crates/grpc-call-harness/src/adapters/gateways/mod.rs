mod fifo;
mod hyper;
mod tonic;

pub use self::fifo::{FifoPipe, MAX_FRAME_LEN};
pub use self::hyper::Hyper;
pub use self::tonic::{GrpcStub, RawCodec};
