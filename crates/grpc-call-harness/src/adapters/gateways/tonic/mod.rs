mod stub;

pub use stub::{GrpcStub, RawCodec};
