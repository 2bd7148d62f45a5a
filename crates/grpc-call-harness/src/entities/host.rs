use crate::entities::Service;

/// A configured server ready to host services, reporting calls to a collector
pub struct Host<S, C> {
    pub(crate) server: S,
    pub(crate) collector: C,
    pub(crate) services: Vec<Service>,
}
