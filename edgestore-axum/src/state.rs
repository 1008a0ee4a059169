use std::sync::Arc;

use edgestore_core::EdgeStoreHandler;

use crate::context::CreateContext;

pub struct EdgeStoreState<C> {
    pub handler: Arc<EdgeStoreHandler<C>>,
    pub create_context: Arc<dyn CreateContext<C>>,
    /// Upstream client for `/proxy-file`
    pub http: reqwest::Client,
}

impl<C> Clone for EdgeStoreState<C> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            create_context: Arc::clone(&self.create_context),
            http: self.http.clone(),
        }
    }
}

impl<C> EdgeStoreState<C> {
    pub fn new(handler: EdgeStoreHandler<C>, create_context: Arc<dyn CreateContext<C>>) -> Self {
        Self {
            handler: Arc::new(handler),
            create_context,
            http: reqwest::Client::new(),
        }
    }
}
