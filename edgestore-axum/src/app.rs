use std::future::Future;
use std::sync::Arc;

use axum::http::HeaderName;
use axum::Router;
use edgestore_core::EdgeStoreHandler;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::context::{CreateContext, RequestInfo};
use crate::routes;
use crate::EdgeStoreState;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct EdgeStoreApp<C> {
    pub state: EdgeStoreState<C>,
    pub router: Router<()>,
}

impl<C> Clone for EdgeStoreApp<C> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            router: self.router.clone(),
        }
    }
}

impl<C> EdgeStoreApp<C>
where
    C: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(handler: EdgeStoreHandler<C>, create_context: F) -> Self
    where
        F: Fn(RequestInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<C>> + Send + 'static,
    {
        Self::from_factory(handler, Arc::new(create_context))
    }

    pub fn from_factory(handler: EdgeStoreHandler<C>, create_context: Arc<dyn CreateContext<C>>) -> Self {
        let state = EdgeStoreState::new(handler, create_context);
        let router = with_layers(routes::edgestore_router(state.clone()));
        Self { state, router }
    }

    /// Merge extra application routes next to the EdgeStore ones.
    pub fn merge(mut self, router: Router<()>) -> Self {
        self.router = self.router.merge(router);
        self
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            addr = ?listener.local_addr().ok(),
            base_path = %self.state.handler.config().base_path,
            "edgestore listening"
        );
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

fn with_layers(router: Router<()>) -> Router<()> {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(request_id)),
    )
}

pub fn edgestore<C, F, Fut>(handler: EdgeStoreHandler<C>, create_context: F) -> EdgeStoreApp<C>
where
    C: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fn(RequestInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<C>> + Send + 'static,
{
    EdgeStoreApp::new(handler, create_context)
}
