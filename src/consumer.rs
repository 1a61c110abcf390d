use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bind::BoundValue;
use crate::engine::{BindingEngine, ResolvedSignature};
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::signature::MethodSignature;

/// Trait for consumer-side message handlers.
///
/// Handlers receive the bound argument values in parameter order; by
/// the time a handler runs, every target of its signature has been
/// bound successfully.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, args: Vec<BoundValue>) -> Result<()>;

    /// Handler name for logging.
    fn name(&self) -> &str {
        "Handler"
    }
}

/// Function-based handler adapter.
pub struct FunctionHandler<F> {
    name: String,
    handler: F,
}

impl<F> FunctionHandler<F> {
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> Handler for FunctionHandler<F>
where
    F: Fn(Vec<BoundValue>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn handle(&self, args: Vec<BoundValue>) -> Result<()> {
        (self.handler)(args).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone)]
struct Route {
    signature: Arc<ResolvedSignature>,
    handler: Arc<dyn Handler>,
}

/// Routes inbound envelopes to registered handlers.
///
/// Registration resolves the handler's signature up front, so a
/// malformed signature is refused before any message can reach it.
/// After startup the route table is only read.
pub struct Dispatcher {
    engine: Arc<BindingEngine>,
    routes: RwLock<HashMap<String, Route>>,
}

impl Dispatcher {
    pub fn new(engine: Arc<BindingEngine>) -> Self {
        Self {
            engine,
            routes: RwLock::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &BindingEngine {
        &self.engine
    }

    /// Register a handler under its signature's name.
    ///
    /// Fails fast on resolution errors; the consumer is not registered
    /// at all when its signature is malformed.
    pub async fn register<H>(&self, signature: MethodSignature, handler: H) -> Result<()>
    where
        H: Handler + 'static,
    {
        let resolved = self.engine.resolve(&signature)?;
        let name = resolved.name().to_string();
        let mut routes = self.routes.write().await;
        routes.insert(
            name.clone(),
            Route {
                signature: resolved,
                handler: Arc::new(handler),
            },
        );
        info!(consumer = %name, "registered consumer handler");
        Ok(())
    }

    /// Register a function-based handler.
    pub async fn register_function<F, Fut>(
        &self,
        signature: MethodSignature,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(Vec<BoundValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = signature.name.clone();
        self.register(signature, FunctionHandler::new(name, handler))
            .await
    }

    /// Bind an inbound envelope and invoke the matching handler.
    ///
    /// Binding failures surface as [`Error::Bind`] without running any
    /// handler code, so the transport can apply its own acknowledgement
    /// policy to the failed message.
    pub async fn dispatch(&self, name: &str, envelope: &Envelope) -> Result<()> {
        let route = {
            let routes = self.routes.read().await;
            routes.get(name).cloned()
        };
        let route = match route {
            Some(route) => route,
            None => {
                warn!(consumer = %name, "no consumer registered");
                return Err(Error::UnknownConsumer {
                    name: name.to_string(),
                });
            }
        };

        let args = self.engine.bind_inbound(&route.signature, envelope)?;
        debug!(
            consumer = %name,
            arguments = args.len(),
            "dispatching bound invocation"
        );
        route.handler.handle(args).await
    }

    pub async fn registered(&self) -> usize {
        self.routes.read().await.len()
    }
}
