use crate::config::ControllerConfig;
use crate::controller::Controller;
use crate::error::TransportError;
use crate::rumour::Rumour;
use crate::transport::memory::BackendActor;
use crate::transport::mock::ChannelTransport;
use crate::transport::{Gateway, HttpTransport, Interceptor, TransportConfig};
use crate::validation::Validator;
use tracing::{error, info};

/// Wiring shared by every controller of an application.
///
/// `Nucleus` owns:
/// - **The gateway**: one transport plus its interceptor chain, cloned into every controller
/// - **The bus**: a single [`Rumour`], so controllers in the same group hear each other
/// - **Background tasks**: the in-memory backend, when one is used, for graceful shutdown
///
/// # Example
///
/// ```
/// use nucleon::runtime::Nucleus;
/// use nucleon::{ControllerConfig, Validator};
///
/// #[tokio::main]
/// async fn main() {
///     let nucleus = Nucleus::in_memory(32);
///     let form = nucleus.controller(
///         ControllerConfig::default().with_parent("/items").with_group("items"),
///         Validator::new(),
///     );
///     assert!(form.in_state("idle.template"));
///
///     drop(form);
///     nucleus.shutdown().await.unwrap();
/// }
/// ```
pub struct Nucleus {
    gateway: Gateway,
    rumour: Rumour,

    /// Task handles for background actors (used for graceful shutdown)
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Nucleus {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            rumour: Rumour::new(),
            handles: Vec::new(),
        }
    }

    /// Starts an empty in-memory backend and points the gateway at it.
    pub fn in_memory(buffer_size: usize) -> Self {
        let (actor, transport) = BackendActor::new(buffer_size);
        Self::from_backend(actor, transport)
    }

    /// Starts an already seeded backend.
    pub fn from_backend(actor: BackendActor, transport: ChannelTransport) -> Self {
        let handle = tokio::spawn(actor.run());
        Self {
            gateway: Gateway::new(transport),
            rumour: Rumour::new(),
            handles: vec![handle],
        }
    }

    /// Talks to a real server over HTTP.
    pub fn http(config: TransportConfig) -> Result<Self, TransportError> {
        Ok(Self::new(Gateway::new(HttpTransport::new(config)?)))
    }

    /// Appends an interceptor to the shared gateway. Affects controllers created afterwards.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.gateway = self.gateway.with_interceptor(interceptor);
        self
    }

    /// Creates a controller sharing this gateway and bus.
    pub fn controller(&self, config: ControllerConfig, validator: Validator) -> Controller {
        Controller::new(config, validator, self.gateway.clone(), self.rumour.clone())
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn rumour(&self) -> &Rumour {
        &self.rumour
    }

    /// Gracefully shuts down.
    ///
    /// Drops the gateway, then waits for the background actors. Controllers still alive
    /// keep their own gateway clones, so drop them first or this waits for them.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if every background task ended cleanly
    /// - `Err(String)` if one of them panicked
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down...");
        drop(self.gateway);
        drop(self.rumour);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Background task failed: {:?}", e);
                return Err(format!("Background task failed: {:?}", e));
            }
        }

        info!("Shutdown complete.");
        Ok(())
    }
}
