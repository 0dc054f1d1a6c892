use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info};

const RESTART_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
#[error("{0}")]
pub struct Error(String);

impl Error {
    pub fn new(s: &str) -> Error {
        Error(s.to_string())
    }

    pub fn from<E: std::error::Error>(e: E) -> Self {
        Self(e.to_string())
    }
}

#[async_trait]
pub trait Service: Send + Sized + 'static {
    type Context: Clone + Send + 'static;
    const NAME: &'static str;
    async fn new(context: Self::Context) -> Self;
    async fn run(self) -> Result<(), Error>;
}

// A service fed by a queue that outlives restarts of the service itself
#[async_trait]
pub trait ServiceWithReceiver: Send + Sized + 'static {
    type Context: Clone + Send + 'static;
    type Message: Send + 'static;
    const NAME: &'static str;
    async fn new(
        context: Self::Context,
        receiver: Arc<Mutex<mpsc::Receiver<Self::Message>>>,
    ) -> Self;
    async fn run(self) -> Result<(), Error>;
}

pub struct ServiceManager<C> {
    context: C,
    services: JoinSet<()>,
}

impl<C> ServiceManager<C>
where
    C: 'static + Clone + Send,
{
    pub fn new(context: C) -> Self {
        Self {
            context,
            services: JoinSet::new(),
        }
    }

    pub fn spawn<T: Service<Context = C>>(&mut self) {
        let context = self.context.clone();
        self.services.spawn(async move {
            loop {
                info!(service = T::NAME, "Starting service");
                let service = T::new(context.clone()).await;
                match service.run().await {
                    Ok(()) => {
                        info!(service = T::NAME, "Service finished");
                        break;
                    }
                    Err(e) => {
                        error!(service = T::NAME, error = %e, "Service failed, restarting");
                        tokio::time::sleep(RESTART_DELAY).await;
                    }
                }
            }
        });
    }

    pub fn spawn_with_receiver<T: ServiceWithReceiver<Context = C>>(
        &mut self,
        receiver: Arc<Mutex<mpsc::Receiver<T::Message>>>,
    ) {
        let context = self.context.clone();
        self.services.spawn(async move {
            loop {
                info!(service = T::NAME, "Starting service");
                let service = T::new(context.clone(), receiver.clone()).await;
                match service.run().await {
                    Ok(()) => {
                        info!(service = T::NAME, "Service finished");
                        break;
                    }
                    Err(e) => {
                        error!(service = T::NAME, error = %e, "Service failed, restarting");
                        tokio::time::sleep(RESTART_DELAY).await;
                    }
                }
            }
        });
    }

    pub async fn wait(&mut self) -> Result<(), Error> {
        if self.services.join_next().await.is_some() {
            return Err(Error::new("Internal Service Error"));
        }
        Ok(())
    }
}
