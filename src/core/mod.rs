pub mod health_check;
pub mod service_manager;

pub use health_check::HealthService;
pub use service_manager::{Service, ServiceManager, ServiceWithReceiver};
