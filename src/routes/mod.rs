pub mod auth;
pub mod batch;
pub mod calendar;
pub mod email;
pub mod integrations;
pub mod metrics;
pub mod organization;
pub mod projects;
pub mod recruitment;
pub mod workforce;

pub use auth::*;
pub use batch::*;
pub use calendar::*;
pub use email::*;
pub use integrations::*;
pub use metrics::*;
pub use organization::*;
pub use projects::*;
pub use recruitment::*;
pub use workforce::*;
