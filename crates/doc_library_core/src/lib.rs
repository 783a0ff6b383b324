pub mod cache;
pub mod compress;
pub mod config;
pub mod domain;
pub mod error;
pub mod memory;
pub mod ports;
pub mod service;
pub mod tiering;

pub use cache::CacheKey;
pub use config::CoreConfig;
pub use domain::{
    AuthSession, Document, DocumentInput, DocumentType, DocumentUpdateInput, LoginOutcome,
    Subject, SubjectInput, Theme, User,
};
pub use error::{CoreError, CoreResult};
pub use memory::{GatewayCall, InMemoryGateway, InMemoryPreferences};
pub use ports::{
    AuthGateway, BackendGateway, BlobStorage, Clock, ManualClock, PortError, PortResult,
    PreferenceStore, RecordStore, SessionListener, SystemClock,
};
pub use service::DataService;
