pub mod class;
pub mod config;
pub mod error;
pub mod policy;
pub mod record;

pub use class::{UserClass, UserType};
pub use config::{ClassConfig, StorageNamespace};
pub use error::{AuthError, AuthResult, VerifyFailure};
pub use policy::{
    FailurePolicy, DETECTION_FAILURE_FALLBACK, DETECTION_FAILURE_POLICY,
    VERIFICATION_FAILURE_POLICY,
};
pub use record::{AuthRecord, Profile};
